//! Folded header block parsing.

use crate::encoding::decode_words;
use std::collections::HashMap;

/// Collection of message headers keyed by lowercased name.
///
/// Repeated headers keep every value in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        self.headers.entry(name).or_default().push(value.into());
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns the number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if no header was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns an iterator over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    /// Consumes the collection, returning the underlying map.
    #[must_use]
    pub fn into_map(self) -> HashMap<String, Vec<String>> {
        self.headers
    }

    /// Parses a header block and decodes RFC 2047 words in every value.
    ///
    /// Parsing stops at the first empty line or the first line that is
    /// neither a `Name: value` pair nor a continuation.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self::parse_block(text, true)
    }

    /// Parses a header block received as raw bytes.
    ///
    /// Bytes that are not UTF-8 are read as windows-1252, the usual charset
    /// of unencoded 8-bit headers.
    #[must_use]
    pub fn parse_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::parse(text),
            Err(_) => {
                let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
                Self::parse(&text)
            }
        }
    }

    /// Parses a header block, leaving values exactly as unfolded.
    #[must_use]
    pub fn parse_raw(text: &str) -> Self {
        Self::parse_block(text, false)
    }

    fn parse_block(text: &str, decode: bool) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        let mut previous: Option<&str> = None;

        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }

            if line.starts_with([' ', '\t']) {
                let Some((_, value)) = fields.last_mut() else {
                    continue;
                };
                let mut folded = line;
                // Two encoded words split across a fold are adjacent
                if previous.is_some_and(ends_with_encoded_word)
                    && folded.trim_start().starts_with("=?")
                {
                    folded = &folded[1..];
                }
                value.push_str(folded);
            } else {
                let Some((name, value)) = line.split_once(':') else {
                    break;
                };
                if name.is_empty() {
                    break;
                }
                let value = value
                    .strip_prefix([' ', '\t'])
                    .unwrap_or(value);
                fields.push((name.trim().to_lowercase(), value.to_string()));
            }
            previous = Some(line);
        }

        let mut headers = Self::new();
        for (name, value) in fields {
            let value = if decode { decode_words(&value) } else { value };
            headers.add(name, value);
        }
        headers
    }
}

fn ends_with_encoded_word(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed.ends_with("?=")
        && trimmed
            .rfind("=?")
            .is_some_and(|start| crate::encoding::EncodedWord::parse(&trimmed[start..]).is_some())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "To: recipient@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "\r\n",
            "Body: not a header\r\n"
        );

        let headers = Headers::parse(text);
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("To"), Some("recipient@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(headers.get("Content-Type"), Some("text/plain; charset=utf-8"));
        assert_eq!(headers.get("body"), None);
        assert_eq!(headers.len(), 4);
    }

    #[test]
    fn test_headers_repeated_values() {
        let headers = Headers::parse("Received: a\r\nReceived: b\r\n");
        assert_eq!(headers.get_all("received"), vec!["a", "b"]);
    }

    #[test]
    fn test_headers_keeps_fold_whitespace() {
        let headers = Headers::parse("Subject: hello\r\n\tworld\r\n");
        assert_eq!(headers.get("subject"), Some("hello\tworld"));
    }

    #[test]
    fn test_headers_empty_value() {
        let headers = Headers::parse("X-Empty:\r\nX-Next: 1\r\n");
        assert_eq!(headers.get("x-empty"), Some(""));
        assert_eq!(headers.get("x-next"), Some("1"));
    }

    #[test]
    fn test_headers_encoded_words_across_fold() {
        let text = "Subject: =?utf-8?Q?Gr=C3=BC?=\r\n =?utf-8?Q?=C3=9Fe?=\r\n";
        let headers = Headers::parse(text);
        assert_eq!(headers.get("subject"), Some("Grüße"));

        let raw = Headers::parse_raw(text);
        assert_eq!(raw.get("subject"), Some("=?utf-8?Q?Gr=C3=BC?==?utf-8?Q?=C3=9Fe?="));
    }

    #[test]
    fn test_headers_stops_at_garbage() {
        let headers = Headers::parse("A: 1\r\nnot a header\r\nB: 2\r\n");
        assert_eq!(headers.get("a"), Some("1"));
        assert_eq!(headers.get("b"), None);
    }

    #[test]
    fn test_headers_parse_eight_bit_bytes() {
        let headers = Headers::parse_bytes(b"Subject: caf\xe9\r\nFrom: a@b\r\n\r\n");
        assert_eq!(headers.get("subject"), Some("caf\u{e9}"));
        assert_eq!(headers.get("from"), Some("a@b"));

        let utf8 = Headers::parse_bytes("Subject: caf\u{e9}\r\n".as_bytes());
        assert_eq!(utf8.get("subject"), Some("caf\u{e9}"));
    }

    #[test]
    fn test_headers_leading_continuation_ignored() {
        let headers = Headers::parse(" stray\r\nA: 1\r\n");
        assert_eq!(headers.get("a"), Some("1"));
        assert_eq!(headers.iter().count(), 1);
    }
}
