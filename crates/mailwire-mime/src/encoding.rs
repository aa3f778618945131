//! MIME transfer and header decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 encoded words.

use crate::error::{Error, Result};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use encoding_rs::Encoding;

/// Base64 engine that accepts input with or without trailing padding.
///
/// Encoded words produced in the wild frequently drop the `=` padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    LENIENT.decode(data.trim()).map_err(Into::into)
}

/// Decodes Quoted-Printable bytes (RFC 2045).
///
/// Soft line breaks are removed. Escapes that are not followed by two hex
/// digits are kept as literal text.
#[must_use]
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }

        match input.get(i + 1..i + 3) {
            Some([b'\r', b'\n']) => i += 3,
            Some([b'\n', _]) => i += 2,
            Some(&[hi, lo]) => match (hex_value(hi), hex_value(lo)) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'=');
                    i += 1;
                }
            },
            _ if input.get(i + 1) == Some(&b'\n') => i += 2,
            _ => {
                out.push(b'=');
                i += 1;
            }
        }
    }

    out
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Converts bytes in `charset` to a UTF-8 string.
///
/// A byte order mark is removed. Malformed sequences become U+FFFD.
///
/// # Errors
///
/// Returns an error if the charset label is unknown.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> Result<String> {
    // RFC 2231 allows a language suffix: "utf-8*en"
    let label = charset.split('*').next().unwrap_or(charset).trim();
    let encoding = Encoding::for_label_no_replacement(label.as_bytes())
        .ok_or_else(|| Error::UnknownCharset(charset.to_string()))?;
    let (text, _) = encoding.decode_with_bom_removal(bytes);
    Ok(text.into_owned())
}

/// Transfer encoding of an encoded word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordEncoding {
    /// `B`: Base64.
    Base64,
    /// `Q`: Quoted-Printable with `_` standing for space.
    Quoted,
}

/// A single RFC 2047 encoded word: `=?charset?encoding?text?=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedWord<'a> {
    /// Charset label.
    pub charset: &'a str,
    /// Transfer encoding.
    pub encoding: WordEncoding,
    /// Encoded text between the last two `?`.
    pub text: &'a str,
}

impl<'a> EncodedWord<'a> {
    /// Parses a complete encoded word.
    #[must_use]
    pub fn parse(word: &'a str) -> Option<Self> {
        Self::parse_prefix(word).and_then(|(len, w)| (len == word.len()).then_some(w))
    }

    /// Parses an encoded word at the start of `input`, returning its byte
    /// length along with the word.
    fn parse_prefix(input: &'a str) -> Option<(usize, Self)> {
        let body = input.strip_prefix("=?")?;

        let charset_end = body.find('?')?;
        let charset = &body[..charset_end];
        if charset.is_empty() || charset.contains(char::is_whitespace) {
            return None;
        }

        let rest = &body[charset_end + 1..];
        let encoding_end = rest.find('?')?;
        let encoding = match &rest[..encoding_end] {
            "B" | "b" => WordEncoding::Base64,
            "Q" | "q" => WordEncoding::Quoted,
            _ => return None,
        };

        let rest = &rest[encoding_end + 1..];
        let text_end = rest.find("?=")?;
        let text = &rest[..text_end];
        if text.contains(char::is_whitespace) {
            return None;
        }

        let len = 2 + charset_end + 1 + encoding_end + 1 + text_end + 2;
        Some((
            len,
            Self {
                charset,
                encoding,
                text,
            },
        ))
    }

    /// Undoes the transfer encoding, yielding bytes in the word's charset.
    ///
    /// # Errors
    ///
    /// Returns an error if a Base64 payload is malformed.
    pub fn decode_bytes(&self) -> Result<Vec<u8>> {
        match self.encoding {
            WordEncoding::Base64 => decode_base64(self.text),
            WordEncoding::Quoted => {
                let spaced: Vec<u8> = self
                    .text
                    .bytes()
                    .map(|b| if b == b'_' { b' ' } else { b })
                    .collect();
                Ok(decode_quoted_printable(&spaced))
            }
        }
    }

    /// Fully decodes the word to text.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload or the charset cannot be decoded.
    pub fn decode(&self) -> Result<String> {
        decode_charset(self.charset, &self.decode_bytes()?)
    }
}

/// Finds the next encoded word, returning its byte range and the word.
fn find_encoded_word(input: &str) -> Option<(usize, usize, EncodedWord<'_>)> {
    let mut from = 0;
    while let Some(offset) = input[from..].find("=?") {
        let start = from + offset;
        if let Some((len, word)) = EncodedWord::parse_prefix(&input[start..]) {
            return Some((start, start + len, word));
        }
        from = start + 2;
    }
    None
}

/// Run of adjacent encoded words sharing a charset.
struct Run<'a> {
    charset: &'a str,
    bytes: Vec<u8>,
    raw: String,
}

impl Run<'_> {
    fn flush_into(self, out: &mut String) {
        match decode_charset(self.charset, &self.bytes) {
            Ok(text) => out.push_str(&text),
            Err(_) => out.push_str(&self.raw),
        }
    }
}

/// Decodes every encoded word inside a header value.
///
/// Whitespace separating two adjacent encoded words is dropped. Consecutive
/// words in the same charset have their bytes joined before charset
/// conversion, so a multi-byte character split across words survives.
/// Words that fail to decode are left as written.
#[must_use]
pub fn decode_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut run: Option<Run<'_>> = None;
    let mut rest = input;

    while let Some((start, end, word)) = find_encoded_word(rest) {
        let between = &rest[..start];
        let raw = &rest[start..end];
        rest = &rest[end..];

        let adjacent = run.is_some() && between.chars().all(char::is_whitespace);
        if !adjacent {
            if let Some(done) = run.take() {
                done.flush_into(&mut out);
            }
            out.push_str(between);
        }

        let Ok(bytes) = word.decode_bytes() else {
            if let Some(done) = run.take() {
                done.flush_into(&mut out);
            }
            out.push_str(raw);
            continue;
        };

        match run.as_mut() {
            Some(current) if current.charset.eq_ignore_ascii_case(word.charset) => {
                current.bytes.extend_from_slice(&bytes);
                current.raw.push_str(raw);
            }
            _ => {
                if let Some(done) = run.take() {
                    done.flush_into(&mut out);
                }
                run = Some(Run {
                    charset: word.charset,
                    bytes,
                    raw: raw.to_string(),
                });
            }
        }
    }

    if let Some(done) = run.take() {
        done.flush_into(&mut out);
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base64_decode() {
        assert_eq!(decode_base64("SGVsbG8sIFdvcmxkIQ==").unwrap(), b"Hello, World!");
        assert_eq!(decode_base64("SGVsbG8sIFdvcmxkIQ").unwrap(), b"Hello, World!");
        assert!(decode_base64("***").is_err());
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"H=C3=A9llo"), "Héllo".as_bytes());
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=\nWorld"), b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_keeps_bad_escapes() {
        assert_eq!(decode_quoted_printable(b"100=ZZ"), b"100=ZZ");
        assert_eq!(decode_quoted_printable(b"end="), b"end=");
    }

    #[test]
    fn test_encoded_word_rfc_examples() {
        let cases = [
            ("=?US-ASCII?Q?Keith_Moore?=", "Keith Moore"),
            ("=?ISO-8859-1?Q?Keld_J=F8rn_Simonsen?=", "Keld Jørn Simonsen"),
            ("=?ISO-8859-1?Q?Andr=E9?=", "André"),
            (
                "=?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?=",
                "If you can read this yo",
            ),
        ];
        for (word, expected) in cases {
            assert_eq!(EncodedWord::parse(word).unwrap().decode().unwrap(), expected);
        }
    }

    #[test]
    fn test_encoded_word_rejects_plain_text() {
        assert!(EncodedWord::parse("hello world").is_none());
        assert!(EncodedWord::parse("=?utf-8?X?abc?=").is_none());
        assert!(EncodedWord::parse("=?utf-8?Q?a b?=").is_none());
    }

    #[test]
    fn test_decode_words_mixed_text() {
        assert_eq!(decode_words("Re: =?utf-8?B?SMOpbGxv?= there"), "Re: Héllo there");
        assert_eq!(decode_words("no words here"), "no words here");
    }

    #[test]
    fn test_decode_words_drops_whitespace_between_words() {
        assert_eq!(decode_words("=?utf-8?Q?a?= \t =?utf-8?Q?b?="), "ab");
    }

    #[test]
    fn test_decode_words_joins_split_multibyte() {
        // "é" is C3 A9, split across two words
        assert_eq!(decode_words("=?utf-8?Q?=C3?= =?utf-8?Q?=A9?="), "é");
    }

    #[test]
    fn test_decode_words_keeps_undecodable() {
        assert_eq!(decode_words("=?x-unknown?Q?abc?="), "=?x-unknown?Q?abc?=");
        assert_eq!(decode_words("x =?utf-8?B?###?= y"), "x =?utf-8?B?###?= y");
    }

    #[test]
    fn test_decode_charset_language_suffix() {
        assert_eq!(decode_charset("utf-8*en", b"ok").unwrap(), "ok");
        assert!(matches!(decode_charset("nope", b"ok"), Err(Error::UnknownCharset(_))));
    }

    proptest! {
        #[test]
        fn decode_words_never_panics(s in r"(=\?[a-z0-9-]*\?[bBqQ]?\?[ -~]*\?=| |[a-z]){0,8}") {
            decode_words(&s);
        }

        #[test]
        fn plain_ascii_is_untouched(s in "[a-zA-Z0-9 ,.]{0,64}") {
            prop_assert_eq!(decode_words(&s), s);
        }
    }
}
