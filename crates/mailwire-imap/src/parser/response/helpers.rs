//! Parser helper functions.

use std::collections::BTreeMap;

use crate::parser::expression::decode_nested;
use crate::parser::{LiteralQueue, Value};
use crate::types::ResponseCode;

use super::types::Params;

/// Splits the first whitespace-delimited token off `input`.
pub fn split_token(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find([' ', '\t']) {
        Some(i) => (&input[..i], input[i + 1..].trim_start()),
        None => (input, ""),
    }
}

/// Finds the `]` closing a `[` at the start of `text`, skipping quoted
/// strings and nested brackets.
fn closing_bracket(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quoted => i += 1,
            b'"' => quoted = !quoted,
            b'[' if !quoted => depth += 1,
            b']' if !quoted => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Splits `resp-text` into its optional bracketed code and the human text.
pub fn split_text_code(text: &str, literals: &mut LiteralQueue) -> (Option<ResponseCode>, String) {
    let text = text.trim_start();
    if !text.starts_with('[') {
        return (None, text.to_string());
    }
    let Some(end) = closing_bracket(text) else {
        return (None, text.to_string());
    };
    let code = ResponseCode::from_values(decode_nested(&text[1..end], literals));
    (code, text[end + 1..].trim_start().to_string())
}

/// Collects the text items of a list, skipping NIL and nested lists.
pub fn texts(values: &[Value]) -> Vec<String> {
    values.iter().filter_map(Value::to_text).collect()
}

/// Collects the numeric items of a sequence.
pub fn numbers(values: &[Value]) -> Vec<u64> {
    values.iter().filter_map(Value::to_number).collect()
}

/// Reads an `nstring`: text or number, `None` for NIL or a missing item.
pub fn nstring(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::to_text)
}

/// Decodes a `body-fld-param` pair list; keys are lowercased.
pub fn params(value: Option<&Value>) -> Option<Params> {
    let items = value?.as_list()?;
    let mut map = BTreeMap::new();
    for pair in items.chunks(2) {
        let Some(key) = pair[0].to_text() else {
            continue;
        };
        map.insert(key.to_ascii_lowercase(), pair.get(1).and_then(Value::to_text));
    }
    Some(map)
}

/// Decodes a flat `key value key value` list into a lowercased map.
pub fn pairs(items: &[Value]) -> BTreeMap<String, Value> {
    items
        .chunks(2)
        .filter_map(|pair| {
            let key = pair[0].to_text()?.to_ascii_lowercase();
            Some((key, pair.get(1).cloned().unwrap_or(Value::Nil)))
        })
        .collect()
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
    fn test_split_token() {
        assert_eq!(split_token("FETCH (UID 1)"), ("FETCH", "(UID 1)"));
        assert_eq!(split_token("  NOOP"), ("NOOP", ""));
        assert_eq!(split_token(""), ("", ""));
    }

    #[test]
    fn test_text_code_split() {
        let mut literals = LiteralQueue::new();
        let (code, text) = split_text_code("[UIDVALIDITY 3857529045] UIDs valid", &mut literals);
        assert_eq!(code, Some(ResponseCode::UidValidity(3857529045)));
        assert_eq!(text, "UIDs valid");

        let (code, text) = split_text_code("[PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited", &mut literals);
        assert_eq!(
            code,
            Some(ResponseCode::PermanentFlags(vec![
                "\\Deleted".to_string(),
                "\\Seen".to_string(),
                "\\*".to_string()
            ]))
        );
        assert_eq!(text, "Limited");
    }

    #[test]
    fn test_text_code_quoted_bracket() {
        let mut literals = LiteralQueue::new();
        let (code, text) = split_text_code("[X-FOO \"a]b\"] done", &mut literals);
        assert_eq!(
            code,
            Some(ResponseCode::Other {
                name: "X-FOO".to_string(),
                values: vec![Value::text("a]b")],
            })
        );
        assert_eq!(text, "done");
    }

    #[test]
    fn test_text_without_code() {
        let mut literals = LiteralQueue::new();
        assert_eq!(split_text_code("LOGIN completed", &mut literals), (None, "LOGIN completed".to_string()));
        assert_eq!(split_text_code("[unterminated", &mut literals), (None, "[unterminated".to_string()));
    }

    #[test]
    fn test_params_lowercase_keys() {
        let value = Value::List(vec![Value::text("CHARSET"), Value::text("UTF-8"), Value::text("NAME"), Value::Nil]);
        let params = params(Some(&value)).unwrap();
        assert_eq!(params.get("charset"), Some(&Some("UTF-8".to_string())));
        assert_eq!(params.get("name"), Some(&None));
        assert!(super::params(Some(&Value::Nil)).is_none());
    }
}
