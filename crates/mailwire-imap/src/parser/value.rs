//! Decoded expression values.

use std::fmt;

use bytes::Bytes;

/// Largest integer kept numeric; larger digit runs stay text.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// A decoded IMAP expression node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// The `NIL` atom.
    Nil,
    /// A digit-only token whose value survives a decimal round-trip.
    Number(u64),
    /// Atom, quoted string, or UTF-8 literal contents.
    Text(String),
    /// Literal contents that are not valid UTF-8, kept verbatim.
    Bytes(Bytes),
    /// Parenthesized (or, in nested mode, bracketed) list.
    List(Vec<Value>),
}

impl Value {
    /// Builds a text value.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Builds the value of a buffered literal: text when the bytes are
    /// UTF-8, raw bytes otherwise.
    #[must_use]
    pub fn literal(bytes: Bytes) -> Self {
        match std::str::from_utf8(&bytes) {
            Ok(text) => Self::Text(text.to_owned()),
            Err(_) => Self::Bytes(bytes),
        }
    }

    /// Returns true for `NIL`.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns the string of a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bytes of a text or raw literal value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(s) => Some(s.as_bytes()),
            Self::Bytes(b) => Some(&b[..]),
            _ => None,
        }
    }

    /// Returns the bytes of a text, raw literal or numeric value.
    #[must_use]
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            Self::Text(s) => Some(Bytes::copy_from_slice(s.as_bytes())),
            Self::Bytes(b) => Some(b.clone()),
            Self::Number(n) => Some(Bytes::from(n.to_string())),
            Self::Nil | Self::List(_) => None,
        }
    }

    /// Returns the number of a numeric value.
    #[must_use]
    pub const fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the items of a list value.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns text or a number rendered as text; `None` for `NIL` and lists.
    ///
    /// Raw literal bytes are converted lossily.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Self::Number(n) => Some(n.to_string()),
            Self::Nil | Self::List(_) => None,
        }
    }

    /// Returns a number, parsing text that holds digits.
    #[must_use]
    pub fn to_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
            Self::Nil | Self::Bytes(_) | Self::List(_) => None,
        }
    }

    /// Returns the value with every text node uppercased.
    #[must_use]
    pub fn to_uppercase(&self) -> Self {
        match self {
            Self::Text(s) => Self::Text(s.to_uppercase()),
            Self::List(items) => Self::List(items.iter().map(Self::to_uppercase).collect()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("NIL"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Number(7).to_text(), Some("7".to_string()));
        assert_eq!(Value::text("12").to_number(), Some(12));
        assert_eq!(Value::Nil.to_text(), None);
        assert!(Value::Nil.is_nil());
        assert_eq!(Value::List(vec![Value::Nil]).as_list().map(<[Value]>::len), Some(1));
    }

    #[test]
    fn test_literal_keeps_eight_bit_bytes() {
        let value = Value::literal(Bytes::from_static(b"caf\xe9"));
        assert_eq!(value, Value::Bytes(Bytes::from_static(b"caf\xe9")));
        assert_eq!(value.as_bytes(), Some(&b"caf\xe9"[..]));
        assert_eq!(value.as_str(), None);
        assert_eq!(value.to_text(), Some("caf\u{fffd}".to_string()));

        let utf8 = Value::literal(Bytes::from("caf\u{e9}"));
        assert_eq!(utf8, Value::text("caf\u{e9}"));
    }

    #[test]
    fn test_display() {
        let value = Value::List(vec![Value::text("HEADER.FIELDS"), Value::List(vec![Value::text("TO"), Value::Number(1)])]);
        assert_eq!(value.to_string(), "(HEADER.FIELDS (TO 1))");
    }

    #[test]
    fn test_uppercase() {
        let value = Value::List(vec![Value::text("header"), Value::Number(2)]);
        assert_eq!(value.to_uppercase(), Value::List(vec![Value::text("HEADER"), Value::Number(2)]));
    }
}
