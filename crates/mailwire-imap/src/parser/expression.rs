//! Expression decoder for the payload of a response line.
//!
//! Turns text such as `(FLAGS (\Seen) RFC822.SIZE 44827)` into a [`Value`]
//! tree. Literals have already been cut out of the line by the streaming
//! parser and replaced with [`LITERAL_PLACEHOLDER`]; each placeholder token
//! takes the next entry of the [`LiteralQueue`].

use super::literal::LiteralQueue;
use super::value::{MAX_SAFE_INTEGER, Value};

/// Marker substituted for a literal inside an assembled line.
pub const LITERAL_PLACEHOLDER: char = '\u{0}';

/// How square brackets are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BracketMode {
    /// `[...]` attached to an atom is part of that atom, spaces and
    /// parentheses included (`BODY[HEADER.FIELDS (TO)]<0>`).
    #[default]
    Atom,
    /// Brackets open and close lists, like parentheses. Used for response
    /// codes and body section specifiers.
    Nested,
}

/// Decodes expressions out of one response line.
pub struct ExpressionDecoder<'a, 'q> {
    input: &'a str,
    pos: usize,
    mode: BracketMode,
    literals: &'q mut LiteralQueue,
}

impl<'a, 'q> ExpressionDecoder<'a, 'q> {
    /// Creates a decoder over `input` drawing literals from `literals`.
    #[must_use]
    pub fn new(input: &'a str, literals: &'q mut LiteralQueue) -> Self {
        Self {
            input,
            pos: 0,
            mode: BracketMode::Atom,
            literals,
        }
    }

    /// Switches the bracket mode.
    #[must_use]
    pub const fn brackets(mut self, mode: BracketMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns the current byte offset.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Decodes the whole input as a sequence of values.
    ///
    /// Unclosed lists are closed at end of input; stray closers are skipped.
    pub fn decode(mut self) -> Vec<Value> {
        self.parse_sequence(None)
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn closes(&self, byte: u8) -> bool {
        byte == b')' || (byte == b']' && self.mode == BracketMode::Nested)
    }

    fn parse_sequence(&mut self, open: Option<u8>) -> Vec<Value> {
        let mut out = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(byte) = self.peek() else {
                return out;
            };

            if self.closes(byte) {
                self.pos += 1;
                if open.is_some() {
                    return out;
                }
                tracing::trace!(position = self.pos - 1, "skipping unbalanced closer");
                continue;
            }

            match byte {
                b'(' => {
                    self.pos += 1;
                    out.push(Value::List(self.parse_sequence(Some(byte))));
                }
                b'[' if self.mode == BracketMode::Nested => {
                    self.pos += 1;
                    out.push(Value::List(self.parse_sequence(Some(byte))));
                }
                b'"' => out.push(self.read_quoted()),
                _ => out.push(self.read_atom()),
            }
        }
    }

    fn read_quoted(&mut self) -> Value {
        self.pos += 1;
        let mut buf = Vec::new();
        while let Some(byte) = self.peek() {
            self.pos += 1;
            match byte {
                b'\\' => {
                    if let Some(escaped) = self.peek() {
                        buf.push(escaped);
                        self.pos += 1;
                    }
                }
                b'"' => break,
                _ => buf.push(byte),
            }
        }
        Value::Text(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Skips a quoted string verbatim, for quotes inside an atom's brackets.
    fn skip_quoted(&mut self) {
        self.pos += 1;
        while let Some(byte) = self.peek() {
            self.pos += 1;
            match byte {
                b'\\' => self.pos = (self.pos + 1).min(self.input.len()),
                b'"' => return,
                _ => {}
            }
        }
    }

    fn read_atom(&mut self) -> Value {
        let start = self.pos;
        let mut depth = 0usize;

        while let Some(byte) = self.peek() {
            if depth > 0 {
                match byte {
                    b'"' => {
                        self.skip_quoted();
                        continue;
                    }
                    b'[' => depth += 1,
                    b']' => depth -= 1,
                    _ => {}
                }
                self.pos += 1;
                continue;
            }

            match byte {
                b' ' | b'\t' | b'\r' | b'\n' | b'(' | b')' => break,
                b'[' | b']' if self.mode == BracketMode::Nested => break,
                b'[' => depth = 1,
                _ => {}
            }
            self.pos += 1;
        }

        let input = self.input;
        self.atom_value(&input[start..self.pos])
    }

    fn atom_value(&mut self, token: &str) -> Value {
        if token == "NIL" {
            return Value::Nil;
        }

        if token.len() == 1 && token.starts_with(LITERAL_PLACEHOLDER) {
            return match self.literals.pop() {
                Some(bytes) => Value::literal(bytes),
                None => {
                    tracing::warn!("literal placeholder without a buffered literal");
                    Value::Nil
                }
            };
        }

        if token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = token.parse::<u64>() {
                if n <= MAX_SAFE_INTEGER && n.to_string() == token {
                    return Value::Number(n);
                }
            }
        }

        Value::Text(token.to_string())
    }
}

/// Decodes `input` with atom-attached brackets.
pub fn decode(input: &str, literals: &mut LiteralQueue) -> Vec<Value> {
    ExpressionDecoder::new(input, literals).decode()
}

/// Decodes `input` with brackets as lists.
pub fn decode_nested(input: &str, literals: &mut LiteralQueue) -> Vec<Value> {
    ExpressionDecoder::new(input, literals)
        .brackets(BracketMode::Nested)
        .decode()
}

/// Decodes text that cannot contain literals.
#[must_use]
pub fn decode_str(input: &str, mode: BracketMode) -> Vec<Value> {
    let mut none = LiteralQueue::new();
    ExpressionDecoder::new(input, &mut none).brackets(mode).decode()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::text(s)
    }

    fn atoms(input: &str) -> Vec<Value> {
        decode_str(input, BracketMode::Atom)
    }

    #[test]
    fn test_fetch_attribute_list() {
        let values = atoms(r"(FLAGS (\Seen) RFC822.SIZE 44827)");
        assert_eq!(
            values,
            vec![Value::List(vec![
                text("FLAGS"),
                Value::List(vec![text("\\Seen")]),
                text("RFC822.SIZE"),
                Value::Number(44827),
            ])]
        );
    }

    #[test]
    fn test_quoted_escapes() {
        let values = atoms(r#""\"IMAP\" is terrible :\\""#);
        assert_eq!(values, vec![text(r#""IMAP" is terrible :\"#)]);
    }

    #[test]
    fn test_quoted_nil_is_text() {
        assert_eq!(atoms(r#""NIL" NIL nil"#), vec![text("NIL"), Value::Nil, text("nil")]);
    }

    #[test]
    fn test_number_precision_boundary() {
        assert_eq!(atoms("9007199254740991"), vec![Value::Number(9007199254740991)]);
        assert_eq!(atoms("9007199254740993"), vec![text("9007199254740993")]);
        assert_eq!(atoms("99999999999999999999999"), vec![text("99999999999999999999999")]);
        assert_eq!(atoms("007"), vec![text("007")]);
        assert_eq!(atoms("0"), vec![Value::Number(0)]);
    }

    #[test]
    fn test_atom_brackets_keep_spaces() {
        let values = atoms("(BODY[HEADER.FIELDS (TO \"FROM\")]<0> NIL)");
        assert_eq!(
            values,
            vec![Value::List(vec![text("BODY[HEADER.FIELDS (TO \"FROM\")]<0>"), Value::Nil])]
        );
    }

    #[test]
    fn test_atom_brackets_with_quoted_closer() {
        let values = atoms(r#"BODY[HEADER.FIELDS ("X]")] 1"#);
        assert_eq!(values, vec![text(r#"BODY[HEADER.FIELDS ("X]")]"#), Value::Number(1)]);
    }

    #[test]
    fn test_nested_brackets() {
        let values = decode_str(r"PERMANENTFLAGS (\Seen \*)", BracketMode::Nested);
        assert_eq!(
            values,
            vec![text("PERMANENTFLAGS"), Value::List(vec![text("\\Seen"), text("\\*")])]
        );

        let values = decode_str("a [b [c]] d", BracketMode::Nested);
        assert_eq!(
            values,
            vec![
                text("a"),
                Value::List(vec![text("b"), Value::List(vec![text("c")])]),
                text("d")
            ]
        );
    }

    #[test]
    fn test_nested_section_spec() {
        let values = decode_str("HEADER.FIELDS (TO FROM)", BracketMode::Nested);
        assert_eq!(values, vec![text("HEADER.FIELDS"), Value::List(vec![text("TO"), text("FROM")])]);
    }

    #[test]
    fn test_unbalanced_input() {
        assert_eq!(
            atoms("(a (b"),
            vec![Value::List(vec![text("a"), Value::List(vec![text("b")])])]
        );
        assert_eq!(atoms(") a )"), vec![text("a")]);
    }

    #[test]
    fn test_literal_placeholders() {
        let mut literals: LiteralQueue = ["first", "sec\"ond"].into_iter().collect();
        let input = format!("(X {LITERAL_PLACEHOLDER} Y {LITERAL_PLACEHOLDER})");
        let values = decode(&input, &mut literals);
        assert_eq!(
            values,
            vec![Value::List(vec![text("X"), text("first"), text("Y"), text("sec\"ond")])]
        );
        assert!(literals.is_empty());
    }

    #[test]
    fn test_literal_bytes_substituted_verbatim() {
        let mut literals: LiteralQueue = [&b"caf\xe9"[..]].into_iter().collect();
        let input = format!("(RFC822.TEXT {LITERAL_PLACEHOLDER})");
        let values = decode(&input, &mut literals);
        let Value::List(items) = &values[0] else {
            panic!("expected a list, got {values:?}");
        };
        assert_eq!(items[1].as_bytes(), Some(&[99u8, 97, 102, 233][..]));
    }

    #[test]
    fn test_placeholder_without_literal_is_nil() {
        let input = format!("A {LITERAL_PLACEHOLDER}");
        assert_eq!(atoms(&input), vec![text("A"), Value::Nil]);
    }

    #[test]
    fn test_empty_input() {
        assert!(atoms("").is_empty());
        assert_eq!(atoms("()"), vec![Value::List(vec![])]);
    }
}
