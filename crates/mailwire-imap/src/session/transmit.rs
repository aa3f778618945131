//! Outgoing protocol data.

use bytes::{BufMut, Bytes, BytesMut};

/// Data to transmit to the server.
///
/// The engine produces these; the I/O layer writes them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    /// Raw bytes to send to the server.
    pub data: Bytes,
}

impl Transmit {
    /// Creates a transmit from bytes.
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Creates a transmit of `line` followed by CRLF.
    #[must_use]
    pub fn line(line: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(line.len() + 2);
        buf.put_slice(line);
        buf.put_slice(b"\r\n");
        Self { data: buf.freeze() }
    }

    /// Creates a tagged command line: `tag SP text CRLF`.
    #[must_use]
    pub fn command(tag: &str, text: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(tag.len() + text.len() + 3);
        buf.put_slice(tag.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(text);
        buf.put_slice(b"\r\n");
        Self { data: buf.freeze() }
    }

    /// Returns the data as a string slice, if valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Returns the length of the data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the transmit is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for Transmit {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
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
    fn test_transmit_command() {
        let t = Transmit::command("A0001", b"NOOP");
        assert_eq!(t.as_str(), Some("A0001 NOOP\r\n"));
        assert_eq!(t.len(), 12);
    }

    #[test]
    fn test_transmit_line() {
        assert_eq!(Transmit::line(b"DONE").as_str(), Some("DONE\r\n"));
        assert_eq!(Transmit::line(b"").as_str(), Some("\r\n"));
    }

    #[test]
    fn test_transmit_binary() {
        let t = Transmit::new(vec![0xff, 0xfe]);
        assert_eq!(t.as_str(), None);
        assert!(!t.is_empty());
        let slice: &[u8] = t.as_ref();
        assert_eq!(slice, &[0xff, 0xfe]);
    }
}
