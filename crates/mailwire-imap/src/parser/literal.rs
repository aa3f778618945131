//! Literals buffered for the response line being assembled.

use std::collections::VecDeque;

use bytes::Bytes;

/// FIFO of literal payloads collected while one logical line is assembled.
///
/// The expression decoder consumes entries in order, one per placeholder.
#[derive(Debug, Default)]
pub struct LiteralQueue {
    items: VecDeque<Bytes>,
}

impl LiteralQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed literal.
    pub fn push(&mut self, literal: Bytes) {
        self.items.push_back(literal);
    }

    /// Removes the oldest literal.
    pub fn pop(&mut self) -> Option<Bytes> {
        self.items.pop_front()
    }

    /// Returns the number of queued literals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drops every queued literal, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let n = self.items.len();
        self.items.clear();
        n
    }
}

impl<I: Into<Bytes>> FromIterator<I> for LiteralQueue {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue: LiteralQueue = ["first", "second"].into_iter().collect();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap(), "first");
        queue.push(Bytes::from_static(b"third"));
        assert_eq!(queue.pop().unwrap(), "second");
        assert_eq!(queue.clear(), 1);
        assert!(queue.is_empty());
    }
}
