//! IMAP command tag generator.
//!
//! Tags are used to match commands with their responses.

use crate::config::DEFAULT_TAG_CEILING;
use crate::types::Tag;

/// Tag generator for IMAP commands.
///
/// Generates sequential tags in the format "A0000", "A0001", etc. The counter
/// wraps back to zero when it reaches the ceiling.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u64,
    ceiling: u64,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix and wrap ceiling.
    #[must_use]
    pub const fn new(prefix: char, ceiling: u64) -> Self {
        Self {
            counter: 0,
            ceiling: if ceiling == 0 { 1 } else { ceiling },
            prefix,
        }
    }

    /// Generates the next tag.
    pub fn next(&mut self) -> Tag {
        let n = self.counter;
        self.counter = if n + 1 >= self.ceiling { 0 } else { n + 1 };
        Tag::new(format!("{}{:04}", self.prefix, n))
    }

    /// Returns the current counter value without incrementing.
    #[must_use]
    pub const fn current(&self) -> u64 {
        self.counter
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A', DEFAULT_TAG_CEILING)
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
    fn test_tag_generation() {
        let mut generator = TagGenerator::default();
        assert_eq!(generator.next().as_str(), "A0000");
        assert_eq!(generator.next().as_str(), "A0001");
        assert_eq!(generator.current(), 2);
    }

    #[test]
    fn test_wraps_at_ceiling() {
        let mut generator = TagGenerator::new('A', 3);
        let tags: Vec<_> = (0..5).map(|_| generator.next().into_inner()).collect();
        assert_eq!(tags, ["A0000", "A0001", "A0002", "A0000", "A0001"]);
    }

    #[test]
    fn test_uniqueness_below_ceiling() {
        let mut generator = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10000 {
            assert!(seen.insert(generator.next()), "duplicate tag generated");
        }
    }

    #[test]
    fn test_wide_counter_formats() {
        let mut generator = TagGenerator::default();
        generator.counter = 123_456;
        assert_eq!(generator.next().as_str(), "A123456");
    }
}
