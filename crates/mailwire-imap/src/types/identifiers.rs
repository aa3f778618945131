//! Command tags.

/// Pseudo-tag used for IDLE so its completion is recognisable.
pub const IDLE_TAG: &str = "IDLE";

/// Pseudo-tag used for NOOP.
pub const NOOP_TAG: &str = "NOOP";

/// IMAP command tag.
///
/// Each command sent by the client carries a tag, and the server's completion
/// response repeats it so the two can be correlated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    /// Creates a new tag from a string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The fixed tag IDLE is sent with.
    #[must_use]
    pub fn idle() -> Self {
        Self::new(IDLE_TAG)
    }

    /// The fixed tag NOOP is sent with.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(NOOP_TAG)
    }

    /// Returns true if `token` has the shape of a tag this client issues:
    /// `A` followed by digits, or one of the pseudo-tags.
    #[must_use]
    pub fn is_client_tag(token: &str) -> bool {
        if token == IDLE_TAG || token == NOOP_TAG {
            return true;
        }
        token
            .strip_prefix('A')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the tag, returning the string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_client_tag_shape() {
        assert!(Tag::is_client_tag("A0001"));
        assert!(Tag::is_client_tag("A7"));
        assert!(Tag::is_client_tag("IDLE"));
        assert!(Tag::is_client_tag("NOOP"));
        assert!(!Tag::is_client_tag("A"));
        assert!(!Tag::is_client_tag("B12"));
        assert!(!Tag::is_client_tag("A1x"));
    }

    #[test]
    fn test_pseudo_tags() {
        assert_eq!(Tag::idle().to_string(), "IDLE");
        assert_eq!(Tag::noop().as_str(), "NOOP");
    }
}
