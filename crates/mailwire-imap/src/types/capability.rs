//! Server capabilities and response status.

use std::collections::BTreeSet;

/// Status keyword of a tagged or untagged condition response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Parses a status keyword, ignoring case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }

    /// Returns true if this is a successful status.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

/// Set of capability tokens advertised by the server.
///
/// Tokens are stored uppercased; lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from raw capability tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tokens
                .into_iter()
                .map(|t| t.as_ref().to_ascii_uppercase())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    /// Checks whether the server advertised `capability`.
    #[must_use]
    pub fn contains(&self, capability: &str) -> bool {
        self.0.contains(&capability.to_ascii_uppercase())
    }

    /// Returns true if IDLE (RFC 2177) is available.
    #[must_use]
    pub fn supports_idle(&self) -> bool {
        self.contains("IDLE")
    }

    /// Returns the advertised SASL mechanisms (`AUTH=` tokens).
    pub fn auth_mechanisms(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|t| t.strip_prefix("AUTH="))
    }

    /// Iterates over the uppercased tokens.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is known about the server yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(Status::parse("ok"), Some(Status::Ok));
        assert_eq!(Status::parse("PREAUTH"), Some(Status::PreAuth));
        assert_eq!(Status::parse("FETCH"), None);
        assert!(Status::PreAuth.is_ok());
        assert!(!Status::No.is_ok());
    }

    #[test]
    fn test_capability_set() {
        let caps = CapabilitySet::from_tokens(["IMAP4rev1", "idle", "AUTH=PLAIN", "AUTH=XOAUTH2"]);
        assert!(caps.contains("IMAP4REV1"));
        assert!(caps.supports_idle());
        assert!(!caps.contains("MOVE"));
        assert_eq!(caps.auth_mechanisms().collect::<Vec<_>>(), ["PLAIN", "XOAUTH2"]);
        assert_eq!(caps.len(), 4);
    }
}
