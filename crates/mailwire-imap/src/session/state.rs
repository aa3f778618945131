//! Session state types.

/// Connection state.
///
/// A selected mailbox is tracked separately as an optional
/// [`MailboxState`](crate::types::MailboxState) next to this state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport, or the transport was closed.
    #[default]
    Disconnected,
    /// Transport open; not logged in yet.
    Connected,
    /// Logged in (or pre-authenticated by the greeting).
    Authenticated,
}

impl SessionState {
    /// Returns `true` once logged in.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Returns `true` while the transport is open.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected)
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
    fn test_state_predicates() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
        assert!(!SessionState::Disconnected.is_connected());
        assert!(SessionState::Connected.is_connected());
        assert!(!SessionState::Connected.is_authenticated());
        assert!(SessionState::Authenticated.is_authenticated());
    }
}
