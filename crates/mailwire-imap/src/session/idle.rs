//! IDLE sub-state machine (RFC 2177).

use std::time::{Duration, Instant};

/// Externally visible IDLE state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdleState {
    /// No IDLE in progress.
    #[default]
    Idle,
    /// IDLE sent, waiting for the server's `+`.
    AwaitingAck,
    /// Server acknowledged; mailbox events arrive unsolicited.
    Active,
}

/// Tracks one IDLE command from issue to tagged completion.
#[derive(Debug, Default)]
pub struct IdleMachine {
    state: IdleState,
    since: Option<Instant>,
    done_sent: bool,
    cancel_on_ack: bool,
}

impl IdleMachine {
    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> IdleState {
        self.state
    }

    /// IDLE was written to the server.
    pub fn issued(&mut self) {
        *self = Self {
            state: IdleState::AwaitingAck,
            ..Self::default()
        };
    }

    /// The server acknowledged IDLE. Returns true if DONE must be written
    /// right away because a cancel arrived while waiting.
    pub fn acknowledged(&mut self, now: Instant) -> bool {
        self.state = IdleState::Active;
        self.since = Some(now);
        if self.cancel_on_ack {
            self.done_sent = true;
        }
        self.cancel_on_ack
    }

    /// Asks to end IDLE. Returns true if DONE must be written now.
    ///
    /// Before the acknowledgment the cancel is remembered instead; after
    /// DONE has gone out this is a no-op.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            IdleState::Active if !self.done_sent => {
                self.done_sent = true;
                true
            }
            IdleState::AwaitingAck => {
                self.cancel_on_ack = true;
                false
            }
            _ => false,
        }
    }

    /// Returns true if IDLE has been active for at least `limit` and DONE
    /// has not been written yet.
    #[must_use]
    pub fn refresh_due(&self, now: Instant, limit: Duration) -> bool {
        self.state == IdleState::Active
            && !self.done_sent
            && self
                .since
                .is_some_and(|since| now.saturating_duration_since(since) >= limit)
    }

    /// The IDLE command completed.
    pub fn finished(&mut self) {
        *self = Self::default();
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
    fn test_idle_lifecycle() {
        let start = Instant::now();
        let mut idle = IdleMachine::default();
        assert_eq!(idle.state(), IdleState::Idle);

        idle.issued();
        assert_eq!(idle.state(), IdleState::AwaitingAck);
        assert!(!idle.acknowledged(start));
        assert_eq!(idle.state(), IdleState::Active);

        assert!(!idle.refresh_due(start + Duration::from_secs(10), Duration::from_secs(60)));
        assert!(idle.refresh_due(start + Duration::from_secs(60), Duration::from_secs(60)));

        assert!(idle.cancel());
        assert!(!idle.cancel());
        assert!(!idle.refresh_due(start + Duration::from_secs(120), Duration::from_secs(60)));

        idle.finished();
        assert_eq!(idle.state(), IdleState::Idle);
    }

    #[test]
    fn test_cancel_before_ack() {
        let mut idle = IdleMachine::default();
        idle.issued();
        assert!(!idle.cancel());
        assert!(idle.acknowledged(Instant::now()));
        assert!(!idle.cancel());
    }

    #[test]
    fn test_cancel_when_idle_is_noop() {
        let mut idle = IdleMachine::default();
        assert!(!idle.cancel());
        idle.issued();
        assert!(!idle.acknowledged(Instant::now()));
    }
}
