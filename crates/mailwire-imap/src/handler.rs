//! Notifications raised by the session engine.
//!
//! IMAP servers send mailbox changes at any time, not only in answer to a
//! command (RFC 2683). The engine keeps its own mailbox state current and
//! reports the changes a client cares about through an [`EventHandler`].
//!
//! # Example
//!
//! ```
//! use mailwire_imap::handler::EventHandler;
//!
//! struct Counter {
//!     new_mail: u32,
//! }
//!
//! impl EventHandler for Counter {
//!     fn on_mail(&mut self, count: u32) {
//!         self.new_mail += count;
//!     }
//! }
//! ```

use crate::Error;
use crate::parser::FetchAttributes;

/// Receiver of session notifications.
///
/// Every method has a no-op default. Handlers run on the read path and
/// must not block.
pub trait EventHandler: Send {
    /// New messages arrived in the selected mailbox.
    ///
    /// `count` is the increase of the message count, not the new total.
    fn on_mail(&mut self, count: u32) {
        let _ = count;
    }

    /// A message was expunged outside of any command.
    ///
    /// Sequence numbers of later messages have decreased by one.
    fn on_expunge(&mut self, seq: u32) {
        let _ = seq;
    }

    /// Message data changed outside of any FETCH (usually flags).
    fn on_update(&mut self, seq: u32, attributes: FetchAttributes) {
        let _ = (seq, attributes);
    }

    /// The server sent an ALERT. RFC 3501 requires showing it to the user.
    fn on_alert(&mut self, text: &str) {
        let _ = text;
    }

    /// UIDVALIDITY of the selected mailbox changed mid-session; cached UIDs
    /// are invalid.
    fn on_uid_validity(&mut self, uid_validity: u64) {
        let _ = uid_validity;
    }

    /// A protocol or connection error. `fatal` errors end the session.
    fn on_error(&mut self, error: &Error, fatal: bool) {
        let _ = (error, fatal);
    }

    /// The server acknowledged IDLE.
    fn on_idle_started(&mut self) {}

    /// The connection closed.
    fn on_close(&mut self) {}

    /// A line that matched no known response shape.
    fn on_unrecognized(&mut self, line: &str) {
        let _ = line;
    }
}

/// A handler that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {}

/// A handler that logs notifications using tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_mail(&mut self, count: u32) {
        tracing::info!(count, "new mail");
    }

    fn on_expunge(&mut self, seq: u32) {
        tracing::debug!(seq, "EXPUNGE");
    }

    fn on_update(&mut self, seq: u32, attributes: FetchAttributes) {
        tracing::debug!(seq, ?attributes, "FETCH update");
    }

    fn on_alert(&mut self, text: &str) {
        tracing::warn!(text, "ALERT");
    }

    fn on_uid_validity(&mut self, uid_validity: u64) {
        tracing::warn!(uid_validity, "UIDVALIDITY changed");
    }

    fn on_error(&mut self, error: &Error, fatal: bool) {
        if fatal {
            tracing::error!(%error, "connection error");
        } else {
            tracing::warn!(%error, "protocol error");
        }
    }

    fn on_idle_started(&mut self) {
        tracing::debug!("IDLE started");
    }

    fn on_close(&mut self) {
        tracing::info!("connection closed");
    }

    fn on_unrecognized(&mut self, line: &str) {
        tracing::warn!(line, "unrecognized response");
    }
}

/// A handler that collects events for later inspection.
///
/// Useful for testing or batch processing of events.
#[derive(Debug, Default, Clone)]
pub struct CollectingHandler {
    /// Collected events.
    pub events: Vec<Event>,
}

impl CollectingHandler {
    /// Creates a new collecting handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all collected events.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Takes all collected events, leaving the handler empty.
    pub fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

impl EventHandler for CollectingHandler {
    fn on_mail(&mut self, count: u32) {
        self.events.push(Event::Mail(count));
    }

    fn on_expunge(&mut self, seq: u32) {
        self.events.push(Event::Expunge(seq));
    }

    fn on_update(&mut self, seq: u32, attributes: FetchAttributes) {
        self.events.push(Event::Update(seq, attributes));
    }

    fn on_alert(&mut self, text: &str) {
        self.events.push(Event::Alert(text.to_string()));
    }

    fn on_uid_validity(&mut self, uid_validity: u64) {
        self.events.push(Event::UidValidity(uid_validity));
    }

    fn on_error(&mut self, error: &Error, fatal: bool) {
        self.events.push(Event::Error {
            message: error.to_string(),
            fatal,
        });
    }

    fn on_idle_started(&mut self) {
        self.events.push(Event::IdleStarted);
    }

    fn on_close(&mut self) {
        self.events.push(Event::Closed);
    }

    fn on_unrecognized(&mut self, line: &str) {
        self.events.push(Event::Unrecognized(line.to_string()));
    }
}

/// An event recorded by [`CollectingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// New mail delta.
    Mail(u32),
    /// Expunged sequence number.
    Expunge(u32),
    /// Unsolicited FETCH.
    Update(u32, FetchAttributes),
    /// ALERT text.
    Alert(String),
    /// New UIDVALIDITY.
    UidValidity(u64),
    /// Error notification.
    Error {
        /// Error message.
        message: String,
        /// Whether the error ended the session.
        fatal: bool,
    },
    /// IDLE acknowledged.
    IdleStarted,
    /// Connection closed.
    Closed,
    /// Unrecognized line.
    Unrecognized(String),
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
    fn test_noop_handler() {
        let mut handler = NoopHandler;
        handler.on_mail(100);
        handler.on_expunge(1);
        handler.on_alert("important!");
        handler.on_close();
    }

    #[test]
    fn test_collecting_handler() {
        let mut handler = CollectingHandler::new();

        handler.on_mail(5);
        handler.on_expunge(3);
        handler.on_alert("Test alert");
        handler.on_error(&Error::ConnectionClosed, true);

        assert_eq!(
            handler.events,
            [
                Event::Mail(5),
                Event::Expunge(3),
                Event::Alert("Test alert".to_string()),
                Event::Error {
                    message: "Connection closed".to_string(),
                    fatal: true
                },
            ]
        );

        let taken = handler.take();
        assert_eq!(taken.len(), 4);
        assert!(handler.events.is_empty());
    }

    #[test]
    fn test_collecting_handler_clear() {
        let mut handler = CollectingHandler::new();
        handler.on_idle_started();
        handler.on_unrecognized("garbage");
        assert_eq!(handler.events.len(), 2);

        handler.clear();
        assert!(handler.events.is_empty());
    }
}
