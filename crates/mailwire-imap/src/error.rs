//! Error types for the IMAP engine.

use thiserror::Error;

use crate::types::ResponseCode;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server returned NO for a command.
    #[error("Server returned NO: {text}")]
    No {
        /// Human-readable text.
        text: String,
        /// Response code attached to the completion, if any.
        code: Option<ResponseCode>,
    },

    /// Server returned BAD for a command.
    #[error("Server returned BAD: {text}")]
    Bad {
        /// Human-readable text.
        text: String,
        /// Response code attached to the completion, if any.
        code: Option<ResponseCode>,
    },

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection closed before the command completed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Server announced a literal larger than the configured limit.
    #[error("Literal of {size} bytes exceeds limit of {max} bytes")]
    LiteralTooLarge {
        /// Announced size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A response line grew past the configured limit.
    #[error("Response line exceeds limit of {max} bytes")]
    LineTooLong {
        /// Configured maximum.
        max: usize,
    },

    /// TLS setup failed.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// Returns the response code carried by a NO or BAD completion.
    #[must_use]
    pub const fn code(&self) -> Option<&ResponseCode> {
        match self {
            Self::No { code, .. } | Self::Bad { code, .. } => code.as_ref(),
            _ => None,
        }
    }

    /// Returns true if the error ends the connection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Tls(_)
                | Self::Bye(_)
                | Self::ConnectionClosed
                | Self::LiteralTooLarge { .. }
                | Self::LineTooLong { .. }
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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
    fn test_error_code() {
        let err = Error::No {
            text: "over quota".to_string(),
            code: Some(ResponseCode::OverQuota),
        };
        assert_eq!(err.code(), Some(&ResponseCode::OverQuota));
        assert_eq!(err.to_string(), "Server returned NO: over quota");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::ConnectionClosed.is_fatal());
        assert!(Error::LineTooLong { max: 10 }.is_fatal());
        assert!(!Error::Protocol("x".to_string()).is_fatal());
    }
}
