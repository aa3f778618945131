//! # mailwire-imap
//!
//! An IMAP client engine: an incremental response parser and a session
//! engine that pipelines commands, correlates responses and keeps mailbox
//! state, with a tokio driver on top.
//!
//! ## Features
//!
//! - **Incremental parsing**: bytes in any chunking, literals of any size,
//!   and `BODY[...]` literals streamed to sinks with backpressure
//! - **Structured decoding**: ENVELOPE, BODYSTRUCTURE, LIST, STATUS,
//!   SEARCH/ESEARCH, THREAD, QUOTA, NAMESPACE, ID and response codes
//! - **Pipelining**: commands are tagged `A0000`, `A0001`, ... and sent in
//!   order; each completion is routed back to its caller
//! - **IDLE and keepalive**: the engine enters IDLE when the queue is empty
//!   and leaves it as soon as work arrives
//! - **Sans-I/O core**: [`session::Engine`] never touches a socket; the
//!   [`connection::Connection`] driver moves bytes over TCP or TLS
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailwire_imap::{CommandData, CommandRequest, Config, Connection, LoggingHandler};
//! use mailwire_imap::connection::connect_tls;
//! use mailwire_imap::session::Engine;
//!
//! #[tokio::main]
//! async fn main() -> mailwire_imap::Result<()> {
//!     let transport = connect_tls("imap.example.com", 993).await?;
//!     let mut connection = Connection::new(transport, Engine::new(Config::new(), LoggingHandler));
//!
//!     connection.execute(CommandRequest::new("LOGIN user@example.com secret")).await?;
//!     connection.execute(CommandRequest::new("SELECT INBOX")).await?;
//!     if let Some(mailbox) = connection.engine().mailbox() {
//!         println!("{} messages", mailbox.total);
//!     }
//!
//!     let search = connection.execute(CommandRequest::new("UID SEARCH UNSEEN")).await?;
//!     if let CommandData::Search(data) = search.data {
//!         println!("unseen: {:?}", data.ids);
//!     }
//!
//!     connection.execute(CommandRequest::new("LOGOUT")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`parser`]: Expression decoder, incremental response parser and
//!   structured response decoders
//! - [`session`]: Sans-I/O session engine
//! - [`connection`]: Tokio driver and TCP/TLS transports
//! - [`command`]: Command requests and tag generation
//! - [`body`]: Sinks for streamed message bodies
//! - [`handler`]: Notifications for unsolicited changes
//! - [`types`]: Capabilities, mailbox state, response codes and tags

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod body;
pub mod command;
pub mod config;
pub mod connection;
mod error;
pub mod handler;
pub mod parser;
pub mod session;
pub mod time;
pub mod types;

pub use command::{Authenticator, CommandKind, CommandRequest, FetchKey, TagGenerator};
pub use config::{Config, ConfigBuilder, Keepalive};
pub use connection::{Connection, Transport};
pub use error::{Error, Result};
pub use handler::{CollectingHandler, EventHandler, LoggingHandler, NoopHandler};
pub use parser::{ExpressionDecoder, Response, ResponseParser, UntaggedResponse, Value};
pub use session::{CommandData, Completion, Engine, RequestId, SessionState, StreamingObserver};
pub use types::{CapabilitySet, MailboxState, MailboxTree, ResponseCode, Tag};
