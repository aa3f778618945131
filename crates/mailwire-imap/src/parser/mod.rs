//! IMAP response parser.
//!
//! A sans-I/O parser for server responses, in three layers:
//!
//! - [`ResponseParser`] assembles lines from arbitrary chunks, buffers
//!   literals and streams `BODY[...]` literals into body sinks
//! - [`ExpressionDecoder`] turns one line's payload into a [`Value`] tree
//! - [`decode_response`] classifies the line and decodes its payload into
//!   typed data
//!
//! # Example
//!
//! ```
//! use mailwire_imap::parser::{LiteralQueue, Response, UntaggedResponse, decode_response};
//!
//! let response = decode_response("* 4 EXISTS", &mut LiteralQueue::new());
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(4)));
//! ```

pub mod expression;
mod literal;
pub mod response;
mod stream;
mod value;

pub use expression::{BracketMode, ExpressionDecoder, LITERAL_PLACEHOLDER};
pub use literal::LiteralQueue;
pub use response::{
    Address, AddressEntry, BodyExtension, BodyStructure, Condition, Disposition, ESearchData,
    Envelope, FetchAttributes, FetchData, FetchValue, InlineBody, ListEntry, ListKind, Namespace,
    Namespaces, Params, Quota, QuotaRoot, QuotaUsage, Response, SearchData, SinglePart,
    StatusData, UntaggedResponse, decode_response,
};
pub use stream::{BodyStart, Progress, ResponseParser, ResponseSink};
pub use value::{MAX_SAFE_INTEGER, Value};
