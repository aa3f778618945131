//! # mailwire-mime
//!
//! Header-level MIME decoding used by the mailwire IMAP engine.
//!
//! ## Features
//!
//! - **Transfer decoding**: Base64 and Quoted-Printable byte decoding
//! - **Encoded words**: RFC 2047 `=?charset?B|Q?text?=` decoding with charset
//!   conversion for every label the WHATWG encoding standard knows
//! - **Header blocks**: folded header parsing into a case-insensitive map
//!
//! ## Quick Start
//!
//! ```
//! use mailwire_mime::Headers;
//!
//! let block = "Subject: =?UTF-8?Q?Gr=C3=BC=C3=9Fe?=\r\n\
//!              To: alice@example.com\r\n\r\n";
//!
//! let headers = Headers::parse(block);
//! assert_eq!(headers.get("subject"), Some("Grüße"));
//! ```
//!
//! ### Encoded words
//!
//! ```
//! use mailwire_mime::encoding::decode_words;
//!
//! // Whitespace between adjacent encoded words is dropped.
//! let text = decode_words("=?ISO-8859-1?Q?Keld_J=F8rn?= =?ISO-8859-1?Q?_Simonsen?=");
//! assert_eq!(text, "Keld Jørn Simonsen");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
mod header;

pub mod encoding;

pub use error::{Error, Result};
pub use header::Headers;
