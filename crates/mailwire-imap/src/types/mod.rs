//! Core IMAP types.
//!
//! Capabilities, tags, response codes and the mailbox model shared by the
//! parser and the session engine.

#![allow(clippy::missing_const_for_fn)]

mod capability;
mod identifiers;
mod mailbox;
mod response_code;

pub use capability::{CapabilitySet, Status};
pub use identifiers::{IDLE_TAG, NOOP_TAG, Tag};
pub use mailbox::{MailboxNode, MailboxState, MailboxTree, SpecialUse};
pub use response_code::ResponseCode;
