//! Command requests.
//!
//! Command text is built by the caller and treated as opaque, apart from the
//! leading verb (which decides how responses are accumulated), the mailbox
//! argument of SELECT/EXAMINE, the item list of FETCH, and synchronizing
//! literals (which split the text into continuation-gated segments).

mod authenticator;
mod tag_generator;

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use bytes::Bytes;

use crate::parser::expression::{BracketMode, decode_str};
use crate::parser::response::body_key;
use crate::parser::Value;
use crate::session::FetchObserver;

pub use authenticator::Authenticator;
pub use tag_generator::TagGenerator;

/// Command family, from the leading verb.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// CAPABILITY.
    Capability,
    /// NOOP.
    Noop,
    /// LOGOUT.
    Logout,
    /// STARTTLS.
    StartTls,
    /// LOGIN.
    Login,
    /// AUTHENTICATE.
    Authenticate,
    /// SELECT.
    Select,
    /// EXAMINE.
    Examine,
    /// CREATE.
    Create,
    /// DELETE.
    Delete,
    /// RENAME.
    Rename,
    /// SUBSCRIBE.
    Subscribe,
    /// UNSUBSCRIBE.
    Unsubscribe,
    /// LIST.
    List,
    /// LSUB.
    Lsub,
    /// XLIST (Gmail).
    Xlist,
    /// STATUS.
    Status,
    /// APPEND.
    Append,
    /// IDLE.
    Idle,
    /// CHECK.
    Check,
    /// CLOSE.
    Close,
    /// UNSELECT.
    Unselect,
    /// EXPUNGE.
    Expunge,
    /// SEARCH.
    Search,
    /// SORT.
    Sort,
    /// THREAD.
    Thread,
    /// FETCH.
    Fetch,
    /// STORE.
    Store,
    /// COPY.
    Copy,
    /// MOVE.
    Move,
    /// NAMESPACE.
    Namespace,
    /// GETQUOTA.
    GetQuota,
    /// GETQUOTAROOT.
    GetQuotaRoot,
    /// SETQUOTA.
    SetQuota,
    /// ID.
    Id,
    /// ENABLE.
    Enable,
    /// Anything else, uppercased.
    Other(String),
}

impl CommandKind {
    /// Classifies a command verb, ignoring case.
    #[must_use]
    pub fn parse(verb: &str) -> Self {
        match verb.to_ascii_uppercase().as_str() {
            "CAPABILITY" => Self::Capability,
            "NOOP" => Self::Noop,
            "LOGOUT" => Self::Logout,
            "STARTTLS" => Self::StartTls,
            "LOGIN" => Self::Login,
            "AUTHENTICATE" => Self::Authenticate,
            "SELECT" => Self::Select,
            "EXAMINE" => Self::Examine,
            "CREATE" => Self::Create,
            "DELETE" => Self::Delete,
            "RENAME" => Self::Rename,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "LIST" => Self::List,
            "LSUB" => Self::Lsub,
            "XLIST" => Self::Xlist,
            "STATUS" => Self::Status,
            "APPEND" => Self::Append,
            "IDLE" => Self::Idle,
            "CHECK" => Self::Check,
            "CLOSE" => Self::Close,
            "UNSELECT" => Self::Unselect,
            "EXPUNGE" => Self::Expunge,
            "SEARCH" => Self::Search,
            "SORT" => Self::Sort,
            "THREAD" => Self::Thread,
            "FETCH" => Self::Fetch,
            "STORE" => Self::Store,
            "COPY" => Self::Copy,
            "MOVE" => Self::Move,
            "NAMESPACE" => Self::Namespace,
            "GETQUOTA" => Self::GetQuota,
            "GETQUOTAROOT" => Self::GetQuotaRoot,
            "SETQUOTA" => Self::SetQuota,
            "ID" => Self::Id,
            "ENABLE" => Self::Enable,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns true for SELECT and EXAMINE.
    #[must_use]
    pub const fn is_select(&self) -> bool {
        matches!(self, Self::Select | Self::Examine)
    }

    /// Returns true for the LIST family.
    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List | Self::Lsub | Self::Xlist)
    }
}

/// An attribute a FETCH asked for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FetchKey {
    /// Simple attribute, lowercased (`flags`, `uid`, `x-gm-labels`).
    Attr(String),
    /// Body section, normalized by [`FetchKey::body`].
    Body(String),
}

impl FetchKey {
    /// Builds an attribute key.
    #[must_use]
    pub fn attr(name: &str) -> Self {
        Self::Attr(name.to_ascii_lowercase())
    }

    /// Builds a body key. The section is decoded with brackets as lists and
    /// uppercased, so `header.fields (subject)` and `HEADER.FIELDS ("SUBJECT")`
    /// compare equal.
    #[must_use]
    pub fn body(section: &str) -> Self {
        let values = decode_str(section, BracketMode::Nested);
        Self::Body(Value::List(values).to_uppercase().to_string())
    }
}

/// A command to run, with its optional payload and FETCH observer.
pub struct CommandRequest {
    text: String,
    kind: CommandKind,
    uid: bool,
    payload: Option<Bytes>,
    observer: Option<Box<dyn FetchObserver>>,
    authenticator: Option<Box<dyn Authenticator>>,
}

impl fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRequest")
            .field("text", &self.text)
            .field("kind", &self.kind)
            .field("uid", &self.uid)
            .field("payload", &self.payload.as_ref().map(Bytes::len))
            .field("observer", &self.observer.is_some())
            .field("authenticator", &self.authenticator.is_some())
            .finish()
    }
}

impl CommandRequest {
    /// Creates a request from complete command text, without tag or CRLF.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let (first, rest) = split_verb(&text);
        let uid = first.eq_ignore_ascii_case("UID");
        let verb = if uid { split_verb(rest).0 } else { first };
        let kind = CommandKind::parse(verb);
        Self {
            text,
            kind,
            uid,
            payload: None,
            observer: None,
            authenticator: None,
        }
    }

    /// Attaches a raw payload written after the last continuation (APPEND).
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Attaches an observer for FETCH bodies and per-message completion.
    #[must_use]
    pub fn with_observer(mut self, observer: impl FetchObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Attaches the responder for SASL challenges (AUTHENTICATE).
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Box::new(authenticator));
        self
    }

    /// Returns the command text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the command family.
    #[must_use]
    pub const fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// Returns true for `UID` prefixed commands.
    #[must_use]
    pub const fn is_uid(&self) -> bool {
        self.uid
    }

    pub(crate) fn into_parts(self) -> RequestParts {
        let segments = split_segments(&self.text);
        let mailbox = self.kind.is_select().then(|| self.mailbox_argument()).flatten();
        let expected = if self.kind == CommandKind::Fetch {
            self.expected_fetch_keys()
        } else {
            BTreeSet::new()
        };
        RequestParts {
            kind: self.kind,
            uid: self.uid,
            segments,
            payload: self.payload,
            observer: self.observer,
            authenticator: self.authenticator,
            mailbox,
            expected,
            text: self.text,
        }
    }

    /// Arguments after the verb (and after `UID`).
    fn arguments(&self) -> &str {
        let (_, rest) = split_verb(&self.text);
        if self.uid { split_verb(rest).1 } else { rest }
    }

    /// Mailbox argument of SELECT/EXAMINE.
    fn mailbox_argument(&self) -> Option<String> {
        let args = self.arguments();
        if let Some(inner) = args.strip_prefix('{') {
            let (size, after) = inner.split_once('}')?;
            let size: usize = size.trim_end_matches('+').parse().ok()?;
            let data = after.strip_prefix("\r\n")?;
            return data.get(..size).map(str::to_string);
        }
        decode_str(args, BracketMode::Atom).first().and_then(Value::to_text)
    }

    /// Attribute keys a FETCH will report for each message.
    fn expected_fetch_keys(&self) -> BTreeSet<FetchKey> {
        let values = decode_str(self.arguments(), BracketMode::Atom);
        let mut keys = BTreeSet::new();

        let items: Vec<String> = match values.get(1) {
            Some(Value::List(items)) => items.iter().filter_map(Value::to_text).collect(),
            Some(item) => item.to_text().into_iter().collect(),
            None => Vec::new(),
        };
        for item in items {
            add_fetch_item(&mut keys, &item);
        }

        if self.uid {
            keys.insert(FetchKey::attr("uid"));
        }
        let changed_since = values.get(2).and_then(Value::as_list).is_some_and(|modifiers| {
            modifiers
                .iter()
                .any(|m| m.as_str().is_some_and(|s| s.eq_ignore_ascii_case("CHANGEDSINCE")))
        });
        if changed_since {
            keys.insert(FetchKey::attr("modseq"));
        }
        keys
    }
}

/// A request split into what the engine keeps.
pub(crate) struct RequestParts {
    pub text: String,
    pub kind: CommandKind,
    pub uid: bool,
    pub segments: VecDeque<Bytes>,
    pub payload: Option<Bytes>,
    pub observer: Option<Box<dyn FetchObserver>>,
    pub authenticator: Option<Box<dyn Authenticator>>,
    pub mailbox: Option<String>,
    pub expected: BTreeSet<FetchKey>,
}

fn split_verb(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(' ') {
        Some(i) => (&text[..i], text[i + 1..].trim_start()),
        None => (text, ""),
    }
}

fn add_fetch_item(keys: &mut BTreeSet<FetchKey>, item: &str) {
    const FAST: [&str; 3] = ["flags", "internaldate", "rfc822.size"];

    match item.to_ascii_uppercase().as_str() {
        "FAST" => keys.extend(FAST.map(FetchKey::attr)),
        "ALL" => {
            keys.extend(FAST.map(FetchKey::attr));
            keys.insert(FetchKey::attr("envelope"));
        }
        "FULL" => {
            keys.extend(FAST.map(FetchKey::attr));
            keys.insert(FetchKey::attr("envelope"));
            keys.insert(FetchKey::attr("body"));
        }
        upper => {
            let unpeeked = upper.replacen(".PEEK[", "[", 1);
            // The partial range `<offset.count>` is not echoed back as is.
            let section = unpeeked.rfind(']').map_or(unpeeked.as_str(), |end| &unpeeked[..=end]);
            match body_key(section) {
                Some((section, _)) => keys.insert(FetchKey::body(&section)),
                None => keys.insert(FetchKey::attr(upper)),
            };
        }
    }
}

/// Splits command text after every synchronizing literal announcement
/// (`{N}` followed by CRLF). Each segment is written after the previous
/// one was acknowledged with a continuation. Non-synchronizing `{N+}`
/// literals stay inline.
fn split_segments(text: &str) -> VecDeque<Bytes> {
    let bytes = text.as_bytes();
    let mut segments = VecDeque::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' {
            let digits = bytes[i + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
            let close = i + 1 + digits;
            if digits > 0 && bytes[close..].starts_with(b"}\r\n") {
                segments.push_back(Bytes::copy_from_slice(&bytes[start..=close]));
                let size: usize = text[i + 1..close].parse().unwrap_or(0);
                start = close + 3;
                // The literal bytes themselves must not be scanned.
                i = (start + size).min(bytes.len());
                continue;
            }
        }
        i += 1;
    }
    segments.push_back(Bytes::copy_from_slice(&bytes[start..]));
    segments
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

    fn keys(text: &str) -> BTreeSet<FetchKey> {
        CommandRequest::new(text).into_parts().expected
    }

    #[test]
    fn test_kind_from_verb() {
        assert_eq!(CommandRequest::new("select INBOX").kind(), &CommandKind::Select);
        let request = CommandRequest::new("UID FETCH 1:* (FLAGS)");
        assert_eq!(request.kind(), &CommandKind::Fetch);
        assert!(request.is_uid());
        assert_eq!(
            CommandRequest::new("X-CUSTOM foo").kind(),
            &CommandKind::Other("X-CUSTOM".to_string())
        );
    }

    #[test]
    fn test_mailbox_argument() {
        let parts = CommandRequest::new("SELECT \"Sent Items\"").into_parts();
        assert_eq!(parts.mailbox.as_deref(), Some("Sent Items"));

        let parts = CommandRequest::new("EXAMINE {5}\r\nDraft (CONDSTORE)").into_parts();
        assert_eq!(parts.mailbox.as_deref(), Some("Draft"));

        assert!(CommandRequest::new("LIST \"\" *").into_parts().mailbox.is_none());
    }

    #[test]
    fn test_fetch_macros() {
        let all = keys("FETCH 1:5 ALL");
        assert_eq!(all.len(), 4);
        assert!(all.contains(&FetchKey::attr("envelope")));

        let full = keys("FETCH 1 FULL");
        assert!(full.contains(&FetchKey::attr("body")));
        assert_eq!(full.len(), 5);
    }

    #[test]
    fn test_fetch_body_sections_normalized() {
        let expected = keys("UID FETCH 4 (BODY.PEEK[header.fields (subject)]<0.100> BODY[1] FLAGS)");
        assert!(expected.contains(&FetchKey::body("HEADER.FIELDS (\"SUBJECT\")")));
        assert!(expected.contains(&FetchKey::body("1")));
        assert!(expected.contains(&FetchKey::attr("flags")));
        assert!(expected.contains(&FetchKey::attr("uid")));
        assert_eq!(expected.len(), 4);
    }

    #[test]
    fn test_fetch_changedsince_adds_modseq() {
        let expected = keys("FETCH 1:* (FLAGS) (CHANGEDSINCE 12345)");
        assert!(expected.contains(&FetchKey::attr("modseq")));
        assert!(keys("STORE 1 +FLAGS (\\Seen)").is_empty());
    }

    #[test]
    fn test_segments_split_on_synchronizing_literals() {
        let parts = CommandRequest::new("LOGIN {4}\r\nuser {4}\r\npass").into_parts();
        let segments: Vec<Bytes> = parts.segments.into_iter().collect();
        assert_eq!(segments, ["LOGIN {4}", "user {4}", "pass"]);
    }

    #[test]
    fn test_literal_contents_are_not_scanned() {
        let parts = CommandRequest::new("LOGIN {7}\r\n{1}\r\nab \"x\"").into_parts();
        let segments: Vec<Bytes> = parts.segments.into_iter().collect();
        assert_eq!(segments, ["LOGIN {7}", "{1}\r\nab \"x\""]);
    }

    #[test]
    fn test_non_synchronizing_literal_stays_inline() {
        let parts = CommandRequest::new("LOGIN {4+}\r\nuser pass").into_parts();
        assert_eq!(parts.segments.len(), 1);
    }

    #[test]
    fn test_payload_kept_separately() {
        let parts = CommandRequest::new("APPEND INBOX {5}").with_payload("hello").into_parts();
        assert_eq!(parts.kind, CommandKind::Append);
        assert_eq!(parts.segments.len(), 1);
        assert_eq!(parts.payload.unwrap(), "hello");
    }
}
