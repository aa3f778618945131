//! Response data types.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use mailwire_mime::Headers;

use crate::parser::Value;
use crate::types::{MailboxState, ResponseCode, SpecialUse, Status};

/// Parameter map of a body part or disposition; keys lowercased.
pub type Params = BTreeMap<String, Option<String>>;

/// Email address from an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    /// Display name, encoded words decoded.
    pub name: Option<String>,
    /// Mailbox name (local part).
    pub mailbox: Option<String>,
    /// Host name (domain part).
    pub host: Option<String>,
}

impl Address {
    /// Returns the full email address.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            _ => None,
        }
    }
}

/// Entry of an envelope address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressEntry {
    /// A single address.
    Mailbox(Address),
    /// A named group (RFC 5322 `name: a, b;`).
    Group {
        /// Group display name.
        name: String,
        /// Members in order.
        members: Vec<Address>,
    },
}

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Date header, as sent.
    pub date: Option<String>,
    /// Subject header, encoded words decoded.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Option<Vec<AddressEntry>>,
    /// Sender addresses.
    pub sender: Option<Vec<AddressEntry>>,
    /// Reply-To addresses.
    pub reply_to: Option<Vec<AddressEntry>>,
    /// To addresses.
    pub to: Option<Vec<AddressEntry>>,
    /// Cc addresses.
    pub cc: Option<Vec<AddressEntry>>,
    /// Bcc addresses.
    pub bcc: Option<Vec<AddressEntry>>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

impl Envelope {
    /// Parses the Date field as an RFC 2822 timestamp.
    #[must_use]
    pub fn parsed_date(&self) -> Option<DateTime<FixedOffset>> {
        self.date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
    }
}

/// Content-Disposition of a body part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    /// Disposition type as sent (`inline`, `attachment`, ...).
    pub kind: String,
    /// Parameters, if the server sent a list.
    pub params: Option<Params>,
}

/// Trailing extension fields shared by multipart and single parts.
///
/// `None` covers both an absent field and an explicit NIL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyExtension {
    /// Content-Disposition.
    pub disposition: Option<Disposition>,
    /// Content-Language, always a list.
    pub language: Option<Vec<String>>,
    /// Content-Location.
    pub location: Option<String>,
    /// Anything the server appended beyond location, undecoded.
    pub extensions: Option<Value>,
}

/// A leaf MIME part.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SinglePart {
    /// Dot path of the part (`"1"`, `"2.1"`).
    pub part_id: String,
    /// Lowercased media type; empty when the server sent NIL.
    pub media_type: String,
    /// Lowercased subtype; `None` for malformed tuples without one.
    pub subtype: Option<String>,
    /// Body parameters.
    pub params: Option<Params>,
    /// Content-ID.
    pub id: Option<String>,
    /// Content-Description.
    pub description: Option<String>,
    /// Content-Transfer-Encoding.
    pub encoding: Option<String>,
    /// Size in octets.
    pub size: Option<u64>,
    /// Size in lines, for text and message/rfc822 parts.
    pub lines: Option<u64>,
    /// Content-MD5.
    pub md5: Option<String>,
    /// Envelope of an encapsulated message/rfc822.
    pub envelope: Option<Box<Envelope>>,
    /// Structure of an encapsulated message/rfc822.
    pub body: Option<Box<BodyStructure>>,
    /// Extension fields.
    pub extension: BodyExtension,
}

/// MIME body structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyStructure {
    /// Multipart container.
    Multipart {
        /// Lowercased multipart subtype (`mixed`, `alternative`, ...).
        subtype: String,
        /// Parameters such as the boundary.
        params: Option<Params>,
        /// Child parts.
        children: Vec<BodyStructure>,
        /// Extension fields.
        extension: BodyExtension,
    },
    /// Leaf part.
    Single(Box<SinglePart>),
}

impl BodyStructure {
    /// Finds a leaf by part id, descending into encapsulated messages.
    #[must_use]
    pub fn find(&self, part_id: &str) -> Option<&SinglePart> {
        match self {
            Self::Multipart { children, .. } => children.iter().find_map(|c| c.find(part_id)),
            Self::Single(part) if part.part_id == part_id => Some(part),
            Self::Single(part) => part.body.as_deref().and_then(|b| b.find(part_id)),
        }
    }

    /// Returns the extension fields of this node.
    #[must_use]
    pub fn extension(&self) -> &BodyExtension {
        match self {
            Self::Multipart { extension, .. } => extension,
            Self::Single(part) => &part.extension,
        }
    }
}

/// Decoded value of one FETCH data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchValue {
    /// FLAGS, as sent.
    Flags(Vec<String>),
    /// ENVELOPE.
    Envelope(Box<Envelope>),
    /// INTERNALDATE.
    InternalDate(DateTime<FixedOffset>),
    /// BODY or BODYSTRUCTURE.
    BodyStructure(BodyStructure),
    /// MODSEQ, as decimal text.
    ModSeq(String),
    /// RFC822.HEADER, unfolded with encoded words decoded.
    Headers(Headers),
    /// Anything else, undecoded.
    Value(Value),
}

/// Attribute map of one message, keyed by lowercased item name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchAttributes(BTreeMap<String, FetchValue>);

impl FetchAttributes {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one item, replacing an earlier value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: FetchValue) {
        self.0.insert(key.into(), value);
    }

    /// Merges `other` into `self`; later values win.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Returns an item by lowercased key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FetchValue> {
        self.0.get(key)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates over the keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over all items.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FetchValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no item was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// UID of the message.
    #[must_use]
    pub fn uid(&self) -> Option<u64> {
        match self.get("uid")? {
            FetchValue::Value(v) => v.to_number(),
            _ => None,
        }
    }

    /// RFC822.SIZE of the message.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        match self.get("rfc822.size")? {
            FetchValue::Value(v) => v.to_number(),
            _ => None,
        }
    }

    /// FLAGS of the message.
    #[must_use]
    pub fn flags(&self) -> Option<&[String]> {
        match self.get("flags")? {
            FetchValue::Flags(flags) => Some(flags),
            _ => None,
        }
    }

    /// ENVELOPE of the message.
    #[must_use]
    pub fn envelope(&self) -> Option<&Envelope> {
        match self.get("envelope")? {
            FetchValue::Envelope(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// BODYSTRUCTURE, falling back to BODY.
    #[must_use]
    pub fn body_structure(&self) -> Option<&BodyStructure> {
        ["bodystructure", "body"]
            .into_iter()
            .find_map(|key| match self.get(key)? {
                FetchValue::BodyStructure(structure) => Some(structure),
                _ => None,
            })
    }

    /// INTERNALDATE of the message.
    #[must_use]
    pub fn internal_date(&self) -> Option<DateTime<FixedOffset>> {
        match self.get("internaldate")? {
            FetchValue::InternalDate(date) => Some(*date),
            _ => None,
        }
    }

    /// MODSEQ of the message.
    #[must_use]
    pub fn modseq(&self) -> Option<&str> {
        match self.get("modseq")? {
            FetchValue::ModSeq(modseq) => Some(modseq),
            _ => None,
        }
    }

    /// Raw bytes of an undecoded text item such as `RFC822` or
    /// `RFC822.TEXT`.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<&[u8]> {
        match self.get(key)? {
            FetchValue::Value(value) => value.as_bytes(),
            _ => None,
        }
    }

    /// Decoded RFC822.HEADER block.
    #[must_use]
    pub fn headers(&self) -> Option<&Headers> {
        match self.get("rfc822.header")? {
            FetchValue::Headers(headers) => Some(headers),
            _ => None,
        }
    }
}

/// A `BODY[...]` value sent inline (quoted string or NIL) rather than as a
/// literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineBody {
    /// Section text between the brackets.
    pub section: String,
    /// Partial origin, from `<n>`.
    pub origin: Option<u64>,
    /// Body bytes; empty for NIL.
    pub data: Bytes,
}

/// One FETCH response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchData {
    /// Message sequence number.
    pub seq: u32,
    /// Decoded attributes.
    pub attributes: FetchAttributes,
    /// Inline body sections, in order of appearance.
    pub bodies: Vec<InlineBody>,
}

/// Which command family produced a mailbox listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// LIST.
    List,
    /// LSUB.
    Lsub,
    /// XLIST (Gmail).
    Xlist,
}

/// One LIST/LSUB/XLIST entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Source command family.
    pub kind: ListKind,
    /// Attributes, backslash stripped and uppercased, `HASNOCHILDREN` dropped.
    pub attributes: Vec<String>,
    /// Hierarchy delimiter; `None` when NIL (flat namespace).
    pub delimiter: Option<String>,
    /// Mailbox name as sent (modified UTF-7 is not decoded).
    pub name: String,
    /// Special-use role from the raw attributes.
    pub special_use: Option<SpecialUse>,
}

/// STATUS response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusData {
    /// Mailbox name.
    pub mailbox: String,
    /// Attributes keyed lowercased (`messages`, `uidnext`, ...).
    pub attributes: BTreeMap<String, Value>,
}

impl StatusData {
    /// Builds the mailbox snapshot this STATUS describes.
    #[must_use]
    pub fn to_mailbox(&self) -> MailboxState {
        let number = |key: &str| self.attributes.get(key).and_then(Value::to_number);
        let small = |key: &str| number(key).and_then(|n| u32::try_from(n).ok());

        let mut state = MailboxState::new(self.mailbox.clone());
        state.total = small("messages").unwrap_or(0);
        state.new = small("recent").unwrap_or(0);
        state.unseen = small("unseen");
        state.uid_next = number("uidnext");
        state.uid_validity = number("uidvalidity");
        state.highest_modseq = self.attributes.get("highestmodseq").and_then(Value::to_text);
        state
    }
}

/// SEARCH response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchData {
    /// Matching sequence numbers or UIDs.
    pub ids: Vec<u64>,
    /// Highest MODSEQ of the matches (CONDSTORE).
    pub modseq: Option<String>,
}

/// ESEARCH response (RFC 4731).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ESearchData {
    /// Whether the results are UIDs.
    pub uid: bool,
    /// MIN.
    pub min: Option<u64>,
    /// MAX.
    pub max: Option<u64>,
    /// COUNT.
    pub count: Option<u64>,
    /// ALL, split on commas (ranges kept as `a:b`).
    pub all: Option<Vec<String>>,
    /// MODSEQ.
    pub modseq: Option<String>,
    /// Any other return item, keyed lowercased.
    pub other: BTreeMap<String, Value>,
}

/// One namespace descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Prefix.
    pub prefix: String,
    /// Hierarchy delimiter; `None` when NIL.
    pub delimiter: Option<String>,
    /// Extension name to flag values (RFC 2342 section 5).
    pub extensions: Option<BTreeMap<String, Vec<String>>>,
}

/// NAMESPACE response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Namespaces {
    /// Personal namespaces.
    pub personal: Option<Vec<Namespace>>,
    /// Other users' namespaces.
    pub other: Option<Vec<Namespace>>,
    /// Shared namespaces.
    pub shared: Option<Vec<Namespace>>,
}

/// Usage of one quota resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaUsage {
    /// Current usage.
    pub usage: u64,
    /// Limit.
    pub limit: u64,
}

/// QUOTA response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    /// Quota root name.
    pub root: String,
    /// Resources keyed lowercased (`storage`, `message`).
    pub resources: BTreeMap<String, QuotaUsage>,
}

/// QUOTAROOT response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaRoot {
    /// Mailbox name.
    pub mailbox: String,
    /// Quota roots of the mailbox.
    pub roots: Vec<String>,
}

/// Untagged condition (OK/NO/BAD/PREAUTH/BYE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Status keyword.
    pub status: Status,
    /// Response code.
    pub code: Option<ResponseCode>,
    /// Human-readable text.
    pub text: String,
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// OK, NO, BAD, PREAUTH or BYE.
    Condition(Condition),
    /// CAPABILITY response.
    Capability(Vec<String>),
    /// ENABLED response.
    Enabled(Vec<String>),
    /// LIST, LSUB or XLIST response.
    List(ListEntry),
    /// FLAGS response.
    Flags(Vec<String>),
    /// EXISTS response.
    Exists(u32),
    /// RECENT response.
    Recent(u32),
    /// EXPUNGE response.
    Expunge(u32),
    /// FETCH response.
    Fetch(FetchData),
    /// SEARCH response.
    Search(SearchData),
    /// SORT response.
    Sort(Vec<u64>),
    /// THREAD response, nested lists as sent.
    Thread(Vec<Value>),
    /// ESEARCH response.
    ESearch(ESearchData),
    /// STATUS response.
    Status(StatusData),
    /// NAMESPACE response.
    Namespace(Namespaces),
    /// QUOTA response.
    Quota(Quota),
    /// QUOTAROOT response.
    QuotaRoot(QuotaRoot),
    /// ID response; `None` for NIL.
    Id(Option<BTreeMap<String, Option<String>>>),
    /// Any other untagged response.
    Other {
        /// Uppercased response name.
        name: String,
        /// Remaining text.
        text: String,
    },
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
    fn test_address_email() {
        let addr = Address {
            name: Some("John Doe".to_string()),
            mailbox: Some("john".to_string()),
            host: Some("example.com".to_string()),
        };
        assert_eq!(addr.email(), Some("john@example.com".to_string()));
        assert_eq!(Address::default().email(), None);
    }

    #[test]
    fn test_envelope_parsed_date() {
        let envelope = Envelope {
            date: Some("Mon, 7 Feb 1994 21:52:25 -0800".to_string()),
            ..Envelope::default()
        };
        let date = envelope.parsed_date().unwrap();
        assert_eq!(date.offset().local_minus_utc(), -8 * 3600);
    }

    #[test]
    fn test_fetch_attributes_merge_and_accessors() {
        let mut first = FetchAttributes::new();
        first.insert("uid", FetchValue::Value(Value::Number(7)));
        first.insert("flags", FetchValue::Flags(vec!["\\Seen".to_string()]));

        let mut second = FetchAttributes::new();
        second.insert("flags", FetchValue::Flags(vec![]));
        second.insert("rfc822.size", FetchValue::Value(Value::Number(44827)));

        first.merge(second);
        assert_eq!(first.uid(), Some(7));
        assert_eq!(first.size(), Some(44827));
        assert_eq!(first.flags(), Some(&[][..]));
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_status_snapshot() {
        let status = StatusData {
            mailbox: "INBOX".to_string(),
            attributes: BTreeMap::from([
                ("messages".to_string(), Value::Number(231)),
                ("uidnext".to_string(), Value::Number(44292)),
                ("unseen".to_string(), Value::Number(3)),
            ]),
        };
        let state = status.to_mailbox();
        assert_eq!(state.name, "INBOX");
        assert_eq!(state.total, 231);
        assert_eq!(state.uid_next, Some(44292));
        assert_eq!(state.unseen, Some(3));
        assert_eq!(state.uid_validity, None);
    }

    #[test]
    fn test_body_structure_find() {
        let leaf = |id: &str| {
            BodyStructure::Single(Box::new(SinglePart {
                part_id: id.to_string(),
                media_type: "text".to_string(),
                subtype: Some("plain".to_string()),
                ..SinglePart::default()
            }))
        };
        let tree = BodyStructure::Multipart {
            subtype: "mixed".to_string(),
            params: None,
            children: vec![leaf("1"), leaf("2")],
            extension: BodyExtension::default(),
        };
        assert_eq!(tree.find("2").unwrap().part_id, "2");
        assert!(tree.find("3").is_none());
    }
}
