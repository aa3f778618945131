//! Response codes.

use crate::parser::Value;

/// Bracketed response code attached to a condition response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: Human-readable message that MUST be shown to user.
    Alert,
    /// BADCHARSET: optional list of supported charsets.
    BadCharset(Vec<String>),
    /// CAPABILITY: capability tokens.
    Capability(Vec<String>),
    /// PARSE: Error parsing message.
    Parse,
    /// PERMANENTFLAGS: raw flag tokens, `\*` included.
    PermanentFlags(Vec<String>),
    /// READ-ONLY: Mailbox selected as read-only.
    ReadOnly,
    /// READ-WRITE: Mailbox selected as read-write.
    ReadWrite,
    /// TRYCREATE: Mailbox doesn't exist, but can be created.
    TryCreate,
    /// UIDNEXT: Next UID to be assigned.
    UidNext(u64),
    /// UIDVALIDITY: Unique identifier validity value.
    UidValidity(u64),
    /// UNSEEN: First unseen message sequence number.
    Unseen(u64),
    /// APPENDUID (UIDPLUS).
    AppendUid {
        /// UIDVALIDITY of the destination mailbox.
        uid_validity: u64,
        /// UID set assigned to the appended messages.
        uids: String,
    },
    /// COPYUID (UIDPLUS).
    CopyUid {
        /// UIDVALIDITY of the destination mailbox.
        uid_validity: u64,
        /// Source UID set.
        source: String,
        /// Destination UID set.
        destination: String,
    },
    /// HIGHESTMODSEQ (CONDSTORE). Kept as text, mod-sequences are 63-bit.
    HighestModSeq(String),
    /// NOMODSEQ: Server doesn't support mod-sequences for this mailbox.
    NoModSeq,
    /// UIDNOTSTICKY: UIDs are not persistent across sessions.
    UidNotSticky,
    /// CLOSED (QRESYNC): the previous mailbox was closed.
    Closed,
    /// OVERQUOTA (RFC 5530).
    OverQuota,
    /// ALREADYEXISTS (RFC 5530).
    AlreadyExists,
    /// NONEXISTENT (RFC 5530).
    NonExistent,
    /// AUTHENTICATIONFAILED (RFC 5530).
    AuthenticationFailed,
    /// UNAVAILABLE (RFC 5530).
    Unavailable,
    /// Any other code, with its arguments as decoded.
    Other {
        /// Uppercased code name.
        name: String,
        /// Remaining tokens.
        values: Vec<Value>,
    },
}

impl ResponseCode {
    /// Builds a response code from the nested-bracket decode of the text
    /// between `[` and `]`.
    #[must_use]
    pub fn from_values(mut values: Vec<Value>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let name = values.remove(0).to_text()?.to_ascii_uppercase();
        let mut args = values.into_iter();

        let code = match name.as_str() {
            "ALERT" => Self::Alert,
            "PARSE" => Self::Parse,
            "READ-ONLY" => Self::ReadOnly,
            "READ-WRITE" => Self::ReadWrite,
            "TRYCREATE" => Self::TryCreate,
            "NOMODSEQ" => Self::NoModSeq,
            "UIDNOTSTICKY" => Self::UidNotSticky,
            "CLOSED" => Self::Closed,
            "OVERQUOTA" => Self::OverQuota,
            "ALREADYEXISTS" => Self::AlreadyExists,
            "NONEXISTENT" => Self::NonExistent,
            "AUTHENTICATIONFAILED" => Self::AuthenticationFailed,
            "UNAVAILABLE" => Self::Unavailable,
            "CAPABILITY" => Self::Capability(args.filter_map(|v| v.to_text()).collect()),
            "BADCHARSET" => Self::BadCharset(
                args.next()
                    .as_ref()
                    .and_then(Value::as_list)
                    .map(texts)
                    .unwrap_or_default(),
            ),
            "PERMANENTFLAGS" => Self::PermanentFlags(
                args.next()
                    .as_ref()
                    .and_then(Value::as_list)
                    .map(texts)
                    .unwrap_or_default(),
            ),
            "UIDNEXT" | "UIDVALIDITY" | "UNSEEN" => {
                let rest: Vec<Value> = args.collect();
                match rest.first().and_then(Value::to_number) {
                    Some(n) if name == "UIDNEXT" => Self::UidNext(n),
                    Some(n) if name == "UIDVALIDITY" => Self::UidValidity(n),
                    Some(n) => Self::Unseen(n),
                    None => Self::Other { name, values: rest },
                }
            }
            "HIGHESTMODSEQ" => {
                let rest: Vec<Value> = args.collect();
                match rest.first().and_then(Value::to_text) {
                    Some(modseq) => Self::HighestModSeq(modseq),
                    None => Self::Other { name, values: rest },
                }
            }
            "APPENDUID" => {
                let rest: Vec<Value> = args.collect();
                match (rest.first().and_then(Value::to_number), rest.get(1).and_then(Value::to_text)) {
                    (Some(uid_validity), Some(uids)) => Self::AppendUid { uid_validity, uids },
                    _ => Self::Other { name, values: rest },
                }
            }
            "COPYUID" => {
                let rest: Vec<Value> = args.collect();
                match (
                    rest.first().and_then(Value::to_number),
                    rest.get(1).and_then(Value::to_text),
                    rest.get(2).and_then(Value::to_text),
                ) {
                    (Some(uid_validity), Some(source), Some(destination)) => Self::CopyUid {
                        uid_validity,
                        source,
                        destination,
                    },
                    _ => Self::Other { name, values: rest },
                }
            }
            _ => Self::Other {
                name,
                values: args.collect(),
            },
        };
        Some(code)
    }

    /// Returns true for ALERT.
    #[must_use]
    pub const fn is_alert(&self) -> bool {
        matches!(self, Self::Alert)
    }
}

fn texts(items: &[Value]) -> Vec<String> {
    items.iter().filter_map(Value::to_text).collect()
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

    fn code(values: Vec<Value>) -> ResponseCode {
        ResponseCode::from_values(values).unwrap()
    }

    #[test]
    fn test_simple_codes() {
        assert_eq!(code(vec![Value::text("alert")]), ResponseCode::Alert);
        assert_eq!(code(vec![Value::text("READ-ONLY")]), ResponseCode::ReadOnly);
        assert!(ResponseCode::from_values(vec![]).is_none());
    }

    #[test]
    fn test_numeric_codes() {
        assert_eq!(code(vec![Value::text("UIDNEXT"), Value::Number(4392)]), ResponseCode::UidNext(4392));
        assert_eq!(
            code(vec![Value::text("UIDVALIDITY"), Value::Number(3857529045)]),
            ResponseCode::UidValidity(3857529045)
        );
        assert_eq!(
            code(vec![Value::text("HIGHESTMODSEQ"), Value::text("90071992547409930")]),
            ResponseCode::HighestModSeq("90071992547409930".to_string())
        );
    }

    #[test]
    fn test_permanent_flags() {
        let flags = Value::List(vec![Value::text("\\Seen"), Value::text("$Forwarded"), Value::text("\\*")]);
        assert_eq!(
            code(vec![Value::text("PERMANENTFLAGS"), flags]),
            ResponseCode::PermanentFlags(vec!["\\Seen".to_string(), "$Forwarded".to_string(), "\\*".to_string()])
        );
    }

    #[test]
    fn test_uidplus_codes() {
        assert_eq!(
            code(vec![Value::text("APPENDUID"), Value::Number(38505), Value::Number(3955)]),
            ResponseCode::AppendUid {
                uid_validity: 38505,
                uids: "3955".to_string()
            }
        );
        assert_eq!(
            code(vec![
                Value::text("COPYUID"),
                Value::Number(38505),
                Value::text("304,319:320"),
                Value::text("3956:3958")
            ]),
            ResponseCode::CopyUid {
                uid_validity: 38505,
                source: "304,319:320".to_string(),
                destination: "3956:3958".to_string()
            }
        );
    }

    #[test]
    fn test_capability_code() {
        assert_eq!(
            code(vec![Value::text("CAPABILITY"), Value::text("IMAP4rev1"), Value::text("IDLE")]),
            ResponseCode::Capability(vec!["IMAP4rev1".to_string(), "IDLE".to_string()])
        );
    }

    #[test]
    fn test_unknown_code_keeps_arguments() {
        assert_eq!(
            code(vec![Value::text("x-gm-thing"), Value::Number(1)]),
            ResponseCode::Other {
                name: "X-GM-THING".to_string(),
                values: vec![Value::Number(1)]
            }
        );
    }
}
