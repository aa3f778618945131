//! Structured response decoding.
//!
//! Turns one assembled response line (literals already cut out and queued)
//! into a typed [`Response`]. Decoding never fails: shapes that cannot be
//! classified come back as [`Response::Unrecognized`].

#![allow(clippy::match_same_arms)]
#![allow(clippy::option_if_let_else)]

mod fetch;
mod helpers;
mod types;

pub use fetch::{body_key, decode_addresses, decode_body_structure, decode_envelope, decode_fetch};
pub use types::{
    Address, AddressEntry, BodyExtension, BodyStructure, Condition, Disposition, ESearchData,
    Envelope, FetchAttributes, FetchData, FetchValue, InlineBody, ListEntry, ListKind, Namespace,
    Namespaces, Params, Quota, QuotaRoot, QuotaUsage, SearchData, SinglePart, StatusData,
    UntaggedResponse,
};

use std::collections::BTreeMap;

use crate::parser::expression::decode;
use crate::parser::{LiteralQueue, Value};
use crate::types::{ResponseCode, SpecialUse, Status, Tag};

use helpers::{numbers, pairs, split_text_code, split_token, texts};

/// Attribute dropped from LIST results.
const HAS_NO_CHILDREN: &str = "HASNOCHILDREN";

/// A decoded server response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Text after `+`, often a base64 challenge.
        text: String,
    },
    /// Line with no recognizable shape, verbatim.
    Unrecognized(String),
}

/// Decodes one response line.
///
/// Every literal placeholder in `line` takes the next entry of `literals`.
pub fn decode_response(line: &str, literals: &mut LiteralQueue) -> Response {
    if let Some(rest) = line.strip_prefix('*') {
        return decode_untagged(rest.trim_start(), literals)
            .map_or_else(|| Response::Unrecognized(line.to_string()), Response::Untagged);
    }

    if let Some(rest) = line.strip_prefix('+') {
        let (code, text) = split_text_code(rest, literals);
        return Response::Continuation { code, text };
    }

    let (tag, rest) = split_token(line);
    let (status, text) = split_token(rest);
    match Status::parse(status) {
        Some(status @ (Status::Ok | Status::No | Status::Bad)) if Tag::is_client_tag(tag) => {
            let (code, text) = split_text_code(text, literals);
            Response::Tagged {
                tag: Tag::new(tag),
                status,
                code,
                text,
            }
        }
        _ => Response::Unrecognized(line.to_string()),
    }
}

fn decode_untagged(input: &str, literals: &mut LiteralQueue) -> Option<UntaggedResponse> {
    let (first, rest) = split_token(input);
    if first.is_empty() {
        return None;
    }

    if first.bytes().all(|b| b.is_ascii_digit()) {
        let number: u32 = first.parse().ok()?;
        let (name, payload) = split_token(rest);
        return Some(match name.to_ascii_uppercase().as_str() {
            "EXISTS" => UntaggedResponse::Exists(number),
            "RECENT" => UntaggedResponse::Recent(number),
            "EXPUNGE" => UntaggedResponse::Expunge(number),
            "FETCH" => UntaggedResponse::Fetch(decode_fetch(number, &decode(payload, literals))),
            other => UntaggedResponse::Other {
                name: other.to_string(),
                text: rest.to_string(),
            },
        });
    }

    let name = first.to_ascii_uppercase();
    if let Some(status) = Status::parse(&name) {
        let (code, text) = split_text_code(rest, literals);
        return Some(UntaggedResponse::Condition(Condition { status, code, text }));
    }

    let response = match name.as_str() {
        "CAPABILITY" => UntaggedResponse::Capability(words(rest)),
        "ENABLED" => UntaggedResponse::Enabled(words(rest)),
        "FLAGS" => {
            let values = decode(rest, literals);
            UntaggedResponse::Flags(values.first().and_then(Value::as_list).map(texts).unwrap_or_default())
        }
        "LIST" => UntaggedResponse::List(decode_list(ListKind::List, &decode(rest, literals))),
        "LSUB" => UntaggedResponse::List(decode_list(ListKind::Lsub, &decode(rest, literals))),
        "XLIST" => UntaggedResponse::List(decode_list(ListKind::Xlist, &decode(rest, literals))),
        "STATUS" => UntaggedResponse::Status(decode_status(&decode(rest, literals))),
        "SEARCH" => UntaggedResponse::Search(decode_search(&decode(rest, literals))),
        "SORT" => UntaggedResponse::Sort(numbers(&decode(rest, literals))),
        "THREAD" => UntaggedResponse::Thread(decode(rest, literals)),
        "ESEARCH" => UntaggedResponse::ESearch(decode_esearch(decode(rest, literals))),
        "NAMESPACE" => UntaggedResponse::Namespace(decode_namespaces(&decode(rest, literals))),
        "QUOTA" => UntaggedResponse::Quota(decode_quota(&decode(rest, literals))),
        "QUOTAROOT" => {
            let values = decode(rest, literals);
            let mut items = values.iter().filter_map(Value::to_text);
            UntaggedResponse::QuotaRoot(QuotaRoot {
                mailbox: items.next().unwrap_or_default(),
                roots: items.collect(),
            })
        }
        "ID" => UntaggedResponse::Id(decode_id(&decode(rest, literals))),
        _ => UntaggedResponse::Other {
            name,
            text: rest.to_string(),
        },
    };
    Some(response)
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

fn decode_list(kind: ListKind, values: &[Value]) -> ListEntry {
    let raw = values.first().and_then(Value::as_list).map(texts).unwrap_or_default();
    let special_use = raw.iter().find_map(|a| SpecialUse::parse(a));
    let attributes = raw
        .iter()
        .map(|a| a.strip_prefix('\\').unwrap_or(a).to_ascii_uppercase())
        .filter(|a| a != HAS_NO_CHILDREN)
        .collect();

    ListEntry {
        kind,
        attributes,
        delimiter: values.get(1).and_then(Value::to_text),
        name: values.get(2).and_then(Value::to_text).unwrap_or_default(),
        special_use,
    }
}

fn decode_status(values: &[Value]) -> StatusData {
    StatusData {
        mailbox: values.first().and_then(Value::to_text).unwrap_or_default(),
        attributes: values.get(1).and_then(Value::as_list).map(pairs).unwrap_or_default(),
    }
}

fn decode_search(values: &[Value]) -> SearchData {
    let modseq = values.last().and_then(Value::as_list).and_then(|items| {
        match items {
            [key, value] if key.as_str().is_some_and(|k| k.eq_ignore_ascii_case("MODSEQ")) => value.to_text(),
            _ => None,
        }
    });
    SearchData {
        ids: numbers(values),
        modseq,
    }
}

fn decode_esearch(values: Vec<Value>) -> ESearchData {
    let mut data = ESearchData::default();
    let mut items = values.into_iter().peekable();

    // Correlator `(TAG "A0001")`.
    if matches!(items.peek(), Some(Value::List(_))) {
        items.next();
    }
    if items.peek().and_then(Value::as_str).is_some_and(|s| s.eq_ignore_ascii_case("UID")) {
        data.uid = true;
        items.next();
    }

    while let Some(key) = items.next() {
        let Some(key) = key.to_text() else {
            continue;
        };
        let value = items.next().unwrap_or(Value::Nil);
        match key.to_ascii_uppercase().as_str() {
            "MIN" => data.min = value.to_number(),
            "MAX" => data.max = value.to_number(),
            "COUNT" => data.count = value.to_number(),
            "ALL" => {
                data.all = value
                    .to_text()
                    .map(|set| set.split(',').map(str::to_string).collect());
            }
            "MODSEQ" => data.modseq = value.to_text(),
            _ => {
                data.other.insert(key.to_ascii_lowercase(), value);
            }
        }
    }
    data
}

fn decode_namespaces(values: &[Value]) -> Namespaces {
    let group = |value: Option<&Value>| -> Option<Vec<Namespace>> {
        let entries = value?.as_list()?;
        Some(
            entries
                .iter()
                .filter_map(Value::as_list)
                .map(|entry| Namespace {
                    prefix: entry.first().and_then(Value::to_text).unwrap_or_default(),
                    delimiter: entry.get(1).and_then(Value::to_text),
                    extensions: (entry.len() > 2).then(|| {
                        entry[2..]
                            .chunks(2)
                            .filter_map(|pair| {
                                let name = pair[0].to_text()?;
                                let flags = pair.get(1).and_then(Value::as_list).map(texts).unwrap_or_default();
                                Some((name, flags))
                            })
                            .collect()
                    }),
                })
                .collect(),
        )
    };

    Namespaces {
        personal: group(values.first()),
        other: group(values.get(1)),
        shared: group(values.get(2)),
    }
}

fn decode_quota(values: &[Value]) -> Quota {
    let mut resources = BTreeMap::new();
    if let Some(items) = values.get(1).and_then(Value::as_list) {
        for triple in items.chunks(3) {
            let [name, usage, limit] = triple else {
                continue;
            };
            if let (Some(name), Some(usage), Some(limit)) = (name.to_text(), usage.to_number(), limit.to_number()) {
                resources.insert(name.to_ascii_lowercase(), QuotaUsage { usage, limit });
            }
        }
    }
    Quota {
        root: values.first().and_then(Value::to_text).unwrap_or_default(),
        resources,
    }
}

fn decode_id(values: &[Value]) -> Option<BTreeMap<String, Option<String>>> {
    let items = values.first()?.as_list()?;
    Some(
        items
            .chunks(2)
            .filter_map(|pair| {
                let key = pair[0].to_text()?.to_ascii_lowercase();
                Some((key, pair.get(1).and_then(Value::to_text)))
            })
            .collect(),
    )
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
    use crate::parser::LITERAL_PLACEHOLDER;

    fn parse(line: &str) -> Response {
        decode_response(line, &mut LiteralQueue::new())
    }

    fn untagged(line: &str) -> UntaggedResponse {
        match parse(line) {
            Response::Untagged(untagged) => untagged,
            other => panic!("expected untagged response, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_ok_response() {
        match untagged("* OK [CAPABILITY IMAP4rev1 IDLE] server ready") {
            UntaggedResponse::Condition(Condition { status, code, text }) => {
                assert_eq!(status, Status::Ok);
                assert_eq!(
                    code,
                    Some(ResponseCode::Capability(vec!["IMAP4rev1".to_string(), "IDLE".to_string()]))
                );
                assert_eq!(text, "server ready");
            }
            other => panic!("expected condition, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_tagged() {
        match parse("A0001 NO [AUTHENTICATIONFAILED] Invalid credentials") {
            Response::Tagged { tag, status, code, text } => {
                assert_eq!(tag.as_str(), "A0001");
                assert_eq!(status, Status::No);
                assert_eq!(code, Some(ResponseCode::AuthenticationFailed));
                assert_eq!(text, "Invalid credentials");
            }
            other => panic!("expected tagged, got {other:?}"),
        }
        assert!(matches!(parse("IDLE OK IDLE terminated"), Response::Tagged { .. }));
    }

    #[test]
    fn test_unrecognized_lines() {
        assert_eq!(parse("hello there"), Response::Unrecognized("hello there".to_string()));
        assert_eq!(parse("A0001 MAYBE"), Response::Unrecognized("A0001 MAYBE".to_string()));
        assert_eq!(parse("*"), Response::Unrecognized("*".to_string()));
    }

    #[test]
    fn test_parse_continuation() {
        assert_eq!(
            parse("+ idling"),
            Response::Continuation {
                code: None,
                text: "idling".to_string()
            }
        );
        assert_eq!(
            parse("+"),
            Response::Continuation {
                code: None,
                text: String::new()
            }
        );
    }

    #[test]
    fn test_parse_capability() {
        assert_eq!(
            untagged("* CAPABILITY IMAP4rev1 IDLE NAMESPACE"),
            UntaggedResponse::Capability(vec!["IMAP4rev1".to_string(), "IDLE".to_string(), "NAMESPACE".to_string()])
        );
    }

    #[test]
    fn test_parse_counters() {
        assert_eq!(untagged("* 23 EXISTS"), UntaggedResponse::Exists(23));
        assert_eq!(untagged("* 5 recent"), UntaggedResponse::Recent(5));
        assert_eq!(untagged("* 3 EXPUNGE"), UntaggedResponse::Expunge(3));
    }

    #[test]
    fn test_parse_flags() {
        assert_eq!(
            untagged(r"* FLAGS (\Answered \Flagged $Forwarded)"),
            UntaggedResponse::Flags(vec!["\\Answered".to_string(), "\\Flagged".to_string(), "$Forwarded".to_string()])
        );
    }

    #[test]
    fn test_parse_list() {
        match untagged(r#"* LIST (\HasNoChildren \Sent) "/" "Sent Items""#) {
            UntaggedResponse::List(entry) => {
                assert_eq!(entry.kind, ListKind::List);
                assert_eq!(entry.attributes, ["SENT"]);
                assert_eq!(entry.delimiter.as_deref(), Some("/"));
                assert_eq!(entry.name, "Sent Items");
                assert_eq!(entry.special_use, Some(SpecialUse::Sent));
            }
            other => panic!("expected list, got {other:?}"),
        }

        match untagged(r"* LSUB () NIL Flat") {
            UntaggedResponse::List(entry) => {
                assert_eq!(entry.kind, ListKind::Lsub);
                assert_eq!(entry.delimiter, None);
                assert_eq!(entry.name, "Flat");
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_list_literal_name() {
        let mut literals: LiteralQueue = ["Name with \"quotes\""].into_iter().collect();
        let line = format!("* LIST () \"/\" {LITERAL_PLACEHOLDER}");
        match decode_response(&line, &mut literals) {
            Response::Untagged(UntaggedResponse::List(entry)) => {
                assert_eq!(entry.name, "Name with \"quotes\"");
            }
            other => panic!("expected list, got {other:?}"),
        }
        assert!(literals.is_empty());
    }

    #[test]
    fn test_parse_status() {
        match untagged("* STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292)") {
            UntaggedResponse::Status(status) => {
                assert_eq!(status.mailbox, "blurdybloop");
                assert_eq!(status.attributes.get("messages"), Some(&Value::Number(231)));
                assert_eq!(status.attributes.get("uidnext"), Some(&Value::Number(44292)));
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_search() {
        assert_eq!(
            untagged("* SEARCH 2 84 882"),
            UntaggedResponse::Search(SearchData {
                ids: vec![2, 84, 882],
                modseq: None
            })
        );
        assert_eq!(
            untagged("* SEARCH 2 5 (MODSEQ 917162500)"),
            UntaggedResponse::Search(SearchData {
                ids: vec![2, 5],
                modseq: Some("917162500".to_string())
            })
        );
        assert_eq!(untagged("* SEARCH"), UntaggedResponse::Search(SearchData::default()));
    }

    #[test]
    fn test_parse_sort_and_thread() {
        assert_eq!(untagged("* SORT 5 3 4 1 2"), UntaggedResponse::Sort(vec![5, 3, 4, 1, 2]));
        match untagged("* THREAD (2)(3 6 (4 23)(44 7 96))") {
            UntaggedResponse::Thread(threads) => assert_eq!(threads.len(), 2),
            other => panic!("expected thread, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_esearch() {
        match untagged(r#"* ESEARCH (TAG "A0004") UID MIN 2 MAX 1043 COUNT 5 ALL 2,10:15,1043"#) {
            UntaggedResponse::ESearch(data) => {
                assert!(data.uid);
                assert_eq!(data.min, Some(2));
                assert_eq!(data.max, Some(1043));
                assert_eq!(data.count, Some(5));
                assert_eq!(data.all.unwrap(), ["2", "10:15", "1043"]);
            }
            other => panic!("expected esearch, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_namespace() {
        match untagged(r#"* NAMESPACE (("" "/")) (("~" "/" "X-PARAM" ("FLAG1" "FLAG2"))) NIL"#) {
            UntaggedResponse::Namespace(ns) => {
                let personal = ns.personal.unwrap();
                assert_eq!(personal[0].prefix, "");
                assert_eq!(personal[0].delimiter.as_deref(), Some("/"));
                assert!(personal[0].extensions.is_none());

                let other = ns.other.unwrap();
                let ext = other[0].extensions.as_ref().unwrap();
                assert_eq!(ext.get("X-PARAM").unwrap(), &["FLAG1", "FLAG2"]);
                assert!(ns.shared.is_none());
            }
            other => panic!("expected namespace, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_quota() {
        match untagged(r#"* QUOTA "" (STORAGE 10 512 MESSAGE 3 100)"#) {
            UntaggedResponse::Quota(quota) => {
                assert_eq!(quota.root, "");
                assert_eq!(quota.resources["storage"], QuotaUsage { usage: 10, limit: 512 });
                assert_eq!(quota.resources["message"].limit, 100);
            }
            other => panic!("expected quota, got {other:?}"),
        }
        assert_eq!(
            untagged(r#"* QUOTAROOT INBOX """#),
            UntaggedResponse::QuotaRoot(QuotaRoot {
                mailbox: "INBOX".to_string(),
                roots: vec![String::new()]
            })
        );
    }

    #[test]
    fn test_parse_id() {
        match untagged(r#"* ID ("name" "Cyrus" "Version" "1.5" "os" NIL)"#) {
            UntaggedResponse::Id(Some(map)) => {
                assert_eq!(map["name"].as_deref(), Some("Cyrus"));
                assert_eq!(map["version"].as_deref(), Some("1.5"));
                assert_eq!(map["os"], None);
            }
            other => panic!("expected id, got {other:?}"),
        }
        assert_eq!(untagged("* ID NIL"), UntaggedResponse::Id(None));
    }

    #[test]
    fn test_parse_fetch() {
        match untagged(r"* 12 FETCH (FLAGS (\Seen) UID 4)") {
            UntaggedResponse::Fetch(data) => {
                assert_eq!(data.seq, 12);
                assert_eq!(data.attributes.uid(), Some(4));
            }
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_other() {
        assert_eq!(
            untagged("* VANISHED (EARLIER) 41,43:116"),
            UntaggedResponse::Other {
                name: "VANISHED".to_string(),
                text: "(EARLIER) 41,43:116".to_string()
            }
        );
    }
}
