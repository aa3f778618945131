//! FETCH response decoding.
//!
//! Envelopes, address groups, body structures and the attribute map of a
//! single `* n FETCH (...)` line.

use chrono::DateTime;
use mailwire_mime::Headers;
use mailwire_mime::encoding::decode_words;

use crate::parser::Value;

use super::helpers::{nstring, params, texts};
use super::types::{
    Address, AddressEntry, BodyExtension, BodyStructure, Disposition, Envelope, FetchAttributes,
    FetchData, FetchValue, InlineBody, SinglePart,
};

/// INTERNALDATE layout (`17-Jul-1996 02:44:25 -0700`).
const INTERNALDATE_FORMAT: &str = "%d-%b-%Y %H:%M:%S %z";

/// Decodes the parenthesized payload of a FETCH response.
///
/// `values` is the decoded text after `FETCH`. Items are taken in
/// `name value` pairs; inline `BODY[...]` values go to `bodies`.
pub fn decode_fetch(seq: u32, values: &[Value]) -> FetchData {
    let items = match values.first() {
        Some(Value::List(items)) => items.as_slice(),
        _ => values,
    };

    let mut attributes = FetchAttributes::new();
    let mut bodies = Vec::new();

    for pair in items.chunks(2) {
        let Some(name) = pair[0].to_text() else {
            continue;
        };
        let value = pair.get(1).cloned().unwrap_or(Value::Nil);

        if let Some((section, origin)) = body_key(&name) {
            let data = value.to_bytes().unwrap_or_default();
            bodies.push(InlineBody { section, origin, data });
            continue;
        }

        let key = name.to_ascii_lowercase();
        let decoded = decode_item(&key, value);
        attributes.insert(key, decoded);
    }

    FetchData {
        seq,
        attributes,
        bodies,
    }
}

/// Matches `BODY[section]<origin>` or `BINARY[section]<origin>` (origin
/// optional), case-insensitively.
pub fn body_key(name: &str) -> Option<(String, Option<u64>)> {
    let rest = strip_prefix_ignore_case(name, "BODY[")
        .or_else(|| strip_prefix_ignore_case(name, "BINARY["))?;
    let close = rest.rfind(']')?;
    let section = rest[..close].to_string();
    let tail = &rest[close + 1..];
    if tail.is_empty() {
        return Some((section, None));
    }
    let origin = tail.strip_prefix('<')?.strip_suffix('>')?.parse().ok()?;
    Some((section, Some(origin)))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn decode_item(key: &str, value: Value) -> FetchValue {
    match (key, value) {
        ("flags", Value::List(items)) => FetchValue::Flags(texts(&items)),
        ("envelope", Value::List(items)) => FetchValue::Envelope(Box::new(decode_envelope(&items))),
        ("body" | "bodystructure", Value::List(items)) => {
            FetchValue::BodyStructure(decode_body_structure(&items, ""))
        }
        ("modseq", Value::List(items)) => match items.first().and_then(Value::to_text) {
            Some(modseq) => FetchValue::ModSeq(modseq),
            None => FetchValue::Value(Value::List(items)),
        },
        ("rfc822.header", Value::Text(block)) => FetchValue::Headers(Headers::parse(&block)),
        ("rfc822.header", Value::Bytes(block)) => FetchValue::Headers(Headers::parse_bytes(&block)),
        ("internaldate", value) => {
            let parsed = value
                .as_str()
                .and_then(|s| DateTime::parse_from_str(s.trim_start(), INTERNALDATE_FORMAT).ok());
            parsed.map_or(FetchValue::Value(value), FetchValue::InternalDate)
        }
        (_, value) => FetchValue::Value(value),
    }
}

/// Decodes the ten-field envelope tuple.
pub fn decode_envelope(items: &[Value]) -> Envelope {
    Envelope {
        date: nstring(items.first()),
        subject: nstring(items.get(1)).map(|s| decode_words(&s)),
        from: decode_addresses(items.get(2)),
        sender: decode_addresses(items.get(3)),
        reply_to: decode_addresses(items.get(4)),
        to: decode_addresses(items.get(5)),
        cc: decode_addresses(items.get(6)),
        bcc: decode_addresses(items.get(7)),
        in_reply_to: nstring(items.get(8)),
        message_id: nstring(items.get(9)),
    }
}

/// Decodes an envelope address list.
///
/// A tuple with a NIL mailbox closes the open group. A tuple with a NIL
/// host and a non-NIL mailbox opens a group named by the mailbox.
pub fn decode_addresses(value: Option<&Value>) -> Option<Vec<AddressEntry>> {
    let tuples = value?.as_list()?;
    let mut out = Vec::new();
    let mut group: Option<(String, Vec<Address>)> = None;

    for tuple in tuples {
        let Some(fields) = tuple.as_list() else {
            continue;
        };
        let mailbox = nstring(fields.get(2));
        let host = nstring(fields.get(3));

        match (mailbox, host) {
            (None, _) => {
                if let Some((name, members)) = group.take() {
                    out.push(AddressEntry::Group { name, members });
                }
            }
            (Some(name), None) => {
                if let Some((name, members)) = group.take() {
                    out.push(AddressEntry::Group { name, members });
                }
                group = Some((name, Vec::new()));
            }
            (Some(mailbox), Some(host)) => {
                let address = Address {
                    name: nstring(fields.first()).map(|s| decode_words(&s)),
                    mailbox: Some(mailbox),
                    host: Some(host),
                };
                match group.as_mut() {
                    Some((_, members)) => members.push(address),
                    None => out.push(AddressEntry::Mailbox(address)),
                }
            }
        }
    }

    if let Some((name, members)) = group {
        out.push(AddressEntry::Group { name, members });
    }
    Some(out)
}

fn child_id(prefix: &str, index: usize) -> String {
    if prefix.is_empty() {
        index.to_string()
    } else {
        format!("{prefix}.{index}")
    }
}

/// Decodes a BODY or BODYSTRUCTURE tuple. `prefix` is the part id of the
/// node, empty at the top level.
pub fn decode_body_structure(items: &[Value], prefix: &str) -> BodyStructure {
    if matches!(items.first(), Some(Value::List(_))) {
        decode_multipart(items, prefix)
    } else {
        decode_single(items, prefix)
    }
}

fn decode_multipart(items: &[Value], prefix: &str) -> BodyStructure {
    let mut children = Vec::new();
    let mut next = 0;
    while let Some(Value::List(child)) = items.get(next) {
        next += 1;
        children.push(decode_body_structure(child, &child_id(prefix, next)));
    }

    let subtype = nstring(items.get(next)).unwrap_or_default().to_ascii_lowercase();
    next += 1;
    let params = params(items.get(next));
    next += 1;

    BodyStructure::Multipart {
        subtype,
        params,
        children,
        extension: decode_extension(items.get(next..).unwrap_or_default()),
    }
}

fn decode_single(items: &[Value], prefix: &str) -> BodyStructure {
    // Some servers omit the subtype; shift so the remaining fields line up.
    let owned;
    let items = if matches!(items.get(1), Some(Value::List(_))) {
        let mut fixed = items.to_vec();
        fixed.insert(1, Value::Nil);
        owned = fixed;
        owned.as_slice()
    } else {
        items
    };

    let media_type = nstring(items.first()).unwrap_or_default().to_ascii_lowercase();
    let subtype = nstring(items.get(1)).map(|s| s.to_ascii_lowercase());
    let part_id = if prefix.is_empty() { "1".to_string() } else { prefix.to_string() };

    let mut part = SinglePart {
        part_id,
        params: params(items.get(2)),
        id: nstring(items.get(3)),
        description: nstring(items.get(4)),
        encoding: nstring(items.get(5)),
        size: items.get(6).and_then(Value::to_number),
        ..SinglePart::default()
    };

    let mut next = 7;
    if media_type == "message" && subtype.as_deref() == Some("rfc822") {
        part.envelope = items
            .get(7)
            .and_then(Value::as_list)
            .map(|e| Box::new(decode_envelope(e)));
        // A multipart body numbers its children under this part; a single
        // body is this part's first child.
        part.body = items.get(8).and_then(Value::as_list).map(|b| {
            let inner = if matches!(b.first(), Some(Value::List(_))) {
                part.part_id.clone()
            } else {
                child_id(&part.part_id, 1)
            };
            Box::new(decode_body_structure(b, &inner))
        });
        part.lines = items.get(9).and_then(Value::to_number);
        next = 10;
    } else if media_type == "text" {
        part.lines = items.get(7).and_then(Value::to_number);
        next = 8;
    }

    if let Some(md5) = items.get(next) {
        part.md5 = md5.to_text();
        next += 1;
    }

    part.extension = decode_extension(items.get(next..).unwrap_or_default());
    part.media_type = media_type;
    part.subtype = subtype;
    BodyStructure::Single(Box::new(part))
}

/// Decodes disposition, language, location and any further extension data.
fn decode_extension(items: &[Value]) -> BodyExtension {
    let disposition = items.first().and_then(Value::as_list).and_then(|d| {
        Some(Disposition {
            kind: d.first()?.to_text()?.to_ascii_lowercase(),
            params: params(d.get(1)),
        })
    });

    let language = match items.get(1) {
        Some(Value::List(langs)) => Some(texts(langs)),
        Some(other) => other.to_text().map(|lang| vec![lang]),
        None => None,
    };

    let extensions = match items.get(3..) {
        Some(rest) if !rest.is_empty() => Some(Value::List(rest.to_vec())),
        _ => None,
    };

    BodyExtension {
        disposition,
        language,
        location: nstring(items.get(2)),
        extensions,
    }
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
    use crate::parser::expression::{BracketMode, decode_str};

    fn fetch(payload: &str) -> FetchData {
        decode_fetch(1, &decode_str(payload, BracketMode::Atom))
    }

    fn structure(payload: &str) -> BodyStructure {
        let values = decode_str(payload, BracketMode::Atom);
        decode_body_structure(values[0].as_list().unwrap(), "")
    }

    #[test]
    fn test_flags_and_size() {
        let data = fetch(r"(FLAGS (\Seen) RFC822.SIZE 44827)");
        assert_eq!(data.attributes.flags(), Some(&["\\Seen".to_string()][..]));
        assert_eq!(
            data.attributes.get("rfc822.size"),
            Some(&FetchValue::Value(Value::Number(44827)))
        );
        assert!(data.bodies.is_empty());
    }

    #[test]
    fn test_rfc822_header_block() {
        let block = "Subject: =?utf-8?Q?Gr=C3=BC?=\r\n =?utf-8?Q?=C3=9Fe?=\r\nTo: a@example.com\r\n\r\n";
        let value = decode_item("rfc822.header", Value::text(block));
        let FetchValue::Headers(headers) = &value else {
            panic!("expected headers, got {value:?}");
        };
        assert_eq!(headers.get("subject"), Some("Grüße"));
        assert_eq!(headers.get("to"), Some("a@example.com"));
    }

    #[test]
    fn test_eight_bit_literals_kept_verbatim() {
        fn latin1(raw: &'static [u8]) -> Value {
            Value::literal(bytes::Bytes::from_static(raw))
        }

        let values = vec![Value::List(vec![
            Value::text("RFC822.TEXT"),
            latin1(b"caf\xe9"),
            Value::text("RFC822.HEADER"),
            latin1(b"Subject: caf\xe9\r\n\r\n"),
            Value::text("BODY[1]"),
            latin1(b"\xff\x00"),
        ])];
        let data = decode_fetch(1, &values);
        assert_eq!(data.attributes.raw("rfc822.text"), Some(&[99u8, 97, 102, 233][..]));
        assert_eq!(data.attributes.headers().unwrap().get("subject"), Some("caf\u{e9}"));
        assert_eq!(&data.bodies[0].data[..], b"\xff\x00");
    }

    #[test]
    fn test_uid_modseq_and_extension_keys() {
        let data = fetch("(UID 4827313 MODSEQ (12121231000) X-GM-THRID 1278455344230334865)");
        assert_eq!(data.attributes.uid(), Some(4827313));
        assert_eq!(data.attributes.modseq(), Some("12121231000"));
        assert!(matches!(
            data.attributes.get("x-gm-thrid"),
            Some(FetchValue::Value(Value::Text(id))) if id == "1278455344230334865"
        ));
    }

    #[test]
    fn test_internaldate() {
        let data = fetch(r#"(INTERNALDATE " 7-Feb-1994 21:52:25 -0800")"#);
        let date = data.attributes.internal_date().unwrap();
        assert_eq!(date.to_rfc3339(), "1994-02-07T21:52:25-08:00");

        let data = fetch(r#"(INTERNALDATE "garbage")"#);
        assert_eq!(
            data.attributes.get("internaldate"),
            Some(&FetchValue::Value(Value::text("garbage")))
        );
    }

    #[test]
    fn test_inline_bodies() {
        let data = fetch(r#"(UID 9 BODY[HEADER.FIELDS (SUBJECT)]<0> "Subject: hi" BODY[TEXT] NIL)"#);
        assert_eq!(data.attributes.uid(), Some(9));
        assert_eq!(data.bodies.len(), 2);
        assert_eq!(data.bodies[0].section, "HEADER.FIELDS (SUBJECT)");
        assert_eq!(data.bodies[0].origin, Some(0));
        assert_eq!(data.bodies[0].data, "Subject: hi");
        assert_eq!(data.bodies[1].section, "TEXT");
        assert!(data.bodies[1].data.is_empty());
    }

    #[test]
    fn test_body_key() {
        assert_eq!(body_key("BODY[]"), Some((String::new(), None)));
        assert_eq!(body_key("body[1.2]<100>"), Some(("1.2".to_string(), Some(100))));
        assert_eq!(body_key("BINARY[2]"), Some(("2".to_string(), None)));
        assert_eq!(body_key("BODYSTRUCTURE"), None);
        assert_eq!(body_key("BODY[1]<x>"), None);
    }

    #[test]
    fn test_envelope() {
        let data = fetch(concat!(
            r#"(ENVELOPE ("Mon, 7 Feb 1994 21:52:25 -0800" "=?UTF-8?Q?Gr=C3=BC=C3=9Fe?= again" "#,
            r#"(("Terry Gray" NIL "gray" "cac.washington.edu")) "#,
            r#"(("Terry Gray" NIL "gray" "cac.washington.edu")) "#,
            r#"(("Terry Gray" NIL "gray" "cac.washington.edu")) "#,
            r#"((NIL NIL "imap" "cac.washington.edu")) "#,
            r#"((NIL NIL "minutes" "CNRI.Reston.VA.US")("John Klensin" NIL "KLENSIN" "MIT.EDU")) "#,
            r#"NIL NIL "<B27397-0100000@cac.washington.edu>"))"#
        ));
        let envelope = data.attributes.envelope().unwrap();
        assert_eq!(envelope.subject.as_deref(), Some("Grüße again"));
        assert!(envelope.parsed_date().is_some());
        assert_eq!(envelope.bcc, None);
        assert_eq!(envelope.in_reply_to, None);
        assert_eq!(envelope.message_id.as_deref(), Some("<B27397-0100000@cac.washington.edu>"));

        let cc = envelope.cc.as_ref().unwrap();
        assert_eq!(cc.len(), 2);
        match &cc[1] {
            AddressEntry::Mailbox(addr) => {
                assert_eq!(addr.name.as_deref(), Some("John Klensin"));
                assert_eq!(addr.email().as_deref(), Some("KLENSIN@MIT.EDU"));
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_address_groups() {
        let values = decode_str(
            concat!(
                r#"(("Solo" NIL "solo" "example.com")"#,
                r#"(NIL NIL "undisclosed-recipients" NIL)"#,
                r#"("A" NIL "a" "example.com")(NIL NIL "b" "example.com")"#,
                r#"(NIL NIL NIL NIL)"#,
                r#"(NIL NIL "open" NIL)("C" NIL "c" "example.com"))"#
            ),
            BracketMode::Atom,
        );
        let entries = decode_addresses(values.first()).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(matches!(&entries[0], AddressEntry::Mailbox(a) if a.mailbox.as_deref() == Some("solo")));
        match &entries[1] {
            AddressEntry::Group { name, members } => {
                assert_eq!(name, "undisclosed-recipients");
                assert_eq!(members.len(), 2);
                assert_eq!(members[1].name, None);
            }
            other => panic!("unexpected entry {other:?}"),
        }
        match &entries[2] {
            AddressEntry::Group { name, members } => {
                assert_eq!(name, "open");
                assert_eq!(members[0].email().as_deref(), Some("c@example.com"));
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_single_part_defaults_to_part_one() {
        let body = structure(r#"("TEXT" "PLAIN" ("CHARSET" "US-ASCII") NIL NIL "7BIT" 3028 92)"#);
        let BodyStructure::Single(part) = body else {
            panic!("expected single part");
        };
        assert_eq!(part.part_id, "1");
        assert_eq!(part.media_type, "text");
        assert_eq!(part.subtype.as_deref(), Some("plain"));
        assert_eq!(part.size, Some(3028));
        assert_eq!(part.lines, Some(92));
        assert_eq!(part.md5, None);
        assert_eq!(part.extension, BodyExtension::default());
    }

    #[test]
    fn test_multipart_with_inline_attachment() {
        let body = structure(concat!(
            r#"(("TEXT" "PLAIN" ("CHARSET" "UTF-8") NIL NIL "7BIT" 20 1 NIL NIL NIL)"#,
            r#"("APPLICATION" "PDF" ("NAME" "filename.pdf") NIL NIL "BASE64" 4554 NIL "#,
            r#"("INLINE" ("FILENAME" "filename.pdf")) NIL NIL) "#,
            r#""MIXED" ("BOUNDARY" "----=_Part_1") NIL NIL NIL)"#
        ));
        let BodyStructure::Multipart {
            subtype,
            params,
            children,
            extension,
        } = &body
        else {
            panic!("expected multipart");
        };
        assert_eq!(subtype, "mixed");
        assert_eq!(
            params.as_ref().unwrap().get("boundary"),
            Some(&Some("----=_Part_1".to_string()))
        );
        assert_eq!(children.len(), 2);
        assert_eq!(extension.disposition, None);

        let pdf = body.find("2").unwrap();
        assert_eq!(pdf.media_type, "application");
        assert_eq!(pdf.lines, None);
        let disposition = pdf.extension.disposition.as_ref().unwrap();
        assert_eq!(disposition.kind, "inline");
        assert_eq!(
            disposition.params.as_ref().unwrap().get("filename"),
            Some(&Some("filename.pdf".to_string()))
        );
    }

    #[test]
    fn test_nested_part_ids_and_language() {
        let body = structure(concat!(
            r#"((("TEXT" "PLAIN" NIL NIL NIL "7BIT" 1 1)("TEXT" "HTML" NIL NIL NIL "7BIT" 1 1) "ALTERNATIVE")"#,
            r#"("IMAGE" "PNG" NIL NIL NIL "BASE64" 10 NIL NIL "EN" "http://x" "X1" "X2") "MIXED")"#
        ));
        assert_eq!(body.find("1.2").unwrap().subtype.as_deref(), Some("html"));
        let png = body.find("2").unwrap();
        assert_eq!(png.extension.language, Some(vec!["EN".to_string()]));
        assert_eq!(png.extension.location.as_deref(), Some("http://x"));
        assert_eq!(
            png.extension.extensions,
            Some(Value::List(vec![Value::text("X1"), Value::text("X2")]))
        );
    }

    #[test]
    fn test_message_rfc822_part() {
        let body = structure(concat!(
            r#"(("TEXT" "PLAIN" NIL NIL NIL "7BIT" 5 1)"#,
            r#"("MESSAGE" "RFC822" NIL NIL NIL "7BIT" 300 "#,
            r#"(NIL "inner" NIL NIL NIL NIL NIL NIL NIL NIL) "#,
            r#"(("TEXT" "PLAIN" NIL NIL NIL "7BIT" 5 1)("TEXT" "HTML" NIL NIL NIL "7BIT" 5 1) "ALTERNATIVE") 12) "#,
            r#""MIXED")"#
        ));
        let message = body.find("2").unwrap();
        assert_eq!(message.lines, Some(12));
        assert_eq!(message.envelope.as_ref().unwrap().subject.as_deref(), Some("inner"));
        assert_eq!(body.find("2.2").unwrap().subtype.as_deref(), Some("html"));
    }

    #[test]
    fn test_message_rfc822_single_part_body() {
        let body = structure(concat!(
            r#"(("TEXT" "PLAIN" NIL NIL NIL "7BIT" 5 1)"#,
            r#"("MESSAGE" "RFC822" NIL NIL NIL "7BIT" 300 "#,
            r#"(NIL "inner" NIL NIL NIL NIL NIL NIL NIL NIL) "#,
            r#"("TEXT" "PLAIN" NIL NIL NIL "7BIT" 5 1) 12) "#,
            r#""MIXED")"#
        ));
        let message = body.find("2").unwrap();
        assert_eq!(message.subtype.as_deref(), Some("rfc822"));
        let BodyStructure::Single(inner) = message.body.as_deref().unwrap() else {
            panic!("expected a single inner body");
        };
        assert_eq!(inner.part_id, "2.1");
        assert_eq!(body.find("2.1").unwrap().media_type, "text");
    }

    #[test]
    fn test_missing_subtype_is_tolerated() {
        let body = structure(r#"("APPLICATION" ("NAME" "x") NIL NIL "BASE64" 10)"#);
        let BodyStructure::Single(part) = body else {
            panic!("expected single part");
        };
        assert_eq!(part.subtype, None);
        assert_eq!(part.params.unwrap().get("name"), Some(&Some("x".to_string())));
        assert_eq!(part.encoding.as_deref(), Some("BASE64"));
        assert_eq!(part.size, Some(10));
    }
}
