//! Integration tests for the session engine and its driver.
//!
//! The engine tests feed scripted server bytes through the public API and
//! check what the client sends back; the driver tests run the same flows
//! over a mock transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio_test::io::Builder;

use mailwire_imap::body::BodySink;
use mailwire_imap::handler::Event;
use mailwire_imap::parser::{BodyStart, BodyStructure, FetchAttributes};
use mailwire_imap::session::{FetchObserver, IdleState};
use mailwire_imap::time::MockClock;
use mailwire_imap::types::SpecialUse;
use mailwire_imap::{
    CollectingHandler, CommandData, CommandRequest, Config, Connection, Engine, Error,
    SessionState,
};

fn engine(config: Config) -> (Engine<CollectingHandler>, Arc<MockClock>) {
    let clock = MockClock::shared();
    let mut engine = Engine::with_clock(config, CollectingHandler::new(), clock.clone());
    engine.connection_opened();
    (engine, clock)
}

fn feed(engine: &mut Engine<CollectingHandler>, data: &[u8]) {
    engine.handle_input(data).unwrap();
}

/// Feeds one byte at a time, the worst case for a streaming parser.
fn trickle(engine: &mut Engine<CollectingHandler>, data: &[u8]) {
    for byte in data {
        engine.handle_input(std::slice::from_ref(byte)).unwrap();
    }
}

fn sent(engine: &mut Engine<CollectingHandler>) -> String {
    let mut out = String::new();
    while let Some(transmit) = engine.poll_transmit() {
        out.push_str(transmit.as_str().unwrap());
    }
    out
}

fn authenticated(config: Config, caps: &str) -> (Engine<CollectingHandler>, Arc<MockClock>) {
    let (mut engine, clock) = engine(config);
    feed(&mut engine, format!("* OK [CAPABILITY {caps}] ready\r\n").as_bytes());
    let _login = engine.enqueue(CommandRequest::new("LOGIN user secret"));
    assert_eq!(sent(&mut engine), "A0000 LOGIN user secret\r\n");
    feed(&mut engine, format!("A0000 OK [CAPABILITY {caps}] welcome\r\n").as_bytes());
    (engine, clock)
}

#[derive(Clone, Default)]
struct Recorded {
    bodies: Arc<Mutex<Vec<(u32, String, Vec<u8>)>>>,
    messages: Arc<Mutex<Vec<(u32, FetchAttributes)>>>,
}

struct VecSink {
    seq: u32,
    section: String,
    data: Vec<u8>,
    bodies: Arc<Mutex<Vec<(u32, String, Vec<u8>)>>>,
}

impl BodySink for VecSink {
    fn push(&mut self, chunk: Bytes) -> bool {
        self.data.extend_from_slice(&chunk);
        true
    }

    fn end(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.bodies
            .lock()
            .unwrap()
            .push((self.seq, self.section.clone(), data));
    }
}

impl FetchObserver for Recorded {
    fn body(&mut self, seq: u32, start: &BodyStart) -> Box<dyn BodySink> {
        Box::new(VecSink {
            seq,
            section: start.section.clone(),
            data: Vec::new(),
            bodies: self.bodies.clone(),
        })
    }

    fn message(&mut self, seq: u32, attributes: FetchAttributes) {
        self.messages.lock().unwrap().push((seq, attributes));
    }
}

#[test]
fn test_select_then_fetch_inline_pdf() {
    let quiet = Config::builder().no_keepalive().build();
    let (mut engine, _) = authenticated(quiet, "IMAP4rev1 UIDPLUS");

    let mut select = engine.enqueue(CommandRequest::new("SELECT INBOX"));
    assert_eq!(sent(&mut engine), "A0001 SELECT INBOX\r\n");
    trickle(
        &mut engine,
        concat!(
            "* 3 EXISTS\r\n",
            "* 0 RECENT\r\n",
            "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n",
            "* OK [PERMANENTFLAGS (\\Seen \\Deleted \\*)] ok\r\n",
            "* OK [UIDVALIDITY 1700000000] ok\r\n",
            "* OK [UIDNEXT 78] ok\r\n",
            "A0001 OK [READ-WRITE] SELECT completed\r\n",
        )
        .as_bytes(),
    );
    assert!(select.completion.try_recv().unwrap().is_ok());
    assert_eq!(engine.state(), SessionState::Authenticated);
    let mailbox = engine.mailbox().unwrap();
    assert_eq!(mailbox.name, "INBOX");
    assert_eq!(mailbox.total, 3);
    assert_eq!(mailbox.uid_validity, Some(1_700_000_000));
    assert_eq!(mailbox.uid_next, Some(78));
    assert!(mailbox.allows_new_keywords);
    assert!(!mailbox.read_only);
    // Selecting is not new mail.
    assert!(engine.handler().events.is_empty());

    let recorded = Recorded::default();
    let mut fetch = engine.enqueue(
        CommandRequest::new("UID FETCH 77 (UID BODYSTRUCTURE BODY.PEEK[2])")
            .with_observer(recorded.clone()),
    );
    assert_eq!(
        sent(&mut engine),
        "A0002 UID FETCH 77 (UID BODYSTRUCTURE BODY.PEEK[2])\r\n"
    );
    trickle(
        &mut engine,
        concat!(
            "* 3 FETCH (UID 77 BODYSTRUCTURE ((\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\") ",
            "NIL NIL \"7BIT\" 5 1 NIL NIL NIL NIL)(\"APPLICATION\" \"PDF\" ",
            "(\"NAME\" \"report.pdf\") NIL NIL \"BASE64\" 8 NIL ",
            "(\"INLINE\" (\"FILENAME\" \"report.pdf\")) NIL NIL) \"MIXED\" ",
            "(\"BOUNDARY\" \"xyz\") NIL NIL NIL) BODY[2] {8}\r\nJVBERi0x)\r\n",
            "A0002 OK UID FETCH completed\r\n",
        )
        .as_bytes(),
    );

    let completion = fetch.completion.try_recv().unwrap().unwrap();
    assert_eq!(completion.data, CommandData::Fetch { messages: 1 });

    let bodies = recorded.bodies.lock().unwrap();
    assert_eq!(*bodies, [(3, "2".to_string(), b"JVBERi0x".to_vec())]);

    let messages = recorded.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    let (seq, attributes) = &messages[0];
    assert_eq!(*seq, 3);
    assert_eq!(attributes.uid(), Some(77));
    let structure = attributes.body_structure().unwrap();
    assert!(matches!(structure, BodyStructure::Multipart { subtype, .. } if subtype == "mixed"));
    let pdf = structure.find("2").unwrap();
    assert_eq!(pdf.subtype.as_deref(), Some("pdf"));
    assert_eq!(pdf.encoding.as_deref(), Some("BASE64"));
    let disposition = pdf.extension.disposition.as_ref().unwrap();
    assert_eq!(disposition.kind, "inline");
    assert_eq!(
        disposition.params.as_ref().unwrap().get("filename"),
        Some(&Some("report.pdf".to_string()))
    );
    // The streamed body is not repeated in the attributes.
    assert!(!attributes.contains("BODY[2]"));
}

#[test]
fn test_fetch_messages_complete_in_any_order() {
    let quiet = Config::builder().no_keepalive().build();
    let (mut engine, _) = authenticated(quiet, "IMAP4rev1");
    let _select = engine.enqueue(CommandRequest::new("SELECT INBOX"));
    sent(&mut engine);
    feed(&mut engine, b"* 2 EXISTS\r\nA0001 OK done\r\n");

    let recorded = Recorded::default();
    let mut fetch =
        engine.enqueue(CommandRequest::new("FETCH 1:2 (FLAGS UID)").with_observer(recorded.clone()));
    sent(&mut engine);

    // Split attributes: each message completes when its last item arrives.
    feed(
        &mut engine,
        b"* 2 FETCH (FLAGS (\\Seen))\r\n* 1 FETCH (FLAGS () UID 10)\r\n",
    );
    assert_eq!(recorded.messages.lock().unwrap().len(), 1);
    feed(&mut engine, b"* 2 FETCH (UID 11)\r\nA0002 OK done\r\n");

    let messages = recorded.messages.lock().unwrap();
    let seqs: Vec<u32> = messages.iter().map(|(seq, _)| *seq).collect();
    assert_eq!(seqs, [1, 2]);
    assert_eq!(messages[1].1.uid(), Some(11));
    assert_eq!(messages[1].1.flags(), Some(&["\\Seen".to_string()][..]));
    assert_eq!(
        fetch.completion.try_recv().unwrap().unwrap().data,
        CommandData::Fetch { messages: 2 }
    );
}

#[test]
fn test_idle_reports_mailbox_changes() {
    let (mut engine, _) = authenticated(Config::new(), "IMAP4rev1 IDLE");
    // Nothing queued after LOGIN: the engine goes idle.
    assert_eq!(sent(&mut engine), "IDLE IDLE\r\n");
    feed(&mut engine, b"+ idling\r\n");
    let _select = engine.enqueue(CommandRequest::new("SELECT INBOX"));
    assert_eq!(sent(&mut engine), "DONE\r\n");
    feed(&mut engine, b"IDLE OK done\r\n");
    assert_eq!(sent(&mut engine), "A0001 SELECT INBOX\r\n");
    feed(&mut engine, b"* 5 EXISTS\r\n* OK [UIDVALIDITY 9] ok\r\nA0001 OK done\r\n");

    assert_eq!(sent(&mut engine), "IDLE IDLE\r\n");
    feed(&mut engine, b"+ idling\r\n");
    assert_eq!(engine.idle_state(), IdleState::Active);
    feed(
        &mut engine,
        b"* 7 EXISTS\r\n* 3 EXPUNGE\r\n* 2 FETCH (FLAGS (\\Seen))\r\n",
    );

    assert_eq!(engine.mailbox().unwrap().total, 6);
    let events = engine.handler_mut().take();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0], Event::IdleStarted);
    assert_eq!(events[1], Event::IdleStarted);
    assert_eq!(events[2], Event::Mail(2));
    assert_eq!(events[3], Event::Expunge(3));
    assert!(matches!(&events[4], Event::Update(2, attributes) if attributes.flags().is_some()));
}

#[test]
fn test_idle_refreshed_before_server_timeout() {
    let config = Config::builder()
        .keepalive_interval(Duration::from_secs(60))
        .idle_interval(Duration::from_secs(600))
        .build();
    let (mut engine, clock) = authenticated(config, "IMAP4rev1 IDLE");
    assert_eq!(sent(&mut engine), "IDLE IDLE\r\n");
    feed(&mut engine, b"+ idling\r\n");

    for _ in 0..9 {
        clock.advance(Duration::from_secs(60));
        engine.handle_timeout();
    }
    assert_eq!(sent(&mut engine), "");

    clock.advance(Duration::from_secs(60));
    engine.handle_timeout();
    assert_eq!(sent(&mut engine), "DONE\r\n");
    feed(&mut engine, b"IDLE OK done\r\n");
    assert_eq!(sent(&mut engine), "IDLE IDLE\r\n");
}

#[test]
fn test_list_and_status() {
    let quiet = Config::builder().no_keepalive().build();
    let (mut engine, _) = authenticated(quiet, "IMAP4rev1 SPECIAL-USE");

    let mut list = engine.enqueue(CommandRequest::new("LIST \"\" \"*\""));
    let mut status = engine.enqueue(CommandRequest::new("STATUS Archive (MESSAGES UNSEEN)"));
    assert_eq!(sent(&mut engine), "A0001 LIST \"\" \"*\"\r\n");
    feed(
        &mut engine,
        concat!(
            "* LIST (\\HasChildren) \"/\" INBOX\r\n",
            "* LIST (\\HasNoChildren) \"/\" INBOX/Receipts\r\n",
            "* LIST (\\HasNoChildren \\Sent) \"/\" {10}\r\nSent Items\r\n",
            "A0001 OK LIST completed\r\n",
        )
        .as_bytes(),
    );

    let CommandData::List(tree) = list.completion.try_recv().unwrap().unwrap().data else {
        panic!("expected a mailbox tree");
    };
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.get(&["INBOX", "Receipts"]).unwrap().name, "INBOX/Receipts");
    assert_eq!(
        tree.get(&["Sent Items"]).unwrap().special_use,
        Some(SpecialUse::Sent)
    );

    assert_eq!(sent(&mut engine), "A0002 STATUS Archive (MESSAGES UNSEEN)\r\n");
    feed(
        &mut engine,
        b"* STATUS Archive (MESSAGES 120 UNSEEN 4)\r\nA0002 OK STATUS completed\r\n",
    );
    let CommandData::Status(boxes) = status.completion.try_recv().unwrap().unwrap().data else {
        panic!("expected status data");
    };
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].name, "Archive");
    assert_eq!(boxes[0].total, 120);
    assert_eq!(boxes[0].unseen, Some(4));
}

#[test]
fn test_append_with_synchronizing_literal() {
    let quiet = Config::builder().no_keepalive().build();
    let (mut engine, _) = authenticated(quiet, "IMAP4rev1");
    let message = "Subject: hi\r\n\r\nhello\r\n";

    let mut append = engine.enqueue(
        CommandRequest::new(format!("APPEND Drafts (\\Draft) {{{}}}", message.len()))
            .with_payload(message.as_bytes().to_vec()),
    );
    assert_eq!(sent(&mut engine), "A0001 APPEND Drafts (\\Draft) {22}\r\n");
    feed(&mut engine, b"+ Ready for literal data\r\n");
    assert_eq!(sent(&mut engine), format!("{message}\r\n"));
    feed(&mut engine, b"A0001 OK [APPENDUID 38505 3955] APPEND completed\r\n");
    assert!(append.completion.try_recv().unwrap().is_ok());
}

#[test]
fn test_failed_commands_do_not_break_the_pipeline() {
    let quiet = Config::builder().no_keepalive().build();
    let (mut engine, _) = authenticated(quiet, "IMAP4rev1");

    let mut bad = engine.enqueue(CommandRequest::new("FROB"));
    let mut search = engine.enqueue(CommandRequest::new("SEARCH UNSEEN"));
    assert_eq!(sent(&mut engine), "A0001 FROB\r\n");
    feed(&mut engine, b"A0001 BAD [CLIENTBUG] unknown command\r\n");
    assert!(matches!(
        bad.completion.try_recv().unwrap(),
        Err(Error::Bad { .. })
    ));

    assert_eq!(sent(&mut engine), "A0002 SEARCH UNSEEN\r\n");
    feed(&mut engine, b"* SEARCH 2 5 8\r\nA0002 OK done\r\n");
    let CommandData::Search(data) = search.completion.try_recv().unwrap().unwrap().data else {
        panic!("expected search data");
    };
    assert_eq!(data.ids, [2, 5, 8]);
}

#[tokio::test]
async fn test_connection_select_and_logout() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
        .write(b"A0000 LOGIN user secret\r\n")
        .read(b"A0000 OK [CAPABILITY IMAP4rev1] welcome\r\n")
        .write(b"A0001 EXAMINE Archive\r\n")
        .read(b"* 12 EXISTS\r\n* OK [UIDVALIDITY 4] ok\r\n")
        .read(b"A0001 OK [READ-ONLY] done\r\n")
        .write(b"A0002 LOGOUT\r\n")
        .read(b"* BYE see you\r\nA0002 OK done\r\n")
        .build();
    let engine = Engine::new(Config::builder().no_keepalive().build(), CollectingHandler::new());
    let mut connection = Connection::new(mock, engine);

    connection
        .execute(CommandRequest::new("LOGIN user secret"))
        .await
        .unwrap();
    connection
        .execute(CommandRequest::new("EXAMINE Archive"))
        .await
        .unwrap();
    let mailbox = connection.engine().mailbox().unwrap();
    assert_eq!(mailbox.total, 12);
    assert!(mailbox.read_only);

    connection.execute(CommandRequest::new("LOGOUT")).await.unwrap();
    connection.run().await.unwrap();
    assert!(connection.is_closed());
    assert_eq!(connection.engine().state(), SessionState::Disconnected);

    let err = connection
        .execute(CommandRequest::new("NOOP"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
}
