//! Incremental response parser.
//!
//! Bytes arrive in arbitrary chunks. The parser assembles logical lines,
//! buffers `{N}` literals into a [`LiteralQueue`], and streams
//! `BODY[...] {N}` literals straight into a [`BodySink`] obtained from the
//! [`ResponseSink`] before the first byte of the literal arrives.

use bytes::{Bytes, BytesMut};

use crate::body::{BodySink, ReadySignal};
use crate::config::{Config, DEFAULT_MAX_LINE_LENGTH, DEFAULT_MAX_LITERAL_SIZE};
use crate::{Error, Result};

use super::expression::LITERAL_PLACEHOLDER;
use super::literal::LiteralQueue;
use super::response::{Response, body_key, decode_response};

/// Initial capacity cap for a buffered literal.
const LITERAL_PREALLOC: usize = 64 * 1024;

/// Announcement of a streamed body literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyStart {
    /// Sequence number from the `* n FETCH` prefix.
    pub seq: u32,
    /// Section text between the brackets.
    pub section: String,
    /// Partial origin, from `<n>`.
    pub origin: Option<u64>,
    /// Announced size in bytes.
    pub size: usize,
}

/// Receiver of parser output.
pub trait ResponseSink {
    /// Called for every complete response line.
    fn on_response(&mut self, response: Response);

    /// Called when a body literal is announced; the returned sink receives
    /// its bytes.
    fn on_body_start(&mut self, start: BodyStart) -> Box<dyn BodySink>;
}

/// Outcome of feeding the parser.
#[derive(Debug, Clone)]
pub enum Progress {
    /// All input was consumed; feed more when it arrives.
    Drained,
    /// A body sink refused more data. Wait for the signal, then call
    /// [`ResponseParser::resume`].
    Paused(ReadySignal),
}

enum State {
    Line,
    Literal { remaining: usize, data: BytesMut },
    Body { remaining: usize, sink: Box<dyn BodySink> },
}

/// A `{N}` found at the end of a line.
struct Announcement {
    start: usize,
    size: usize,
}

/// A `BODY[...] {N}` announcement inside an untagged FETCH line.
struct BodyAnnouncement {
    key_start: usize,
    seq: u32,
    section: String,
    origin: Option<u64>,
}

/// Streaming parser for server responses.
pub struct ResponseParser {
    buffer: BytesMut,
    line: Vec<u8>,
    literals: LiteralQueue,
    state: State,
    waiting: Option<ReadySignal>,
    max_literal_size: usize,
    max_line_length: usize,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResponseParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseParser")
            .field("buffered", &self.buffer.len())
            .field("line", &self.line.len())
            .field("literals", &self.literals.len())
            .field("paused", &self.waiting.is_some())
            .finish_non_exhaustive()
    }
}

impl ResponseParser {
    /// Creates a parser with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_LITERAL_SIZE, DEFAULT_MAX_LINE_LENGTH)
    }

    /// Creates a parser with explicit limits.
    #[must_use]
    pub fn with_limits(max_literal_size: usize, max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            line: Vec::new(),
            literals: LiteralQueue::new(),
            state: State::Line,
            waiting: None,
            max_literal_size,
            max_line_length,
        }
    }

    /// Creates a parser using the limits of `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::with_limits(config.max_literal_size, config.max_line_length)
    }

    /// Returns true while a body sink has asked the parser to wait.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.waiting.is_some()
    }

    /// Returns the readiness signal the parser is waiting on.
    #[must_use]
    pub fn ready_signal(&self) -> Option<ReadySignal> {
        self.waiting.clone()
    }

    /// Returns the number of received bytes not yet processed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds received bytes.
    ///
    /// Input is only buffered while paused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineTooLong`] or [`Error::LiteralTooLarge`] when a
    /// configured limit is exceeded. Both leave the stream unusable.
    pub fn feed(&mut self, data: &[u8], sink: &mut dyn ResponseSink) -> Result<Progress> {
        self.buffer.extend_from_slice(data);
        self.drain(sink)
    }

    /// Continues after the paused sink became ready.
    ///
    /// # Errors
    ///
    /// Same as [`ResponseParser::feed`].
    pub fn resume(&mut self, sink: &mut dyn ResponseSink) -> Result<Progress> {
        self.waiting = None;
        self.drain(sink)
    }

    fn drain(&mut self, sink: &mut dyn ResponseSink) -> Result<Progress> {
        loop {
            if let Some(signal) = &self.waiting {
                return Ok(Progress::Paused(signal.clone()));
            }
            if self.buffer.is_empty() {
                return Ok(Progress::Drained);
            }

            match &mut self.state {
                State::Line => {
                    let Some(end) = self.buffer.iter().position(|&b| b == b'\n') else {
                        if self.line.len() + self.buffer.len() > self.max_line_length {
                            return Err(Error::LineTooLong {
                                max: self.max_line_length,
                            });
                        }
                        return Ok(Progress::Drained);
                    };
                    let segment = self.buffer.split_to(end + 1);
                    let mut segment = &segment[..end];
                    if let Some(stripped) = segment.strip_suffix(b"\r") {
                        segment = stripped;
                    }
                    if self.line.len() + segment.len() > self.max_line_length {
                        return Err(Error::LineTooLong {
                            max: self.max_line_length,
                        });
                    }
                    self.line.extend_from_slice(segment);
                    self.end_of_segment(sink)?;
                }
                State::Literal { remaining, data } => {
                    let n = (*remaining).min(self.buffer.len());
                    data.extend_from_slice(&self.buffer.split_to(n));
                    *remaining -= n;
                    if *remaining == 0 {
                        let literal = std::mem::take(data).freeze();
                        self.literals.push(literal);
                        self.state = State::Line;
                    }
                }
                State::Body { remaining, sink: body } => {
                    let n = (*remaining).min(self.buffer.len());
                    let chunk = self.buffer.split_to(n).freeze();
                    *remaining -= n;
                    let full = !body.push(chunk);
                    if *remaining == 0 {
                        // An ended sink is never drained; do not wait on it.
                        body.end();
                        self.state = State::Line;
                    } else if full {
                        self.waiting = body.readiness();
                    }
                }
            }
        }
    }

    /// Handles the line assembled so far after a line terminator.
    fn end_of_segment(&mut self, sink: &mut dyn ResponseSink) -> Result<()> {
        if let Some(announcement) = literal_announcement(&self.line) {
            if let Some(body) = body_announcement(&self.line, announcement.start) {
                self.line.truncate(body.key_start);
                tracing::trace!(
                    seq = body.seq,
                    section = %body.section,
                    size = announcement.size,
                    "streaming body literal"
                );
                let mut target = sink.on_body_start(BodyStart {
                    seq: body.seq,
                    section: body.section,
                    origin: body.origin,
                    size: announcement.size,
                });
                if announcement.size == 0 {
                    target.end();
                } else {
                    self.state = State::Body {
                        remaining: announcement.size,
                        sink: target,
                    };
                }
                return Ok(());
            }

            if announcement.size > self.max_literal_size {
                return Err(Error::LiteralTooLarge {
                    size: announcement.size,
                    max: self.max_literal_size,
                });
            }
            self.line.truncate(announcement.start);
            let mut placeholder = [0u8; 4];
            self.line
                .extend_from_slice(LITERAL_PLACEHOLDER.encode_utf8(&mut placeholder).as_bytes());
            if announcement.size == 0 {
                self.literals.push(Bytes::new());
            } else {
                self.state = State::Literal {
                    remaining: announcement.size,
                    data: BytesMut::with_capacity(announcement.size.min(LITERAL_PREALLOC)),
                };
            }
            return Ok(());
        }

        let raw = std::mem::take(&mut self.line);
        let text = String::from_utf8_lossy(&raw);
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        tracing::trace!(line = %text, "received");
        let response = decode_response(text, &mut self.literals);
        let leftover = self.literals.clear();
        if leftover > 0 {
            tracing::warn!(leftover, "response line left literals unconsumed");
        }
        sink.on_response(response);
        Ok(())
    }
}

/// Finds a trailing `{N}`, `{N+}` or `~{N}`.
fn literal_announcement(line: &[u8]) -> Option<Announcement> {
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|&b| b == b'{')?;
    let digits = &inner[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let size = std::str::from_utf8(digits)
        .ok()?
        .parse::<u64>()
        .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
    let start = if open > 0 && inner[open - 1] == b'~' { open - 1 } else { open };
    Some(Announcement { start, size })
}

/// Recognizes `* n FETCH (... BODY[section]<origin> {N}`.
fn body_announcement(line: &[u8], start: usize) -> Option<BodyAnnouncement> {
    let text = std::str::from_utf8(&line[..start]).ok()?;
    let mut tokens = text.strip_prefix('*')?.split_whitespace();
    let seq = tokens.next()?.parse().ok()?;
    if !tokens.next()?.eq_ignore_ascii_case("FETCH") {
        return None;
    }

    let prefix = text.trim_end();
    let upper = prefix.to_ascii_uppercase();
    let key_start = upper.rfind("BODY[").into_iter().chain(upper.rfind("BINARY[")).max()?;
    if !matches!(prefix.as_bytes().get(key_start.checked_sub(1)?), Some(b' ' | b'(')) {
        return None;
    }
    let (section, origin) = body_key(&prefix[key_start..])?;
    Some(BodyAnnouncement {
        key_start,
        seq,
        section,
        origin,
    })
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
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;

    use super::*;
    use crate::parser::{FetchValue, UntaggedResponse, Value};
    use crate::types::Status;

    /// Body sink writing into shared memory, optionally refusing every push.
    struct MemorySink {
        data: Arc<Mutex<Vec<u8>>>,
        ended: Arc<Mutex<bool>>,
        refuse: bool,
        signal: ReadySignal,
    }

    impl BodySink for MemorySink {
        fn push(&mut self, chunk: Bytes) -> bool {
            self.data.lock().unwrap().extend_from_slice(&chunk);
            !self.refuse
        }

        fn end(&mut self) {
            *self.ended.lock().unwrap() = true;
        }

        fn readiness(&self) -> Option<ReadySignal> {
            Some(self.signal.clone())
        }
    }

    #[derive(Default)]
    struct Recorder {
        responses: Vec<Response>,
        starts: Vec<BodyStart>,
        body: Arc<Mutex<Vec<u8>>>,
        ended: Arc<Mutex<bool>>,
        refuse: bool,
    }

    impl ResponseSink for Recorder {
        fn on_response(&mut self, response: Response) {
            self.responses.push(response);
        }

        fn on_body_start(&mut self, start: BodyStart) -> Box<dyn BodySink> {
            self.starts.push(start);
            Box::new(MemorySink {
                data: Arc::clone(&self.body),
                ended: Arc::clone(&self.ended),
                refuse: self.refuse,
                signal: ReadySignal::new(),
            })
        }
    }

    const SESSION: &[u8] = b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n\
* LIST () \"/\" {12}\r\nhello\r\nworld\r\n\
* 1 FETCH (UID 7 BODY[TEXT] {12}\r\nline1\r\nline2 FLAGS (\\Seen))\r\n\
* 2 EXISTS\r\n\
A0001 OK done\r\n";

    fn feed_chunks(input: &[u8], sizes: &[usize]) -> Recorder {
        let mut parser = ResponseParser::new();
        let mut recorder = Recorder::default();
        let mut rest = input;
        for &size in sizes {
            if rest.is_empty() {
                break;
            }
            let n = size.min(rest.len());
            parser.feed(&rest[..n], &mut recorder).unwrap();
            rest = &rest[n..];
        }
        parser.feed(rest, &mut recorder).unwrap();
        recorder
    }

    #[test]
    fn test_session_in_one_chunk() {
        let recorder = feed_chunks(SESSION, &[]);
        assert_eq!(recorder.responses.len(), 5);

        match &recorder.responses[1] {
            Response::Untagged(UntaggedResponse::List(entry)) => {
                assert_eq!(entry.name, "hello\r\nworld");
            }
            other => panic!("expected list, got {other:?}"),
        }

        match &recorder.responses[2] {
            Response::Untagged(UntaggedResponse::Fetch(data)) => {
                assert_eq!(data.seq, 1);
                assert_eq!(data.attributes.uid(), Some(7));
                assert!(data.attributes.contains("flags"));
                assert!(data.bodies.is_empty());
            }
            other => panic!("expected fetch, got {other:?}"),
        }

        assert_eq!(
            recorder.starts,
            vec![BodyStart {
                seq: 1,
                section: "TEXT".to_string(),
                origin: None,
                size: 12,
            }]
        );
        assert_eq!(&*recorder.body.lock().unwrap(), b"line1\r\nline2");
        assert!(*recorder.ended.lock().unwrap());
        assert!(matches!(
            recorder.responses[4],
            Response::Tagged { status: Status::Ok, .. }
        ));
    }

    #[test]
    fn test_byte_at_a_time() {
        let whole = feed_chunks(SESSION, &[]);
        let split = feed_chunks(SESSION, &vec![1; SESSION.len()]);
        assert_eq!(whole.responses, split.responses);
        assert_eq!(whole.starts, split.starts);
        assert_eq!(*whole.body.lock().unwrap(), *split.body.lock().unwrap());
    }

    #[test]
    fn test_literal_containing_crlf_and_braces() {
        let input = b"* 3 FETCH (RFC822.TEXT {9}\r\n{2}\r\nab\r\n)\r\n";
        let recorder = feed_chunks(input, &[]);
        match &recorder.responses[0] {
            Response::Untagged(UntaggedResponse::Fetch(data)) => {
                assert_eq!(
                    data.attributes.get("rfc822.text"),
                    Some(&FetchValue::Value(Value::text("{2}\r\nab\r\n")))
                );
            }
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[test]
    fn test_eight_bit_literal_bytes_survive() {
        let recorder = feed_chunks(b"* 2 FETCH (RFC822.TEXT {4}\r\ncaf\xe9)\r\n", &[]);
        match &recorder.responses[0] {
            Response::Untagged(UntaggedResponse::Fetch(data)) => {
                assert_eq!(data.attributes.raw("rfc822.text"), Some(&b"caf\xe9"[..]));
            }
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_literal_and_binary_marker() {
        let input = b"* LIST () \"/\" {0}\r\n\r\n* 4 FETCH (BINARY[1] ~{3}\r\nabc)\r\n";
        let recorder = feed_chunks(input, &[]);
        match &recorder.responses[0] {
            Response::Untagged(UntaggedResponse::List(entry)) => assert_eq!(entry.name, ""),
            other => panic!("expected list, got {other:?}"),
        }
        assert_eq!(recorder.starts[0].section, "1");
        assert_eq!(&*recorder.body.lock().unwrap(), b"abc");
    }

    #[test]
    fn test_body_with_origin_and_zero_size() {
        let input = b"* 9 FETCH (BODY[1]<100> {0}\r\n UID 2)\r\n";
        let recorder = feed_chunks(input, &[]);
        assert_eq!(recorder.starts[0].origin, Some(100));
        assert!(*recorder.ended.lock().unwrap());
        assert_eq!(recorder.responses.len(), 1);
    }

    #[test]
    fn test_unrecognized_line() {
        let recorder = feed_chunks(b"garbage from the server\r\n\r\n", &[]);
        assert_eq!(
            recorder.responses,
            vec![Response::Unrecognized("garbage from the server".to_string())]
        );
    }

    #[test]
    fn test_literal_too_large() {
        let mut parser = ResponseParser::with_limits(4, 1024);
        let err = parser
            .feed(b"* LIST () \"/\" {5}\r\n", &mut Recorder::default())
            .unwrap_err();
        assert!(matches!(err, Error::LiteralTooLarge { size: 5, max: 4 }));
    }

    #[test]
    fn test_line_too_long() {
        let mut parser = ResponseParser::with_limits(1024, 8);
        let err = parser.feed(b"* OK this is long", &mut Recorder::default()).unwrap_err();
        assert!(matches!(err, Error::LineTooLong { max: 8 }));
    }

    #[test]
    fn test_backpressure_keeps_every_byte() {
        let input = b"* 1 FETCH (BODY[] {10}\r\n0123456789)\r\nA0001 OK done\r\n";
        let mut parser = ResponseParser::new();
        let mut recorder = Recorder {
            refuse: true,
            ..Recorder::default()
        };

        let mut progress = parser.feed(&input[..15], &mut recorder).unwrap();
        let mut rest = &input[15..];
        let mut pauses = 0;
        loop {
            match progress {
                Progress::Paused(_) => {
                    pauses += 1;
                    if !rest.is_empty() {
                        let n = 3.min(rest.len());
                        progress = parser.feed(&rest[..n], &mut recorder).unwrap();
                        rest = &rest[n..];
                        continue;
                    }
                    progress = parser.resume(&mut recorder).unwrap();
                }
                Progress::Drained if rest.is_empty() => break,
                Progress::Drained => {
                    let n = 3.min(rest.len());
                    progress = parser.feed(&rest[..n], &mut recorder).unwrap();
                    rest = &rest[n..];
                }
            }
        }

        assert!(pauses > 0);
        assert_eq!(&*recorder.body.lock().unwrap(), b"0123456789");
        assert_eq!(recorder.responses.len(), 2);
    }

    #[test]
    fn test_full_sink_on_final_chunk_does_not_pause() {
        let mut parser = ResponseParser::new();
        let mut recorder = Recorder {
            refuse: true,
            ..Recorder::default()
        };
        let progress = parser
            .feed(b"* 1 FETCH (BODY[] {4}\r\nabcd)\r\nA0001 OK done\r\n", &mut recorder)
            .unwrap();
        assert!(matches!(progress, Progress::Drained));
        assert!(!parser.is_paused());
        assert!(*recorder.ended.lock().unwrap());
        assert_eq!(&*recorder.body.lock().unwrap(), b"abcd");
        assert_eq!(recorder.responses.len(), 2);
    }

    #[test]
    fn test_feed_while_paused_only_buffers() {
        let mut parser = ResponseParser::new();
        let mut recorder = Recorder {
            refuse: true,
            ..Recorder::default()
        };
        let progress = parser.feed(b"* 1 FETCH (BODY[] {4}\r\nab", &mut recorder).unwrap();
        assert!(matches!(progress, Progress::Paused(_)));
        assert!(parser.is_paused());

        parser.feed(b"cd)\r\n", &mut recorder).unwrap();
        assert!(recorder.responses.is_empty());
        assert_eq!(parser.buffered(), 5);

        parser.resume(&mut recorder).unwrap();
        parser.resume(&mut recorder).unwrap();
        assert_eq!(&*recorder.body.lock().unwrap(), b"abcd");
        assert_eq!(recorder.responses.len(), 1);
    }

    proptest! {
        #[test]
        fn test_chunking_invariance(sizes in prop::collection::vec(1usize..24, 0..80)) {
            let whole = feed_chunks(SESSION, &[]);
            let split = feed_chunks(SESSION, &sizes);
            prop_assert_eq!(whole.responses, split.responses);
            prop_assert_eq!(whole.starts, split.starts);
            prop_assert_eq!(whole.body.lock().unwrap().clone(), split.body.lock().unwrap().clone());
        }
    }
}
