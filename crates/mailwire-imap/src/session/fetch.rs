//! FETCH multiplexer.
//!
//! Routes the untagged FETCH data of one in-flight FETCH command by sequence
//! number, and signals each message complete exactly once: as soon as every
//! requested attribute has arrived, or at the tagged completion for
//! messages that never got all of them.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::mpsc;

use crate::body::{BodyReceiver, BodySink, DiscardSink, body_channel};
use crate::command::FetchKey;
use crate::parser::{BodyStart, FetchAttributes, FetchData};

/// Receives the results of a FETCH as they arrive.
pub trait FetchObserver: Send {
    /// A body section is starting; the returned sink receives its bytes.
    fn body(&mut self, seq: u32, start: &BodyStart) -> Box<dyn BodySink>;

    /// A message is complete. Called once per sequence number.
    fn message(&mut self, seq: u32, attributes: FetchAttributes);
}

/// Output of a [`StreamingObserver`].
#[derive(Debug)]
pub enum FetchEvent {
    /// A body section started; its bytes arrive on `body`.
    Body {
        /// Sequence number of the message.
        seq: u32,
        /// The body announcement.
        start: BodyStart,
        /// Receiving half of the body channel.
        body: BodyReceiver,
    },
    /// A message is complete.
    Message {
        /// Sequence number of the message.
        seq: u32,
        /// Every attribute received for it.
        attributes: FetchAttributes,
    },
}

/// Observer forwarding FETCH results to an async consumer.
///
/// Every body gets its own [`body_channel`]; once more than `high_water`
/// bytes of one body sit unread, the parser pauses until the consumer
/// catches up.
#[derive(Debug)]
pub struct StreamingObserver {
    high_water: usize,
    events: mpsc::UnboundedSender<FetchEvent>,
}

impl StreamingObserver {
    /// Creates an observer and the receiver of its events.
    #[must_use]
    pub fn new(high_water: usize) -> (Self, mpsc::UnboundedReceiver<FetchEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { high_water, events }, rx)
    }
}

impl FetchObserver for StreamingObserver {
    fn body(&mut self, seq: u32, start: &BodyStart) -> Box<dyn BodySink> {
        let (tx, body) = body_channel(self.high_water);
        let event = FetchEvent::Body {
            seq,
            start: start.clone(),
            body,
        };
        if self.events.send(event).is_err() {
            tracing::debug!(seq, "fetch consumer gone, discarding body");
            return Box::new(DiscardSink);
        }
        Box::new(tx)
    }

    fn message(&mut self, seq: u32, attributes: FetchAttributes) {
        let _ = self.events.send(FetchEvent::Message { seq, attributes });
    }
}

#[derive(Debug)]
struct Entry {
    outstanding: BTreeSet<FetchKey>,
    attributes: FetchAttributes,
    ended: bool,
}

/// Per-request FETCH state.
pub struct FetchMultiplexer {
    expected: BTreeSet<FetchKey>,
    entries: BTreeMap<u32, Entry>,
    observer: Option<Box<dyn FetchObserver>>,
    completed: usize,
}

impl std::fmt::Debug for FetchMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchMultiplexer")
            .field("expected", &self.expected)
            .field("entries", &self.entries)
            .field("observer", &self.observer.is_some())
            .field("completed", &self.completed)
            .finish()
    }
}

impl FetchMultiplexer {
    /// Creates a multiplexer expecting `expected` for every message.
    #[must_use]
    pub fn new(expected: BTreeSet<FetchKey>, observer: Option<Box<dyn FetchObserver>>) -> Self {
        Self {
            expected,
            entries: BTreeMap::new(),
            observer,
            completed: 0,
        }
    }

    /// Number of messages signaled complete so far.
    #[must_use]
    pub const fn completed(&self) -> usize {
        self.completed
    }

    fn entry(&mut self, seq: u32) -> &mut Entry {
        self.entries.entry(seq).or_insert_with(|| Entry {
            outstanding: self.expected.clone(),
            attributes: FetchAttributes::new(),
            ended: false,
        })
    }

    /// A streamed body literal is starting.
    pub fn on_body_start(&mut self, start: &BodyStart) -> Box<dyn BodySink> {
        self.entry(start.seq)
            .outstanding
            .remove(&FetchKey::body(&start.section));
        match self.observer.as_mut() {
            Some(observer) => observer.body(start.seq, start),
            None => Box::new(DiscardSink),
        }
    }

    /// A FETCH line for this request was decoded.
    pub fn on_fetch(&mut self, data: FetchData) {
        let FetchData {
            seq,
            attributes,
            bodies,
        } = data;

        for body in bodies {
            self.entry(seq).outstanding.remove(&FetchKey::body(&body.section));
            if let Some(observer) = self.observer.as_mut() {
                let start = BodyStart {
                    seq,
                    section: body.section,
                    origin: body.origin,
                    size: body.data.len(),
                };
                let mut sink = observer.body(seq, &start);
                if !body.data.is_empty() {
                    sink.push(body.data);
                }
                sink.end();
            }
        }

        let entry = self.entry(seq);
        for key in attributes.keys() {
            entry.outstanding.remove(&FetchKey::attr(key));
        }
        entry.attributes.merge(attributes);

        if !entry.ended && entry.outstanding.is_empty() {
            self.signal(seq);
        }
    }

    /// The FETCH completed; signals every message still open.
    pub fn finish(&mut self) -> usize {
        let open: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.ended)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in open {
            self.signal(seq);
        }
        self.completed
    }

    fn signal(&mut self, seq: u32) {
        let Some(entry) = self.entries.get_mut(&seq) else {
            return;
        };
        entry.ended = true;
        let attributes = std::mem::take(&mut entry.attributes);
        self.completed += 1;
        tracing::trace!(seq, "fetch message complete");
        if let Some(observer) = self.observer.as_mut() {
            observer.message(seq, attributes);
        }
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
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;
    use crate::parser::expression::{BracketMode, decode_str};
    use crate::parser::response::decode_fetch;

    #[derive(Default, Clone)]
    struct Log {
        messages: Arc<Mutex<Vec<(u32, FetchAttributes)>>>,
        bodies: Arc<Mutex<Vec<(u32, String, Vec<u8>)>>>,
    }

    struct LogSink {
        log: Log,
        seq: u32,
        section: String,
        data: Vec<u8>,
    }

    impl BodySink for LogSink {
        fn push(&mut self, chunk: Bytes) -> bool {
            self.data.extend_from_slice(&chunk);
            true
        }

        fn end(&mut self) {
            self.log.bodies.lock().unwrap().push((
                self.seq,
                self.section.clone(),
                std::mem::take(&mut self.data),
            ));
        }
    }

    impl FetchObserver for Log {
        fn body(&mut self, seq: u32, start: &BodyStart) -> Box<dyn BodySink> {
            Box::new(LogSink {
                log: self.clone(),
                seq,
                section: start.section.clone(),
                data: Vec::new(),
            })
        }

        fn message(&mut self, seq: u32, attributes: FetchAttributes) {
            self.messages.lock().unwrap().push((seq, attributes));
        }
    }

    fn fetch(seq: u32, payload: &str) -> FetchData {
        decode_fetch(seq, &decode_str(payload, BracketMode::Atom))
    }

    fn expected(keys: &[FetchKey]) -> BTreeSet<FetchKey> {
        keys.iter().cloned().collect()
    }

    #[test]
    fn test_complete_when_all_keys_arrive() {
        let log = Log::default();
        let mut mux = FetchMultiplexer::new(
            expected(&[FetchKey::attr("uid"), FetchKey::attr("flags")]),
            Some(Box::new(log.clone())),
        );
        mux.on_fetch(fetch(1, "(UID 10 FLAGS (\\Seen))"));
        assert_eq!(log.messages.lock().unwrap().len(), 1);
        assert_eq!(mux.finish(), 1);
        assert_eq!(log.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_split_fetch_signals_once() {
        let log = Log::default();
        let mut mux = FetchMultiplexer::new(
            expected(&[FetchKey::attr("uid"), FetchKey::attr("flags")]),
            Some(Box::new(log.clone())),
        );
        mux.on_fetch(fetch(1, "(UID 10)"));
        assert!(log.messages.lock().unwrap().is_empty());
        mux.on_fetch(fetch(1, "(FLAGS (\\Seen))"));
        mux.on_fetch(fetch(1, "(FLAGS (\\Seen))"));
        mux.finish();

        let messages = log.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].1.uid(), Some(10));
        assert_eq!(messages[0].1.flags().unwrap(), ["\\Seen"]);
    }

    #[test]
    fn test_spillover_signaled_at_finish() {
        let log = Log::default();
        let mut mux = FetchMultiplexer::new(
            expected(&[FetchKey::attr("uid"), FetchKey::attr("envelope")]),
            Some(Box::new(log.clone())),
        );
        mux.on_fetch(fetch(3, "(UID 1)"));
        mux.on_fetch(fetch(4, "(UID 2)"));
        assert!(log.messages.lock().unwrap().is_empty());
        assert_eq!(mux.finish(), 2);
        let seqs: Vec<u32> = log.messages.lock().unwrap().iter().map(|(seq, _)| *seq).collect();
        assert_eq!(seqs, [3, 4]);
    }

    #[test]
    fn test_empty_expectation_signals_immediately() {
        let log = Log::default();
        let mut mux = FetchMultiplexer::new(BTreeSet::new(), Some(Box::new(log.clone())));
        mux.on_fetch(fetch(1, "(X-GM-LABELS ())"));
        assert_eq!(log.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_streamed_and_inline_bodies() {
        let log = Log::default();
        let mut mux = FetchMultiplexer::new(
            expected(&[FetchKey::body("TEXT"), FetchKey::body("HEADER"), FetchKey::attr("uid")]),
            Some(Box::new(log.clone())),
        );

        let mut sink = mux.on_body_start(&BodyStart {
            seq: 7,
            section: "TEXT".to_string(),
            origin: None,
            size: 5,
        });
        sink.push(Bytes::from_static(b"hello"));
        sink.end();
        mux.on_fetch(fetch(7, "(UID 70 BODY[HEADER] \"Subject: x\")"));

        let bodies = log.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], (7, "TEXT".to_string(), b"hello".to_vec()));
        assert_eq!(bodies[1], (7, "HEADER".to_string(), b"Subject: x".to_vec()));
        assert_eq!(log.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_without_observer_discards() {
        let mut mux = FetchMultiplexer::new(expected(&[FetchKey::body("1")]), None);
        let mut sink = mux.on_body_start(&BodyStart {
            seq: 1,
            section: "1".to_string(),
            origin: None,
            size: 1,
        });
        assert!(sink.push(Bytes::from_static(b"x")));
        mux.on_fetch(fetch(1, "()"));
        assert_eq!(mux.completed(), 1);
    }
}
