//! Body literal sinks.
//!
//! A `BODY[...]` literal is not buffered by the parser: its bytes are pushed
//! into a [`BodySink`] as they arrive. A sink that returns `false` from
//! [`BodySink::push`] pauses the parser until its [`ReadySignal`] fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::sync::{Notify, mpsc};

/// Consumer of one streamed body literal.
pub trait BodySink: Send {
    /// Delivers the next chunk. The chunk is always taken; `false` asks the
    /// producer to stop until [`BodySink::readiness`] fires.
    fn push(&mut self, chunk: Bytes) -> bool;

    /// Signals that every byte of the literal has been pushed.
    fn end(&mut self);

    /// Signal fired when the sink can accept more data.
    ///
    /// Sinks without one are never waited on.
    fn readiness(&self) -> Option<ReadySignal> {
        None
    }
}

/// Wakes a paused producer once a sink drains.
#[derive(Debug, Clone, Default)]
pub struct ReadySignal(Arc<Notify>);

impl ReadySignal {
    /// Creates a new signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the sink ready. A notification with no waiter is kept for the
    /// next [`ReadySignal::ready`] call.
    pub fn notify(&self) {
        self.0.notify_one();
    }

    /// Waits until the sink is ready.
    pub async fn ready(&self) {
        self.0.notified().await;
    }
}

/// Sink that drops everything, for bodies nobody asked for.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl BodySink for DiscardSink {
    fn push(&mut self, _chunk: Bytes) -> bool {
        true
    }

    fn end(&mut self) {}
}

#[derive(Debug)]
struct Shared {
    buffered: AtomicUsize,
    high_water: usize,
    ready: ReadySignal,
}

impl Shared {
    fn below_high_water(&self) -> bool {
        self.buffered.load(Ordering::Acquire) < self.high_water
    }
}

/// Producer half of [`body_channel`].
#[derive(Debug)]
pub struct BodySender {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    shared: Arc<Shared>,
}

/// Consumer half of [`body_channel`].
#[derive(Debug)]
pub struct BodyReceiver {
    rx: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
}

/// Creates a body sink backed by a channel.
///
/// `push` reports backpressure once more than `high_water` bytes are
/// waiting in the channel; receiving brings the count back down and fires
/// the readiness signal.
#[must_use]
pub fn body_channel(high_water: usize) -> (BodySender, BodyReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        buffered: AtomicUsize::new(0),
        high_water: high_water.max(1),
        ready: ReadySignal::new(),
    });
    (
        BodySender {
            tx: Some(tx),
            shared: Arc::clone(&shared),
        },
        BodyReceiver { rx, shared },
    )
}

impl BodySink for BodySender {
    fn push(&mut self, chunk: Bytes) -> bool {
        let Some(tx) = &self.tx else {
            return true;
        };
        let len = chunk.len();
        // Counted before sending so the receiver never subtracts first.
        self.shared.buffered.fetch_add(len, Ordering::AcqRel);
        if tx.send(chunk).is_err() {
            // Receiver gone; nothing will ever drain, so never pause.
            self.shared.buffered.fetch_sub(len, Ordering::AcqRel);
            self.tx = None;
            return true;
        }
        self.shared.below_high_water()
    }

    fn end(&mut self) {
        self.tx = None;
    }

    fn readiness(&self) -> Option<ReadySignal> {
        self.tx.as_ref().map(|_| self.shared.ready.clone())
    }
}

impl BodyReceiver {
    /// Receives the next chunk, or `None` once the body has ended.
    pub async fn recv(&mut self) -> Option<Bytes> {
        let chunk = self.rx.recv().await?;
        self.shared.buffered.fetch_sub(chunk.len(), Ordering::AcqRel);
        if self.shared.below_high_water() {
            self.shared.ready.notify();
        }
        Some(chunk)
    }

    /// Receives every remaining chunk and concatenates them.
    pub async fn read_to_end(mut self) -> Bytes {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.recv().await {
            out.extend_from_slice(&chunk);
        }
        out.freeze()
    }

    /// Returns the number of bytes sent but not yet received.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.shared.buffered.load(Ordering::Acquire)
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

    #[tokio::test]
    async fn test_channel_reports_backpressure() {
        let (mut tx, mut rx) = body_channel(4);
        assert!(tx.push(Bytes::from_static(b"ab")));
        assert!(!tx.push(Bytes::from_static(b"cde")));
        assert_eq!(rx.buffered(), 5);

        let signal = tx.readiness().unwrap();
        assert_eq!(rx.recv().await.unwrap(), "ab");
        assert_eq!(rx.recv().await.unwrap(), "cde");
        signal.ready().await;
        assert_eq!(rx.buffered(), 0);
    }

    #[tokio::test]
    async fn test_read_to_end_after_end() {
        let (mut tx, rx) = body_channel(1024);
        tx.push(Bytes::from_static(b"hello "));
        tx.push(Bytes::from_static(b"world"));
        tx.end();
        assert!(tx.readiness().is_none());
        assert_eq!(rx.read_to_end().await, "hello world");
    }

    #[test]
    fn test_dropped_receiver_never_pauses() {
        let (mut tx, rx) = body_channel(1);
        drop(rx);
        assert!(tx.push(Bytes::from_static(b"lots of data")));
        assert!(tx.readiness().is_none());
    }

    #[test]
    fn test_discard_sink() {
        let mut sink = DiscardSink;
        assert!(sink.push(Bytes::from_static(b"x")));
        assert!(sink.readiness().is_none());
    }
}
