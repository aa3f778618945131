//! Tokio driver for the session engine.
//!
//! [`Connection`] moves bytes between an `AsyncRead + AsyncWrite` transport
//! and an [`Engine`]: it writes what the engine transmits, feeds what the
//! server sends, sleeps until the keepalive deadline, and waits for a full
//! body sink to drain before reading further.
//!
//! # Example
//!
//! ```no_run
//! use mailwire_imap::command::CommandRequest;
//! use mailwire_imap::connection::{Connection, connect_tls};
//! use mailwire_imap::handler::LoggingHandler;
//! use mailwire_imap::session::{CommandData, Engine};
//! use mailwire_imap::Config;
//!
//! # async fn run() -> mailwire_imap::Result<()> {
//! let transport = connect_tls("imap.example.com", 993).await?;
//! let engine = Engine::new(Config::new(), LoggingHandler);
//! let mut connection = Connection::new(transport, engine);
//!
//! connection.execute(CommandRequest::new("LOGIN user secret")).await?;
//! let list = connection.execute(CommandRequest::new("LIST \"\" *")).await?;
//! if let CommandData::List(tree) = list.data {
//!     println!("{} top-level mailboxes", tree.len());
//! }
//! connection.execute(CommandRequest::new("LOGOUT")).await?;
//! # Ok(())
//! # }
//! ```

mod stream;

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot::error::TryRecvError;

pub use stream::{Transport, connect_plain, connect_tls, tls_connector};

use crate::command::CommandRequest;
use crate::handler::EventHandler;
use crate::session::{Completion, Engine, Enqueued};
use crate::{Error, Result};

/// Default buffer size for reading.
const READ_BUFFER_SIZE: usize = 8192;

enum Wake {
    Read(std::io::Result<usize>),
    Timer,
}

/// An engine bound to a transport.
pub struct Connection<S, H> {
    stream: S,
    engine: Engine<H>,
    buffer: Box<[u8]>,
    closed: bool,
}

impl<S, H> std::fmt::Debug for Connection<S, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("engine", &self.engine)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<S, H> Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: EventHandler,
{
    /// Binds `engine` to an open transport.
    pub fn new(stream: S, mut engine: Engine<H>) -> Self {
        engine.connection_opened();
        Self {
            stream,
            engine,
            buffer: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
            closed: false,
        }
    }

    /// Returns the engine.
    #[must_use]
    pub const fn engine(&self) -> &Engine<H> {
        &self.engine
    }

    /// Returns the engine mutably.
    pub const fn engine_mut(&mut self) -> &mut Engine<H> {
        &mut self.engine
    }

    /// Returns true once the transport is closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Queues a command without waiting for it.
    pub fn enqueue(&mut self, request: CommandRequest) -> Enqueued {
        self.engine.enqueue(request)
    }

    /// Queues a command and drives the connection until it completes.
    ///
    /// # Errors
    ///
    /// Returns the command's error: NO/BAD from the server, or
    /// [`Error::ConnectionClosed`] if the transport went away first.
    pub async fn execute(&mut self, request: CommandRequest) -> Result<Completion> {
        let Enqueued { mut completion, .. } = self.engine.enqueue(request);
        loop {
            match completion.try_recv() {
                Ok(outcome) => return outcome,
                Err(TryRecvError::Closed) => return Err(Error::ConnectionClosed),
                Err(TryRecvError::Empty) => {}
            }
            self.step().await?;
        }
    }

    /// Drives the connection until the transport closes.
    ///
    /// # Errors
    ///
    /// Never fails once running; connection errors are reported to the
    /// event handler and to pending commands.
    pub async fn run(&mut self) -> Result<()> {
        while !self.closed {
            self.step().await?;
        }
        Ok(())
    }

    /// Writes every pending transmit.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of a failed write.
    pub async fn flush(&mut self) -> Result<()> {
        let mut wrote = false;
        while let Some(transmit) = self.engine.poll_transmit() {
            tracing::trace!(bytes = transmit.len(), "sending");
            self.stream.write_all(&transmit.data).await?;
            wrote = true;
        }
        if wrote {
            self.stream.flush().await?;
        }
        Ok(())
    }

    /// Performs one unit of work: flush, then wait for data, a timer or a
    /// paused body sink.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if called after the transport
    /// closed.
    pub async fn step(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        if let Err(error) = self.flush().await {
            self.close(Some(error)).await;
            return Ok(());
        }

        if self.engine.wants_close() {
            tracing::debug!("session finished, closing transport");
            self.close(None).await;
            return Ok(());
        }

        if let Some(signal) = self.engine.ready_signal() {
            tracing::trace!("waiting for body sink");
            signal.ready().await;
            if let Err(error) = self.engine.resume_input() {
                self.close(Some(error)).await;
            }
            return Ok(());
        }

        let deadline = self.engine.poll_timeout();
        let wake = tokio::select! {
            read = self.stream.read(&mut self.buffer) => Wake::Read(read),
            () = sleep_until(deadline) => Wake::Timer,
        };

        match wake {
            Wake::Read(Ok(0)) => {
                tracing::debug!("server closed the connection");
                self.close(None).await;
            }
            Wake::Read(Ok(n)) => {
                if let Err(error) = self.engine.handle_input(&self.buffer[..n]) {
                    self.close(Some(error)).await;
                }
            }
            Wake::Read(Err(error)) => self.close(Some(error.into())).await,
            Wake::Timer => self.engine.handle_timeout(),
        }
        Ok(())
    }

    /// Shuts the transport down and fails whatever is still pending.
    async fn close(&mut self, reason: Option<Error>) {
        let _ = self.stream.shutdown().await;
        self.closed = true;
        self.engine.connection_closed(reason);
    }

    /// Splits the connection into its transport and engine.
    pub fn into_parts(self) -> (S, Engine<H>) {
        (self.stream, self.engine)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
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
    use std::sync::Arc;

    use tokio_test::io::Builder;

    use super::*;
    use crate::config::Config;
    use crate::handler::{CollectingHandler, Event};
    use crate::session::{CommandData, FetchEvent};
    use crate::time::Clock;

    fn engine() -> Engine<CollectingHandler> {
        Engine::new(Config::builder().no_keepalive().build(), CollectingHandler::new())
    }

    #[tokio::test]
    async fn test_execute_login() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN user pass\r\n")
            .read(b"A0000 OK [CAPABILITY IMAP4rev1 IDLE] done\r\n")
            .build();
        let mut connection = Connection::new(mock, engine());

        let completion = connection.execute(CommandRequest::new("LOGIN user pass")).await.unwrap();
        assert_eq!(completion.tag.as_str(), "A0000");
        assert_eq!(completion.text, "done");
        assert!(connection.engine().state().is_authenticated());
    }

    #[tokio::test]
    async fn test_execute_no() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 SELECT Nope\r\n")
            .read(b"A0000 NO [NONEXISTENT] unknown mailbox\r\n")
            .build();
        let mut connection = Connection::new(mock, engine());

        let err = connection.execute(CommandRequest::new("SELECT Nope")).await.unwrap_err();
        assert!(matches!(err, Error::No { .. }));
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn test_eof_fails_pending() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 CHECK\r\n")
            .build();
        let mut connection = Connection::new(mock, engine());

        let err = connection.execute(CommandRequest::new("CHECK")).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(connection.is_closed());
        assert_eq!(connection.engine().handler().events, [Event::Closed]);
        assert!(matches!(connection.step().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_logout_closes_transport() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGOUT\r\n")
            .read(b"* BYE bye\r\nA0000 OK LOGOUT completed\r\n")
            .build();
        let mut connection = Connection::new(mock, engine());

        connection.execute(CommandRequest::new("LOGOUT")).await.unwrap();
        connection.run().await.unwrap();
        assert!(connection.is_closed());
        assert_eq!(connection.engine().handler().events, [Event::Closed]);
    }

    #[tokio::test]
    async fn test_streams_body_with_backpressure() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 FETCH 1 (UID BODY[TEXT])\r\n")
            .read(b"* 1 FETCH (UID 42 BODY[TEXT] {11}\r\nHello world)\r\nA0000 OK done\r\n")
            .build();
        let config = Config::builder().no_keepalive().body_high_water(4).build();
        let mut connection = Connection::new(mock, Engine::new(config, CollectingHandler::new()));

        let (observer, mut events) = connection.engine().streaming_observer();
        let consumer = tokio::spawn(async move {
            let mut body = None;
            let mut completed = Vec::new();
            while let Some(event) = events.recv().await {
                match event {
                    FetchEvent::Body { seq, start, body: rx } => {
                        assert_eq!((seq, start.section.as_str()), (1, "TEXT"));
                        body = Some(rx.read_to_end().await);
                    }
                    FetchEvent::Message { seq, attributes } => {
                        completed.push((seq, attributes.uid()));
                    }
                }
            }
            (body, completed)
        });

        let request = CommandRequest::new("FETCH 1 (UID BODY[TEXT])").with_observer(observer);
        let completion = connection.execute(request).await.unwrap();
        assert_eq!(completion.data, CommandData::Fetch { messages: 1 });
        // The observer goes away with the finished request, ending the stream.
        let (body, completed) = consumer.await.unwrap();
        assert_eq!(&body.unwrap()[..], b"Hello world");
        assert_eq!(completed, [(1, Some(42))]);
    }

    /// Reads tokio's clock so paused test time drives the engine.
    struct TokioClock;

    impl Clock for TokioClock {
        fn now(&self) -> Instant {
            tokio::time::Instant::now().into_std()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_noop_on_timer() {
        let config = Config::builder()
            .keepalive_interval(std::time::Duration::from_secs(10))
            .build();
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"NOOP NOOP\r\n")
            .read(b"NOOP OK done\r\n")
            .build();
        let engine = Engine::with_clock(config, CollectingHandler::new(), Arc::new(TokioClock));
        let mut connection = Connection::new(mock, engine);

        // Greeting, then the timer fires while the read waits.
        connection.step().await.unwrap();
        connection.step().await.unwrap();
        assert!(connection.engine().queued() == 1);
        connection.step().await.unwrap();
        assert!(!connection.engine().is_busy());
        assert!(!connection.is_closed());
    }
}
