//! Sans-I/O session engine.
//!
//! The [`Engine`] owns the response parser, the command queue and the
//! session state. It performs no I/O:
//!
//! - bytes from the server go in through [`Engine::handle_input`]
//! - bytes for the server come out of [`Engine::poll_transmit`]
//! - the keepalive timer is driven by [`Engine::poll_timeout`] and
//!   [`Engine::handle_timeout`]
//!
//! Exactly one command is in flight at a time. Commands queued while
//! another runs wait; dispatch happens in `poll_transmit`, so a payload can
//! still be attached to a freshly queued command.
//!
//! # Example
//!
//! ```
//! use mailwire_imap::command::CommandRequest;
//! use mailwire_imap::handler::CollectingHandler;
//! use mailwire_imap::session::Engine;
//! use mailwire_imap::Config;
//!
//! let mut engine = Engine::new(Config::builder().no_keepalive().build(), CollectingHandler::new());
//! engine.connection_opened();
//! engine.handle_input(b"* OK [CAPABILITY IMAP4rev1] ready\r\n").unwrap();
//!
//! let login = engine.enqueue(CommandRequest::new("LOGIN user pass"));
//! let transmit = engine.poll_transmit().unwrap();
//! assert_eq!(transmit.as_str(), Some("A0000 LOGIN user pass\r\n"));
//!
//! engine.handle_input(b"A0000 OK [CAPABILITY IMAP4rev1 IDLE] done\r\n").unwrap();
//! assert!(engine.state().is_authenticated());
//! assert!(engine.has_capability("IDLE"));
//! drop(login);
//! ```

#![allow(clippy::missing_const_for_fn)]

mod fetch;
mod idle;
mod request;
mod state;
mod transmit;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

pub use fetch::{FetchEvent, FetchMultiplexer, FetchObserver, StreamingObserver};
pub use idle::IdleState;
pub use request::{CommandData, Completion, RequestId};
pub use state::SessionState;
pub use transmit::Transmit;

use crate::body::{BodySink, DiscardSink, ReadySignal};
use crate::command::{CommandKind, CommandRequest, TagGenerator};
use crate::config::Config;
use crate::handler::EventHandler;
use crate::parser::{
    BodyStart, Condition, Progress, Response, ResponseParser, ResponseSink, UntaggedResponse,
};
use crate::time::{SharedClock, SystemClock};
use crate::types::{CapabilitySet, MailboxState, ResponseCode, Status, Tag};
use crate::{Error, Result};

use idle::IdleMachine;
use request::{Accumulator, PendingRequest};

/// A queued command and the receiver of its outcome.
#[derive(Debug)]
pub struct Enqueued {
    /// Id to refer to the request, e.g. in [`Engine::attach_payload`].
    pub id: RequestId,
    /// Resolves exactly once with the tagged completion or an error.
    pub completion: oneshot::Receiver<Result<Completion>>,
}

/// IMAP session engine.
pub struct Engine<H> {
    parser: ResponseParser,
    core: Core<H>,
}

impl<H> std::fmt::Debug for Engine<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.core.state)
            .field("mailbox", &self.core.mailbox.as_ref().map(|m| &m.name))
            .field("queued", &self.core.queue.len())
            .field("in_flight", &self.core.current.as_ref().map(|r| &r.kind))
            .field("idle", &self.core.idle.state())
            .finish_non_exhaustive()
    }
}

impl<H: EventHandler> Engine<H> {
    /// Creates an engine using the system clock.
    #[must_use]
    pub fn new(config: Config, handler: H) -> Self {
        Self::with_clock(config, handler, Arc::new(SystemClock))
    }

    /// Creates an engine reading time from `clock`.
    #[must_use]
    pub fn with_clock(config: Config, handler: H, clock: SharedClock) -> Self {
        Self {
            parser: ResponseParser::from_config(&config),
            core: Core {
                tags: TagGenerator::new('A', config.tag_ceiling),
                config,
                clock,
                handler,
                state: SessionState::Disconnected,
                capabilities: CapabilitySet::new(),
                queue: VecDeque::new(),
                current: None,
                outbound: VecDeque::new(),
                mailbox: None,
                idle: IdleMachine::default(),
                idle_refused: false,
                next_id: 0,
                greeted: false,
                closing: false,
                closed: false,
                keepalive_deadline: None,
            },
        }
    }

    /// The transport is open; the engine now waits for the greeting.
    pub fn connection_opened(&mut self) {
        self.parser = ResponseParser::from_config(&self.core.config);
        let core = &mut self.core;
        core.state = SessionState::Connected;
        core.greeted = false;
        core.closing = false;
        core.closed = false;
        core.capabilities = CapabilitySet::new();
        core.idle_refused = false;
        core.keepalive_deadline = core
            .config
            .keepalive
            .map(|keepalive| core.clock.now() + keepalive.interval);
        tracing::debug!("connection opened");
    }

    /// Queues a command at the back of the queue.
    pub fn enqueue(&mut self, request: CommandRequest) -> Enqueued {
        self.core.enqueue(request, false)
    }

    /// Queues a command ahead of everything not yet sent.
    pub fn enqueue_urgent(&mut self, request: CommandRequest) -> Enqueued {
        self.core.enqueue(request, true)
    }

    /// Attaches a raw payload to a request that has not been sent yet.
    ///
    /// Returns false if the request is unknown or already dispatched.
    pub fn attach_payload(&mut self, id: RequestId, payload: impl Into<Bytes>) -> bool {
        match self.core.queue.iter_mut().find(|r| r.id == id) {
            Some(request) => {
                request.payload = Some(payload.into());
                true
            }
            None => false,
        }
    }

    /// Feeds bytes received from the server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineTooLong`] or [`Error::LiteralTooLarge`] when the
    /// server exceeds the configured limits. The session cannot continue
    /// after either.
    pub fn handle_input(&mut self, data: &[u8]) -> Result<Progress> {
        self.parser.feed(data, &mut self.core)
    }

    /// Continues parsing after a body sink signaled readiness.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::handle_input`].
    pub fn resume_input(&mut self) -> Result<Progress> {
        self.parser.resume(&mut self.core)
    }

    /// Returns the signal parsing is paused on, if a body sink is full.
    #[must_use]
    pub fn ready_signal(&self) -> Option<ReadySignal> {
        self.parser.ready_signal()
    }

    /// Returns the next data to write, dispatching the next command if
    /// nothing is in flight.
    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.core.dispatch();
        self.core.outbound.pop_front()
    }

    /// Returns when [`Engine::handle_timeout`] should next be called.
    #[must_use]
    pub fn poll_timeout(&self) -> Option<Instant> {
        if self.core.closed {
            return None;
        }
        self.core.keepalive_deadline
    }

    /// Runs the keepalive timer: refreshes a long IDLE, or issues NOOP when
    /// IDLE is not available. Does nothing while a command is in flight.
    pub fn handle_timeout(&mut self) {
        self.core.handle_timeout();
    }

    /// The transport closed. Every queued request fails with
    /// [`Error::ConnectionClosed`].
    pub fn connection_closed(&mut self, reason: Option<Error>) {
        self.core.connection_closed(reason);
    }

    /// Returns true once the session is over (BYE or LOGOUT) and nothing is
    /// left in flight.
    #[must_use]
    pub fn wants_close(&self) -> bool {
        self.core.closing && self.core.current.is_none() && self.core.outbound.is_empty()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Creates a FETCH observer whose body channels pause parsing at the
    /// configured high-water mark.
    #[must_use]
    pub fn streaming_observer(&self) -> (StreamingObserver, mpsc::UnboundedReceiver<FetchEvent>) {
        StreamingObserver::new(self.core.config.body_high_water)
    }

    /// Returns the session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.core.state
    }

    /// Returns the server capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.core.capabilities
    }

    /// Checks if the server has a capability.
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.core.capabilities.contains(capability)
    }

    /// Returns the selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> Option<&MailboxState> {
        self.core.mailbox.as_ref()
    }

    /// Returns the IDLE state.
    #[must_use]
    pub fn idle_state(&self) -> IdleState {
        self.core.idle.state()
    }

    /// Returns true while IDLE is acknowledged and running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.core.idle.state() == IdleState::Active
    }

    /// Returns true while a command is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.core.current.is_some()
    }

    /// Returns the number of commands waiting to be sent.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.core.queue.len()
    }

    /// Returns the event handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.core.handler
    }

    /// Returns the event handler mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.core.handler
    }
}

struct Core<H> {
    config: Config,
    clock: SharedClock,
    handler: H,
    state: SessionState,
    capabilities: CapabilitySet,
    tags: TagGenerator,
    queue: VecDeque<PendingRequest>,
    current: Option<PendingRequest>,
    outbound: VecDeque<Transmit>,
    mailbox: Option<MailboxState>,
    idle: IdleMachine,
    /// The server refused IDLE; wait for the keepalive timer before retrying.
    idle_refused: bool,
    next_id: u64,
    greeted: bool,
    closing: bool,
    closed: bool,
    keepalive_deadline: Option<Instant>,
}

impl<H: EventHandler> Core<H> {
    fn next_id(&mut self) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        id
    }

    fn enqueue(&mut self, request: CommandRequest, urgent: bool) -> Enqueued {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        let mut pending = PendingRequest::new(id, request.into_parts(), Some(tx));

        if self.closed {
            pending.resolve(Err(Error::ConnectionClosed));
            return Enqueued { id, completion: rx };
        }

        tracing::debug!(id = id.get(), kind = ?pending.kind, urgent, "command queued");
        if urgent {
            self.queue.push_front(pending);
        } else {
            self.queue.push_back(pending);
        }
        self.interrupt_idle();
        Enqueued { id, completion: rx }
    }

    /// Queues a command the engine issues on its own behalf.
    fn enqueue_internal(&mut self, text: &str, urgent: bool) {
        let id = self.next_id();
        let pending = PendingRequest::new(id, CommandRequest::new(text).into_parts(), None);
        tracing::debug!(command = text, "internal command queued");
        if urgent {
            self.queue.push_front(pending);
        } else {
            self.queue.push_back(pending);
        }
    }

    fn interrupt_idle(&mut self) {
        let idling = self
            .current
            .as_ref()
            .is_some_and(|r| r.kind == CommandKind::Idle);
        if idling && self.idle.cancel() {
            self.send_done();
        }
    }

    fn send_done(&mut self) {
        tracing::debug!("ending IDLE");
        self.outbound.push_back(Transmit::line(b"DONE"));
    }

    fn selecting(&self) -> bool {
        self.current.as_ref().is_some_and(|r| r.kind.is_select())
    }

    /// Returns true while a command whose responses belong to it is in
    /// flight. IDLE and engine-issued commands exist to receive updates.
    fn solicited(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|r| r.kind != CommandKind::Idle && !r.is_internal())
    }

    fn idle_usable(&self) -> bool {
        !self.idle_refused
            && self.config.keepalive.is_some_and(|k| !k.force_noop)
            && self.state.is_authenticated()
            && self.capabilities.supports_idle()
    }

    fn dispatch(&mut self) {
        if !self.greeted || self.closing || self.closed || self.current.is_some() {
            return;
        }
        let request = match self.queue.pop_front() {
            Some(request) => request,
            None if self.idle_usable() => {
                let id = self.next_id();
                PendingRequest::new(id, CommandRequest::new("IDLE").into_parts(), None)
            }
            None => return,
        };
        self.send(request);
    }

    fn send(&mut self, mut request: PendingRequest) {
        let tag = match request.kind {
            CommandKind::Idle => Tag::idle(),
            CommandKind::Noop => Tag::noop(),
            _ => self.tags.next(),
        };
        let first = request.segments.pop_front().unwrap_or_default();
        tracing::trace!(tag = %tag, kind = ?request.kind, "sending command");
        self.outbound.push_back(Transmit::command(tag.as_str(), &first));

        // LITERAL+ does not wait for a continuation.
        if request.segments.is_empty() && first.ends_with(b"+}") {
            if let Some(payload) = request.payload.take() {
                self.outbound.push_back(Transmit::line(&payload));
            }
        }

        match request.kind {
            CommandKind::Idle => self.idle.issued(),
            CommandKind::Select | CommandKind::Examine => {
                let mut mailbox = MailboxState::new(request.mailbox.clone().unwrap_or_default());
                mailbox.read_only = request.kind == CommandKind::Examine;
                self.mailbox = Some(mailbox);
            }
            _ => {}
        }

        request.tag = Some(tag);
        self.current = Some(request);
    }

    fn handle_timeout(&mut self) {
        let Some(keepalive) = self.config.keepalive else {
            return;
        };
        let now = self.clock.now();
        if self.keepalive_deadline.is_some_and(|deadline| now < deadline) {
            return;
        }
        self.keepalive_deadline = Some(now + keepalive.interval);
        if !self.greeted || self.closing || self.closed {
            return;
        }

        match self.current.as_ref().map(|r| r.kind == CommandKind::Idle) {
            Some(true) => {
                if self.idle.refresh_due(now, keepalive.idle_interval) && self.idle.cancel() {
                    tracing::debug!("refreshing IDLE");
                    self.send_done();
                }
            }
            Some(false) => {}
            None => {
                if self.idle_refused {
                    tracing::debug!("retrying IDLE");
                    self.idle_refused = false;
                }
                if self.queue.is_empty() && !self.idle_usable() {
                    self.enqueue_internal("NOOP", false);
                }
            }
        }
    }

    fn connection_closed(&mut self, reason: Option<Error>) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state = SessionState::Disconnected;
        self.mailbox = None;
        self.idle.finished();
        self.outbound.clear();
        self.keepalive_deadline = None;

        if let Some(error) = reason {
            tracing::error!(%error, "connection failed");
            self.handler.on_error(&error, true);
        } else {
            tracing::debug!("connection closed");
        }

        if let Some(mut current) = self.current.take() {
            current.resolve(Err(Error::ConnectionClosed));
        }
        for mut request in self.queue.drain(..) {
            request.resolve(Err(Error::ConnectionClosed));
        }
        self.handler.on_close();
    }

    fn on_tagged(&mut self, tag: &Tag, status: Status, code: Option<ResponseCode>, text: String) {
        let matches = self
            .current
            .as_ref()
            .and_then(|r| r.tag.as_ref())
            .is_some_and(|t| t == tag);
        if !matches {
            tracing::warn!(tag = %tag, "completion for a command not in flight");
            return;
        }
        let Some(mut request) = self.current.take() else {
            return;
        };

        if let Some(ResponseCode::Alert) = code {
            tracing::warn!(text = %text, "ALERT");
            self.handler.on_alert(&text);
        }
        if request.kind == CommandKind::Idle {
            self.idle.finished();
            if matches!(status, Status::No | Status::Bad) {
                tracing::warn!(text = %text, "server refused IDLE");
                self.idle_refused = true;
            }
        }
        let accumulator = std::mem::replace(&mut request.accumulator, Accumulator::None);

        let outcome = if let Some(error) = request.error.take() {
            Err(error)
        } else {
            match status {
                Status::Ok | Status::PreAuth => {
                    self.apply_completion(&request, code.as_ref());
                    Ok(Completion {
                        tag: tag.clone(),
                        data: accumulator.into_data(&self.capabilities, self.mailbox.as_ref()),
                        code,
                        text,
                    })
                }
                Status::No | Status::Bad | Status::Bye => {
                    if let Accumulator::Fetch(mut mux) = accumulator {
                        mux.finish();
                    }
                    if request.kind.is_select() {
                        self.mailbox = None;
                    }
                    if status == Status::Bad {
                        Err(Error::Bad { text, code })
                    } else {
                        Err(Error::No { text, code })
                    }
                }
            }
        };

        tracing::debug!(tag = %tag, kind = ?request.kind, ok = outcome.is_ok(), "command completed");
        request.resolve(outcome);
    }

    fn apply_completion(&mut self, request: &PendingRequest, code: Option<&ResponseCode>) {
        if let Some(ResponseCode::Capability(tokens)) = code {
            self.capabilities = CapabilitySet::from_tokens(tokens);
        }

        match request.kind {
            CommandKind::Select | CommandKind::Examine => {
                if let Some(mailbox) = self.mailbox.as_mut() {
                    match code {
                        Some(ResponseCode::ReadOnly) => mailbox.read_only = true,
                        Some(ResponseCode::ReadWrite) => mailbox.read_only = false,
                        _ => {}
                    }
                }
            }
            CommandKind::Close | CommandKind::Unselect => self.mailbox = None,
            CommandKind::Login | CommandKind::Authenticate => {
                self.state = SessionState::Authenticated;
                tracing::debug!("authenticated");
                if !matches!(code, Some(ResponseCode::Capability(_))) {
                    self.enqueue_internal("CAPABILITY", true);
                }
            }
            CommandKind::Logout => self.closing = true,
            _ => {}
        }
    }

    fn on_continuation(&mut self, text: String) {
        let Some(current) = self.current.as_mut() else {
            let error = Error::Protocol(format!("continuation with no command in flight: {text}"));
            tracing::warn!(%error, "unexpected continuation");
            self.handler.on_error(&error, false);
            return;
        };

        if current.kind == CommandKind::Idle {
            let send_done = self.idle.acknowledged(self.clock.now());
            tracing::debug!("IDLE active");
            self.handler.on_idle_started();
            if send_done {
                self.send_done();
            }
            return;
        }

        if let Some(segment) = current.segments.pop_front() {
            self.outbound.push_back(Transmit::line(&segment));
        } else if let Some(authenticator) = current.authenticator.as_mut() {
            match BASE64.decode(text.trim()) {
                Ok(challenge) => {
                    let response = BASE64.encode(authenticator.process(&challenge));
                    self.outbound.push_back(Transmit::line(response.as_bytes()));
                }
                Err(err) => {
                    let error = Error::Protocol(format!("invalid SASL challenge: {err}"));
                    tracing::warn!(%error, "cancelling AUTHENTICATE");
                    self.handler.on_error(&error, false);
                    current.error.get_or_insert(error);
                    self.outbound.push_back(Transmit::line(b"*"));
                }
            }
        } else if let Some(payload) = current.payload.take() {
            self.outbound.push_back(Transmit::line(&payload));
        } else if current.kind == CommandKind::Authenticate {
            // Empty response to a SASL challenge the caller did not answer.
            self.outbound.push_back(Transmit::line(b""));
        } else {
            let error = Error::Protocol(format!("unexpected continuation: {text}"));
            tracing::warn!(%error, kind = ?current.kind, "unexpected continuation");
            self.handler.on_error(&error, false);
            current.error.get_or_insert(error);
        }
    }

    fn on_untagged(&mut self, response: UntaggedResponse) {
        let response = match self.current.as_mut() {
            Some(current) => match current.accumulator.accept(response) {
                Ok(()) => return,
                Err(response) => response,
            },
            None => response,
        };

        match response {
            UntaggedResponse::Condition(condition) => self.on_condition(condition),
            UntaggedResponse::Capability(tokens) => {
                self.capabilities = CapabilitySet::from_tokens(tokens);
            }
            UntaggedResponse::Flags(flags) => self.mailbox_mut().flags = flags,
            UntaggedResponse::Exists(count) => self.on_exists(count),
            UntaggedResponse::Recent(count) => self.mailbox_mut().new = count,
            UntaggedResponse::Expunge(seq) => {
                self.mailbox_mut().apply_expunge();
                if !self.solicited() {
                    self.handler.on_expunge(seq);
                }
            }
            UntaggedResponse::Fetch(data) => self.handler.on_update(data.seq, data.attributes),
            other => tracing::debug!(response = ?other, "unsolicited response ignored"),
        }
    }

    /// Returns the mailbox state, creating an unnamed one for mailbox data
    /// that arrives before any SELECT.
    fn mailbox_mut(&mut self) -> &mut MailboxState {
        self.mailbox.get_or_insert_with(|| {
            tracing::debug!("mailbox data without a selected mailbox");
            MailboxState::new(String::new())
        })
    }

    fn on_exists(&mut self, count: u32) {
        let notify = self.state.is_authenticated() && !self.selecting();
        if let Some(added) = self.mailbox_mut().apply_exists(count) {
            if notify {
                self.handler.on_mail(added);
            }
        }
    }

    fn on_condition(&mut self, condition: Condition) {
        let Condition { status, code, text } = condition;

        if status == Status::Bye {
            let logging_out = self
                .current
                .as_ref()
                .is_some_and(|r| r.kind == CommandKind::Logout);
            self.closing = true;
            if !logging_out {
                let error = Error::Bye(text);
                tracing::warn!(%error, "server closing connection");
                self.handler.on_error(&error, true);
            }
            return;
        }

        if !self.greeted {
            self.on_greeting(status, code, &text);
            return;
        }

        if matches!(status, Status::No | Status::Bad) {
            tracing::warn!(status = ?status, text = %text, "server warning");
        }
        if let Some(code) = code {
            self.apply_code(code, &text);
        }
    }

    fn on_greeting(&mut self, status: Status, code: Option<ResponseCode>, text: &str) {
        match status {
            Status::Ok | Status::PreAuth => {
                self.greeted = true;
                self.state = if status == Status::PreAuth {
                    SessionState::Authenticated
                } else {
                    SessionState::Connected
                };
                tracing::debug!(state = ?self.state, "greeting received");
                match code {
                    Some(ResponseCode::Capability(tokens)) => {
                        self.capabilities = CapabilitySet::from_tokens(tokens);
                    }
                    Some(code) => {
                        self.apply_code(code, text);
                        self.enqueue_internal("CAPABILITY", true);
                    }
                    None => self.enqueue_internal("CAPABILITY", true),
                }
            }
            _ => {
                let error = Error::Protocol(format!("server refused connection: {text}"));
                tracing::error!(%error, "bad greeting");
                self.closing = true;
                self.handler.on_error(&error, true);
            }
        }
    }

    fn apply_code(&mut self, code: ResponseCode, text: &str) {
        let selecting = self.selecting();
        if let ResponseCode::Alert = code {
            tracing::warn!(text, "ALERT");
            self.handler.on_alert(text);
            return;
        }
        if let ResponseCode::Capability(tokens) = code {
            self.capabilities = CapabilitySet::from_tokens(tokens);
            return;
        }

        match code {
            ResponseCode::UidValidity(value) => {
                let mailbox = self.mailbox_mut();
                let changed = mailbox.uid_validity.is_some_and(|old| old != value);
                mailbox.uid_validity = Some(value);
                if changed && !selecting {
                    tracing::warn!(uid_validity = value, "UIDVALIDITY changed");
                    self.handler.on_uid_validity(value);
                }
            }
            ResponseCode::UidNext(value) => self.mailbox_mut().uid_next = Some(value),
            ResponseCode::Unseen(value) => self.mailbox_mut().unseen = u32::try_from(value).ok(),
            ResponseCode::HighestModSeq(value) => self.mailbox_mut().highest_modseq = Some(value),
            ResponseCode::PermanentFlags(raw) => self.mailbox_mut().apply_permanent_flags(&raw),
            ResponseCode::UidNotSticky => self.mailbox_mut().persistent_uids = false,
            ResponseCode::NoModSeq => self.mailbox_mut().no_modseq = true,
            ResponseCode::ReadOnly if selecting => self.mailbox_mut().read_only = true,
            ResponseCode::ReadWrite if selecting => self.mailbox_mut().read_only = false,
            _ => {}
        }
    }
}

impl<H: EventHandler> ResponseSink for Core<H> {
    fn on_response(&mut self, response: Response) {
        match response {
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => self.on_tagged(&tag, status, code, text),
            Response::Untagged(untagged) => self.on_untagged(untagged),
            Response::Continuation { text, .. } => self.on_continuation(text),
            Response::Unrecognized(line) => {
                tracing::warn!(line = %line, "unrecognized response");
                self.handler.on_unrecognized(&line);
            }
        }
    }

    fn on_body_start(&mut self, start: BodyStart) -> Box<dyn BodySink> {
        match self.current.as_mut().map(|r| &mut r.accumulator) {
            Some(Accumulator::Fetch(mux)) => mux.on_body_start(&start),
            _ => {
                tracing::debug!(seq = start.seq, section = %start.section, "body outside FETCH discarded");
                Box::new(DiscardSink)
            }
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
    use std::time::Duration;

    use super::*;
    use crate::handler::{CollectingHandler, Event};
    use crate::time::MockClock;

    fn engine(config: Config) -> (Engine<CollectingHandler>, Arc<MockClock>) {
        let clock = MockClock::shared();
        let mut engine = Engine::with_clock(config, CollectingHandler::new(), clock.clone());
        engine.connection_opened();
        (engine, clock)
    }

    fn quiet() -> Config {
        Config::builder().no_keepalive().build()
    }

    fn feed<H: EventHandler>(engine: &mut Engine<H>, data: &str) {
        engine.handle_input(data.as_bytes()).unwrap();
    }

    fn sent<H: EventHandler>(engine: &mut Engine<H>) -> String {
        let mut out = String::new();
        while let Some(transmit) = engine.poll_transmit() {
            out.push_str(transmit.as_str().unwrap());
        }
        out
    }

    /// Greets with capabilities and logs in.
    fn logged_in(config: Config, caps: &str) -> (Engine<CollectingHandler>, Arc<MockClock>) {
        let (mut engine, clock) = engine(config);
        feed(&mut engine, &format!("* OK [CAPABILITY {caps}] ready\r\n"));
        let _login = engine.enqueue(CommandRequest::new("LOGIN a b"));
        assert_eq!(sent(&mut engine), "A0000 LOGIN a b\r\n");
        feed(&mut engine, &format!("A0000 OK [CAPABILITY {caps}] logged in\r\n"));
        (engine, clock)
    }

    #[test]
    fn test_nothing_sent_before_greeting() {
        let (mut engine, _) = engine(quiet());
        let _noop = engine.enqueue(CommandRequest::new("CAPABILITY"));
        assert!(engine.poll_transmit().is_none());

        feed(&mut engine, "* OK [CAPABILITY IMAP4rev1] hi\r\n");
        assert_eq!(sent(&mut engine), "A0000 CAPABILITY\r\n");
        assert_eq!(engine.state(), SessionState::Connected);
    }

    #[test]
    fn test_greeting_without_capabilities_asks_for_them() {
        let (mut engine, _) = engine(quiet());
        feed(&mut engine, "* OK hello\r\n");
        assert_eq!(sent(&mut engine), "A0000 CAPABILITY\r\n");
        feed(&mut engine, "* CAPABILITY IMAP4rev1 IDLE\r\nA0000 OK done\r\n");
        assert!(engine.has_capability("idle"));
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_preauth_greeting() {
        let (mut engine, _) = engine(quiet());
        feed(&mut engine, "* PREAUTH [CAPABILITY IMAP4rev1] welcome back\r\n");
        assert!(engine.state().is_authenticated());
    }

    #[test]
    fn test_commands_pipeline_one_at_a_time() {
        let (mut engine, _) = engine(quiet());
        feed(&mut engine, "* OK [CAPABILITY IMAP4rev1] ready\r\n");
        let mut first = engine.enqueue(CommandRequest::new("NAMESPACE"));
        let mut second = engine.enqueue(CommandRequest::new("CHECK"));

        assert_eq!(sent(&mut engine), "A0000 NAMESPACE\r\n");
        assert_eq!(engine.queued(), 1);
        feed(&mut engine, "* NAMESPACE ((\"\" \"/\")) NIL NIL\r\nA0000 OK done\r\n");
        assert_eq!(sent(&mut engine), "A0001 CHECK\r\n");
        feed(&mut engine, "A0001 NO [UNAVAILABLE] busy\r\n");

        match first.completion.try_recv().unwrap().unwrap().data {
            CommandData::Namespace(ns) => assert_eq!(ns.personal.unwrap()[0].delimiter.as_deref(), Some("/")),
            other => panic!("expected namespace, got {other:?}"),
        }
        let error = second.completion.try_recv().unwrap().unwrap_err();
        assert!(matches!(error, Error::No { ref text, code: Some(ResponseCode::Unavailable) } if text == "busy"));
    }

    #[test]
    fn test_urgent_goes_first() {
        let (mut engine, _) = engine(quiet());
        let _a = engine.enqueue(CommandRequest::new("CHECK"));
        let _b = engine.enqueue_urgent(CommandRequest::new("NAMESPACE"));
        feed(&mut engine, "* OK [CAPABILITY IMAP4rev1] ready\r\n");
        assert_eq!(sent(&mut engine), "A0000 NAMESPACE\r\n");
    }

    #[test]
    fn test_login_without_capability_code_refreshes_capabilities() {
        let (mut engine, _) = engine(quiet());
        feed(&mut engine, "* OK [CAPABILITY IMAP4rev1] ready\r\n");
        let _login = engine.enqueue(CommandRequest::new("LOGIN a b"));
        let _list = engine.enqueue(CommandRequest::new("LIST \"\" *"));
        sent(&mut engine);
        feed(&mut engine, "A0000 OK logged in\r\n");
        assert_eq!(sent(&mut engine), "A0001 CAPABILITY\r\n");
    }

    #[test]
    fn test_select_builds_mailbox_state() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        let mut select = engine.enqueue(CommandRequest::new("SELECT INBOX"));
        assert_eq!(sent(&mut engine), "A0001 SELECT INBOX\r\n");
        feed(
            &mut engine,
            "* 172 EXISTS\r\n\
             * 1 RECENT\r\n\
             * OK [UNSEEN 12] first unseen\r\n\
             * OK [UIDVALIDITY 3857529045] UIDs valid\r\n\
             * OK [UIDNEXT 4392] next\r\n\
             * FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n\
             * OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n\
             A0001 OK [READ-WRITE] SELECT completed\r\n",
        );

        let completion = select.completion.try_recv().unwrap().unwrap();
        let CommandData::Select(mailbox) = completion.data else {
            panic!("expected select data");
        };
        assert_eq!(mailbox.name, "INBOX");
        assert_eq!(mailbox.total, 172);
        assert_eq!(mailbox.new, 1);
        assert_eq!(mailbox.unseen, Some(12));
        assert_eq!(mailbox.uid_validity, Some(3857529045));
        assert_eq!(mailbox.uid_next, Some(4392));
        assert_eq!(mailbox.flags.len(), 5);
        assert_eq!(mailbox.permanent_flags, ["Deleted", "Seen"]);
        assert!(mailbox.allows_new_keywords);
        assert!(!mailbox.read_only);
        assert_eq!(engine.mailbox(), Some(&mailbox));

        // No new-mail notification for the SELECT's own EXISTS.
        assert!(engine.handler().events.is_empty());
    }

    #[test]
    fn test_examine_is_read_only_and_failed_select_clears() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        let _examine = engine.enqueue(CommandRequest::new("EXAMINE Archive"));
        sent(&mut engine);
        feed(&mut engine, "A0001 OK [READ-ONLY] done\r\n");
        assert!(engine.mailbox().unwrap().read_only);

        let mut select = engine.enqueue(CommandRequest::new("SELECT Missing"));
        sent(&mut engine);
        feed(&mut engine, "A0002 NO [NONEXISTENT] no such mailbox\r\n");
        assert!(engine.mailbox().is_none());
        assert!(select.completion.try_recv().unwrap().is_err());
    }

    #[test]
    fn test_exists_notifies_new_mail() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        let _select = engine.enqueue(CommandRequest::new("SELECT INBOX"));
        sent(&mut engine);
        feed(&mut engine, "* 5 EXISTS\r\nA0001 OK done\r\n");
        feed(&mut engine, "* 7 EXISTS\r\n* 7 EXISTS\r\n");
        assert_eq!(engine.handler().events, [Event::Mail(2)]);
        assert_eq!(engine.mailbox().unwrap().total, 7);
    }

    #[test]
    fn test_expunge_notifies_only_when_idle() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        let _select = engine.enqueue(CommandRequest::new("SELECT INBOX"));
        sent(&mut engine);
        feed(&mut engine, "* 5 EXISTS\r\nA0001 OK done\r\n");

        feed(&mut engine, "* 3 EXPUNGE\r\n");
        assert_eq!(engine.mailbox().unwrap().total, 4);
        assert_eq!(engine.handler_mut().take(), [Event::Expunge(3)]);

        let _expunge = engine.enqueue(CommandRequest::new("EXPUNGE"));
        sent(&mut engine);
        feed(&mut engine, "* 1 EXPUNGE\r\nA0002 OK done\r\n");
        assert_eq!(engine.mailbox().unwrap().total, 3);
        assert!(engine.handler().events.is_empty());
    }

    #[test]
    fn test_expunge_never_below_zero() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        let _select = engine.enqueue(CommandRequest::new("SELECT INBOX"));
        sent(&mut engine);
        feed(&mut engine, "* 0 EXISTS\r\nA0001 OK done\r\n* 1 EXPUNGE\r\n");
        assert_eq!(engine.mailbox().unwrap().total, 0);
    }

    #[test]
    fn test_uid_validity_change_notifies() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        let _select = engine.enqueue(CommandRequest::new("SELECT INBOX"));
        sent(&mut engine);
        feed(&mut engine, "* OK [UIDVALIDITY 1] ok\r\nA0001 OK done\r\n");
        feed(&mut engine, "* OK [UIDVALIDITY 2] reset\r\n");
        assert_eq!(engine.handler().events, [Event::UidValidity(2)]);
    }

    #[test]
    fn test_alert_and_unsolicited_fetch() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        feed(&mut engine, "* OK [ALERT] Maintenance at noon\r\n* 4 FETCH (FLAGS (\\Seen))\r\n");
        let events = engine.handler_mut().take();
        assert_eq!(events[0], Event::Alert("Maintenance at noon".to_string()));
        let Event::Update(4, attributes) = &events[1] else {
            panic!("expected update, got {:?}", events[1]);
        };
        assert_eq!(attributes.flags().unwrap(), ["\\Seen"]);
    }

    #[test]
    fn test_synchronizing_literal_segments() {
        let (mut engine, _) = engine(quiet());
        feed(&mut engine, "* OK [CAPABILITY IMAP4rev1] ready\r\n");
        let mut login = engine.enqueue(CommandRequest::new("LOGIN {4}\r\nuser {4}\r\npass"));
        assert_eq!(sent(&mut engine), "A0000 LOGIN {4}\r\n");
        feed(&mut engine, "+ go ahead\r\n");
        assert_eq!(sent(&mut engine), "user {4}\r\n");
        feed(&mut engine, "+ go ahead\r\n");
        assert_eq!(sent(&mut engine), "pass\r\n");
        feed(&mut engine, "A0000 OK [CAPABILITY IMAP4rev1] ok\r\n");
        assert!(login.completion.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_append_payload_after_continuation() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        let mut append = engine.enqueue(CommandRequest::new("APPEND INBOX (\\Seen) {11}"));
        assert!(engine.attach_payload(append.id, "Hello world"));
        assert_eq!(sent(&mut engine), "A0001 APPEND INBOX (\\Seen) {11}\r\n");
        assert!(!engine.attach_payload(append.id, "late"));

        feed(&mut engine, "+ Ready for literal data\r\n");
        assert_eq!(sent(&mut engine), "Hello world\r\n");
        feed(&mut engine, "A0001 OK [APPENDUID 38505 3955] APPEND completed\r\n");

        let completion = append.completion.try_recv().unwrap().unwrap();
        assert!(matches!(completion.code, Some(ResponseCode::AppendUid { uid_validity: 38505, .. })));
    }

    #[test]
    fn test_literal_plus_payload_sent_immediately() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1 LITERAL+");
        let append = engine.enqueue(CommandRequest::new("APPEND INBOX {2+}"));
        engine.attach_payload(append.id, "hi");
        assert_eq!(sent(&mut engine), "A0001 APPEND INBOX {2+}\r\nhi\r\n");
    }

    #[test]
    fn test_unexpected_continuation_fails_command() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        let mut noop = engine.enqueue(CommandRequest::new("CHECK"));
        sent(&mut engine);
        feed(&mut engine, "+ what?\r\nA0001 OK done\r\n");
        let error = noop.completion.try_recv().unwrap().unwrap_err();
        assert!(matches!(error, Error::Protocol(_)));
        assert!(matches!(engine.handler().events[0], Event::Error { fatal: false, .. }));
    }

    #[test]
    fn test_continuation_without_command_is_reported() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        feed(&mut engine, "+ stray\r\n");
        assert!(matches!(engine.handler().events[0], Event::Error { fatal: false, .. }));
    }

    #[test]
    fn test_authenticate_empty_response() {
        let (mut engine, _) = engine(quiet());
        feed(&mut engine, "* OK [CAPABILITY IMAP4rev1 AUTH=XOAUTH2] ready\r\n");
        let mut auth = engine.enqueue(CommandRequest::new("AUTHENTICATE XOAUTH2 dG9rZW4="));
        sent(&mut engine);
        feed(&mut engine, "+ eyJzdGF0dXMiOiI0MDEifQ==\r\n");
        assert_eq!(sent(&mut engine), "\r\n");
        feed(&mut engine, "A0000 NO [AUTHENTICATIONFAILED] invalid\r\n");
        assert!(matches!(
            auth.completion.try_recv().unwrap(),
            Err(Error::No { code: Some(ResponseCode::AuthenticationFailed), .. })
        ));
        assert!(!engine.state().is_authenticated());
    }

    #[test]
    fn test_authenticator_answers_challenges() {
        let (mut engine, _) = engine(quiet());
        feed(&mut engine, "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n");
        let mut challenges = Vec::new();
        let request = CommandRequest::new("AUTHENTICATE PLAIN").with_authenticator(
            move |challenge: &[u8]| {
                challenges.push(challenge.to_vec());
                assert_eq!(challenges, [b"nonce".to_vec()]);
                b"\0user\0pass".to_vec()
            },
        );
        let mut auth = engine.enqueue(request);
        assert_eq!(sent(&mut engine), "A0000 AUTHENTICATE PLAIN\r\n");

        feed(&mut engine, "+ bm9uY2U=\r\n");
        assert_eq!(sent(&mut engine), "AHVzZXIAcGFzcw==\r\n");
        feed(&mut engine, "A0000 OK [CAPABILITY IMAP4rev1 IDLE] welcome\r\n");
        assert!(auth.completion.try_recv().unwrap().is_ok());
        assert!(engine.state().is_authenticated());
    }

    #[test]
    fn test_undecodable_challenge_cancels_authenticate() {
        let (mut engine, _) = engine(quiet());
        feed(&mut engine, "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n");
        let request = CommandRequest::new("AUTHENTICATE PLAIN")
            .with_authenticator(|_: &[u8]| b"unused".to_vec());
        let mut auth = engine.enqueue(request);
        sent(&mut engine);

        feed(&mut engine, "+ not base64!\r\n");
        assert_eq!(sent(&mut engine), "*\r\n");
        feed(&mut engine, "A0000 BAD exchange cancelled\r\n");
        assert!(matches!(auth.completion.try_recv().unwrap(), Err(Error::Protocol(_))));
        assert!(matches!(engine.handler().events[0], Event::Error { fatal: false, .. }));
    }

    #[test]
    fn test_unknown_tag_ignored() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        let mut check = engine.enqueue(CommandRequest::new("CHECK"));
        sent(&mut engine);
        feed(&mut engine, "A0999 OK stray\r\n");
        assert!(check.completion.try_recv().is_err());
        assert!(engine.is_busy());
    }

    #[test]
    fn test_unrecognized_line_passthrough() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        feed(&mut engine, "garbage from a proxy\r\n");
        assert_eq!(
            engine.handler().events,
            [Event::Unrecognized("garbage from a proxy".to_string())]
        );
    }

    #[test]
    fn test_auto_idle_and_interrupt() {
        let (mut engine, _) = logged_in(Config::new(), "IMAP4rev1 IDLE");
        assert_eq!(sent(&mut engine), "IDLE IDLE\r\n");
        assert_eq!(engine.idle_state(), IdleState::AwaitingAck);
        feed(&mut engine, "+ idling\r\n");
        assert!(engine.is_idle());

        let mut status = engine.enqueue(CommandRequest::new("STATUS INBOX (MESSAGES)"));
        assert_eq!(sent(&mut engine), "DONE\r\n");
        feed(&mut engine, "IDLE OK IDLE terminated\r\n");
        assert_eq!(engine.idle_state(), IdleState::Idle);
        assert_eq!(sent(&mut engine), "A0001 STATUS INBOX (MESSAGES)\r\n");
        feed(&mut engine, "* STATUS INBOX (MESSAGES 3)\r\nA0001 OK done\r\n");
        assert!(status.completion.try_recv().unwrap().is_ok());

        // Queue empty again: back to IDLE.
        assert_eq!(sent(&mut engine), "IDLE IDLE\r\n");
        assert_eq!(engine.handler().events, [Event::IdleStarted]);
    }

    #[test]
    fn test_cancel_before_idle_ack() {
        let (mut engine, _) = logged_in(Config::new(), "IMAP4rev1 IDLE");
        sent(&mut engine);
        let _check = engine.enqueue(CommandRequest::new("CHECK"));
        assert_eq!(sent(&mut engine), "");
        feed(&mut engine, "+ idling\r\n");
        assert_eq!(sent(&mut engine), "DONE\r\n");
        feed(&mut engine, "IDLE OK done\r\n");
        assert_eq!(sent(&mut engine), "A0001 CHECK\r\n");
    }

    #[test]
    fn test_idle_refresh() {
        let config = Config::builder()
            .keepalive_interval(Duration::from_secs(10))
            .idle_interval(Duration::from_secs(60))
            .build();
        let (mut engine, clock) = logged_in(config, "IMAP4rev1 IDLE");
        sent(&mut engine);
        feed(&mut engine, "+ idling\r\n");

        clock.advance(Duration::from_secs(30));
        engine.handle_timeout();
        assert_eq!(sent(&mut engine), "");

        clock.advance(Duration::from_secs(35));
        engine.handle_timeout();
        assert_eq!(sent(&mut engine), "DONE\r\n");
        feed(&mut engine, "IDLE OK done\r\n");
        assert_eq!(sent(&mut engine), "IDLE IDLE\r\n");
        feed(&mut engine, "+ idling\r\n");

        assert_eq!(engine.handler().events, [Event::IdleStarted, Event::IdleStarted]);
    }

    #[test]
    fn test_noop_keepalive_without_idle() {
        let config = Config::builder().keepalive_interval(Duration::from_secs(10)).build();
        let (mut engine, clock) = logged_in(config, "IMAP4rev1");
        assert_eq!(sent(&mut engine), "");

        engine.handle_timeout();
        assert_eq!(sent(&mut engine), "");
        clock.advance(Duration::from_secs(10));
        engine.handle_timeout();
        assert_eq!(sent(&mut engine), "NOOP NOOP\r\n");

        // Timer firing mid-command is a no-op.
        clock.advance(Duration::from_secs(10));
        engine.handle_timeout();
        assert_eq!(sent(&mut engine), "");
        feed(&mut engine, "NOOP OK done\r\n");
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_force_noop_skips_idle() {
        let config = Config::builder().force_noop(true).build();
        let (mut engine, _) = logged_in(config, "IMAP4rev1 IDLE");
        assert_eq!(sent(&mut engine), "");
    }

    #[test]
    fn test_refused_idle_waits_for_keepalive() {
        let config = Config::builder().keepalive_interval(Duration::from_secs(10)).build();
        let (mut engine, clock) = logged_in(config, "IMAP4rev1 IDLE");

        for _ in 0..3 {
            assert_eq!(sent(&mut engine), "IDLE IDLE\r\n");
            feed(&mut engine, "IDLE NO IDLE not allowed now\r\n");
            assert_eq!(engine.idle_state(), IdleState::Idle);
            // Nothing is retried until the timer fires.
            assert_eq!(sent(&mut engine), "");
            assert_eq!(sent(&mut engine), "");

            clock.advance(Duration::from_secs(10));
            engine.handle_timeout();
        }

        // A queued command still goes out while IDLE is refused.
        assert_eq!(sent(&mut engine), "IDLE IDLE\r\n");
        feed(&mut engine, "IDLE BAD no\r\n");
        let _check = engine.enqueue(CommandRequest::new("CHECK"));
        assert_eq!(sent(&mut engine), "A0001 CHECK\r\n");
        feed(&mut engine, "A0001 OK done\r\n");
        assert_eq!(sent(&mut engine), "");
    }

    #[test]
    fn test_mailbox_data_before_select_creates_state() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        assert!(engine.mailbox().is_none());
        feed(&mut engine, "* 4 EXISTS\r\n* FLAGS (\\Seen)\r\n* OK [UIDNEXT 9] next\r\n");

        let mailbox = engine.mailbox().unwrap();
        assert_eq!(mailbox.name, "");
        assert_eq!(mailbox.total, 4);
        assert_eq!(mailbox.new, 4);
        assert_eq!(mailbox.flags, ["\\Seen"]);
        assert_eq!(mailbox.uid_next, Some(9));
        assert_eq!(engine.handler().events, [Event::Mail(4)]);
    }

    #[test]
    fn test_connection_closed_fails_everything() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        let mut first = engine.enqueue(CommandRequest::new("CHECK"));
        let mut second = engine.enqueue(CommandRequest::new("NOOP"));
        sent(&mut engine);

        engine.connection_closed(None);
        assert!(matches!(first.completion.try_recv().unwrap(), Err(Error::ConnectionClosed)));
        assert!(matches!(second.completion.try_recv().unwrap(), Err(Error::ConnectionClosed)));
        assert_eq!(engine.state(), SessionState::Disconnected);
        assert_eq!(engine.handler().events, [Event::Closed]);

        let mut late = engine.enqueue(CommandRequest::new("NOOP"));
        assert!(matches!(late.completion.try_recv().unwrap(), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_logout() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        let mut logout = engine.enqueue(CommandRequest::new("LOGOUT"));
        sent(&mut engine);
        feed(&mut engine, "* BYE see you\r\n");
        assert!(!engine.wants_close());
        feed(&mut engine, "A0001 OK LOGOUT completed\r\n");
        assert!(engine.wants_close());
        assert!(logout.completion.try_recv().unwrap().is_ok());
        assert!(engine.handler().events.is_empty());
    }

    #[test]
    fn test_unsolicited_bye_is_fatal() {
        let (mut engine, _) = logged_in(quiet(), "IMAP4rev1");
        feed(&mut engine, "* BYE idle timeout\r\n");
        assert!(engine.wants_close());
        assert!(matches!(engine.handler().events[0], Event::Error { fatal: true, .. }));
        let _check = engine.enqueue(CommandRequest::new("CHECK"));
        assert_eq!(sent(&mut engine), "");
    }

    #[test]
    fn test_rejected_greeting() {
        let (mut engine, _) = engine(quiet());
        feed(&mut engine, "* NO go away\r\n");
        assert!(engine.wants_close());
        assert!(matches!(engine.handler().events[0], Event::Error { fatal: true, .. }));
    }
}
