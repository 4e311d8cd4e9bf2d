//! Channel state machine.
//!
//! The driver owns the transport, session and attestation handler, and
//! consumes one event queue. Writes from [`SecureChannel`] handles and
//! replies from the transport both arrive as [`Event`]s, so every state
//! transition happens on a single logical thread of control and a transport
//! that completes synchronously inside `send` cannot re-enter the machine.
//!
//! [`SecureChannel`]: super::SecureChannel

use std::collections::VecDeque;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use crate::core::{
    AttestResponse, AttestationHandler, EncryptedMessage, ErrorCode, HandshakeResponse, Request,
    Response, SecureSession, SessionRequest, SessionResponse, Transport, TransportResult,
};

/// Lifecycle of a channel.
///
/// Transitions only move forward; `PermanentFailure` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// No request has been written yet.
    Uninitialized,
    /// Waiting for the peer's attestation response.
    PerformingAttestation,
    /// Waiting for the peer's handshake response.
    PerformingHandshake,
    /// Traffic keys are available; requests are being exchanged.
    Established,
    /// A failure occurred; every further write fails immediately.
    PermanentFailure,
}

pub(crate) type Completion = Box<dyn FnOnce(Result<Response, ErrorCode>) + Send + 'static>;

/// A queued application request and the caller waiting on it.
pub(crate) struct PendingRequest {
    request: Request,
    completion: Completion,
}

impl PendingRequest {
    pub(crate) fn new(request: Request, completion: Completion) -> Self {
        Self {
            request,
            completion,
        }
    }

    pub(crate) fn complete(self, result: Result<Response, ErrorCode>) {
        (self.completion)(result)
    }
}

/// Input to the driver.
pub(crate) enum Event {
    /// A caller wrote a request.
    Write(PendingRequest),
    /// The transport answered send number `sequence`.
    Reply {
        sequence: u64,
        reply: TransportResult,
    },
}

/// Owns the collaborators and runs the channel state machine.
///
/// Created by [`SecureChannel::new`](super::SecureChannel::new). Either
/// `await` [`run`](Self::run) on a tokio runtime, or call
/// [`run_until_idle`](Self::run_until_idle) from your own event loop.
///
/// Dropping the driver resolves every outstanding write with
/// [`ErrorCode::Cancelled`].
pub struct ChannelDriver<T, S, A> {
    transport: T,
    session: S,
    attestation: A,

    state: ChannelState,
    queue: VecDeque<PendingRequest>,
    /// Sequence number of the send whose reply is awaited, if any.
    outstanding: Option<u64>,
    next_sequence: u64,

    events: mpsc::UnboundedReceiver<Event>,
    events_tx: mpsc::UnboundedSender<Event>,
    state_tx: watch::Sender<ChannelState>,
}

impl<T, S, A> ChannelDriver<T, S, A>
where
    T: Transport,
    S: SecureSession,
    A: AttestationHandler,
{
    pub(crate) fn new(
        transport: T,
        session: S,
        attestation: A,
        events: mpsc::UnboundedReceiver<Event>,
        events_tx: mpsc::UnboundedSender<Event>,
        state_tx: watch::Sender<ChannelState>,
    ) -> Self {
        Self {
            transport,
            session,
            attestation,
            state: ChannelState::Uninitialized,
            queue: VecDeque::new(),
            outstanding: None,
            next_sequence: 0,
            events,
            events_tx,
            state_tx,
        }
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Number of requests accepted but not yet resolved.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether a transport send is awaiting its reply.
    pub fn is_in_flight(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Process events until every [`SecureChannel`](super::SecureChannel)
    /// handle is dropped and no transport reply is outstanding.
    pub async fn run(mut self) {
        debug!("channel driver started");
        loop {
            tokio::select! {
                biased;
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = self.state_tx.closed(), if self.outstanding.is_none() => break,
            }
        }
        debug!(state = ?self.state, "channel driver stopped");
    }

    /// Process every event already queued, without waiting.
    ///
    /// Events produced while processing (for example by a transport that
    /// replies synchronously) are handled too. Returns the number of events
    /// processed.
    pub fn run_until_idle(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            processed += 1;
        }
        processed
    }

    pub(crate) fn handle_event(&mut self, event: Event) {
        match event {
            Event::Write(pending) => self.on_write(pending),
            Event::Reply { sequence, reply } => self.on_reply(sequence, reply),
        }
    }

    fn on_write(&mut self, pending: PendingRequest) {
        match self.state {
            ChannelState::PermanentFailure => {
                debug!("write rejected, channel has failed");
                pending.complete(Err(ErrorCode::GenericError));
            }
            ChannelState::Uninitialized => {
                self.queue.push_back(pending);
                self.start_attestation();
            }
            ChannelState::PerformingAttestation | ChannelState::PerformingHandshake => {
                self.queue.push_back(pending);
            }
            ChannelState::Established => {
                self.queue.push_back(pending);
                self.dispatch_next();
            }
        }
    }

    fn on_reply(&mut self, sequence: u64, reply: TransportResult) {
        if self.outstanding != Some(sequence) {
            warn!(sequence, outstanding = ?self.outstanding, "ignoring stale transport reply");
            return;
        }
        self.outstanding = None;

        let response = match reply {
            Ok(response) => response,
            Err(err) => {
                let code = self.phase_error();
                error!(state = ?self.state, error = %err, "transport failed");
                self.fail_all(code);
                return;
            }
        };

        match (self.state, response) {
            (ChannelState::PerformingAttestation, SessionResponse::Attest(response)) => {
                self.on_attestation(response)
            }
            (ChannelState::PerformingHandshake, SessionResponse::Handshake(response)) => {
                self.on_handshake(response)
            }
            (ChannelState::Established, SessionResponse::Encrypted(message)) => {
                self.on_encrypted(message)
            }
            (state, response) => {
                warn!(?state, kind = response.kind(), "unexpected reply");
                let code = self.phase_error();
                self.fail_all(code);
            }
        }
    }

    fn start_attestation(&mut self) {
        match self.attestation.attestation_request() {
            Some(request) => {
                self.set_state(ChannelState::PerformingAttestation);
                self.send(SessionRequest::Attest(request));
            }
            None => {
                error!("no attestation request available");
                self.fail_all(ErrorCode::AttestationFailed);
            }
        }
    }

    fn on_attestation(&mut self, response: AttestResponse) {
        if !self.attestation.verify_attestation_response(&response) {
            error!("attestation rejected");
            self.fail_all(ErrorCode::AttestationFailed);
            return;
        }

        match self.session.handshake_message() {
            Ok(request) => {
                self.set_state(ChannelState::PerformingHandshake);
                self.send(SessionRequest::Handshake(request));
            }
            Err(e) => {
                error!(error = %e, "no handshake message available");
                self.fail_all(ErrorCode::HandshakeFailed);
            }
        }
    }

    fn on_handshake(&mut self, response: HandshakeResponse) {
        if let Err(e) = self.session.process_handshake_response(&response) {
            error!(error = %e, "handshake failed");
            self.fail_all(ErrorCode::HandshakeFailed);
            return;
        }
        self.set_state(ChannelState::Established);
        self.dispatch_next();
    }

    fn on_encrypted(&mut self, message: EncryptedMessage) {
        match self.session.decrypt(&message) {
            Ok(plaintext) => {
                match self.queue.pop_front() {
                    Some(pending) => pending.complete(Ok(plaintext)),
                    None => warn!("encrypted reply with no queued request"),
                }
                self.dispatch_next();
            }
            Err(e) => {
                // The session is no longer trusted for anything still queued.
                error!(error = %e, queued = self.queue.len(), "decryption failed");
                self.fail_all(ErrorCode::DecryptionFailed);
            }
        }
    }

    fn dispatch_next(&mut self) {
        if self.state != ChannelState::Established || self.outstanding.is_some() {
            return;
        }
        let Some(head) = self.queue.front() else {
            return;
        };

        match self.session.encrypt(&head.request) {
            Ok(message) => self.send(SessionRequest::Encrypted(message)),
            Err(e) => {
                error!(error = %e, "encryption failed");
                self.fail_all(ErrorCode::EncryptionFailed);
            }
        }
    }

    fn send(&mut self, request: SessionRequest) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.outstanding = Some(sequence);

        debug!(kind = request.kind(), sequence, "sending");
        let events = self.events_tx.downgrade();
        self.transport.send(
            request,
            Box::new(move |reply| {
                if let Some(events) = events.upgrade() {
                    let _ = events.send(Event::Reply { sequence, reply });
                }
            }),
        );
    }

    fn phase_error(&self) -> ErrorCode {
        match self.state {
            ChannelState::PerformingAttestation => ErrorCode::AttestationFailed,
            ChannelState::PerformingHandshake => ErrorCode::HandshakeFailed,
            ChannelState::Established => ErrorCode::NetworkError,
            ChannelState::Uninitialized | ChannelState::PermanentFailure => ErrorCode::GenericError,
        }
    }

    fn fail_all(&mut self, code: ErrorCode) {
        self.set_state(ChannelState::PermanentFailure);
        self.outstanding = None;
        for pending in self.queue.drain(..) {
            pending.complete(Err(code));
        }
    }

    fn set_state(&mut self, state: ChannelState) {
        debug!(from = ?self.state, to = ?state, "channel state");
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

impl<T, S, A> Drop for ChannelDriver<T, S, A> {
    fn drop(&mut self) {
        let mut cancelled = 0;
        for pending in self.queue.drain(..) {
            pending.complete(Err(ErrorCode::Cancelled));
            cancelled += 1;
        }
        self.events.close();
        while let Ok(event) = self.events.try_recv() {
            if let Event::Write(pending) = event {
                pending.complete(Err(ErrorCode::Cancelled));
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(cancelled, "channel driver dropped with pending requests");
        }
    }
}

impl<T, S, A> std::fmt::Debug for ChannelDriver<T, S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelDriver")
            .field("state", &self.state)
            .field("queued", &self.queue.len())
            .field("outstanding", &self.outstanding)
            .finish_non_exhaustive()
    }
}
