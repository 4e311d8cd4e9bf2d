//! Responder-side session.
//!
//! Handles one client connection:
//! - Answering attestation with the service's evidence
//! - The responder half of the Noise_NN handshake
//! - Decrypting requests, invoking the handler, encrypting replies

use tracing::{debug, warn};

use crate::core::{
    AttestResponse, CryptoError, EncryptedMessage, Error, HandshakeResponse, Request, Response,
    SessionRequest, SessionResponse,
};
use crate::crypto::{Crypter, ResponderHandshake, Role};

/// Application logic behind a server session.
pub trait RequestHandler: Send + 'static {
    /// Produce the response to one decrypted request.
    fn handle(&mut self, request: Request) -> Response;
}

impl<F> RequestHandler for F
where
    F: FnMut(Request) -> Response + Send + 'static,
{
    fn handle(&mut self, request: Request) -> Response {
        self(request)
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the client's attestation request.
    AwaitingAttestation,
    /// Waiting for the client's handshake request.
    AwaitingHandshake,
    /// Traffic keys derived; serving encrypted requests.
    Established,
    /// A protocol error occurred; no further messages are accepted.
    Closed,
}

impl SessionState {
    fn describe(self) -> &'static str {
        match self {
            Self::AwaitingAttestation => "awaiting attestation",
            Self::AwaitingHandshake => "awaiting handshake",
            Self::Established => "established",
            Self::Closed => "closed",
        }
    }
}

/// Per-client session.
pub struct ServerSession<H> {
    state: SessionState,
    evidence: Vec<u8>,
    crypter: Option<Crypter>,
    handler: H,
    requests_served: u64,
}

impl<H: RequestHandler> ServerSession<H> {
    /// Create a session that presents empty attestation evidence.
    pub fn new(handler: H) -> Self {
        Self::with_evidence(Vec::new(), handler)
    }

    /// Create a session that presents `evidence` during attestation.
    pub fn with_evidence(evidence: Vec<u8>, handler: H) -> Self {
        Self {
            state: SessionState::AwaitingAttestation,
            evidence,
            crypter: None,
            handler,
            requests_served: 0,
        }
    }

    /// Get the session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of application requests answered.
    pub fn requests_served(&self) -> u64 {
        self.requests_served
    }

    /// Process one client message.
    ///
    /// Any error closes the session.
    pub fn handle_request(&mut self, request: SessionRequest) -> Result<SessionResponse, Error> {
        let result = self.dispatch(request);
        if let Err(e) = &result {
            warn!(state = ?self.state, error = %e, "closing session");
            self.state = SessionState::Closed;
            self.crypter = None;
        }
        result
    }

    fn dispatch(&mut self, request: SessionRequest) -> Result<SessionResponse, Error> {
        match (self.state, request) {
            (SessionState::AwaitingAttestation, SessionRequest::Attest(_)) => {
                debug!("attestation requested");
                self.state = SessionState::AwaitingHandshake;
                Ok(SessionResponse::Attest(AttestResponse {
                    evidence: self.evidence.clone(),
                }))
            }
            (SessionState::AwaitingHandshake, SessionRequest::Handshake(request)) => {
                let (message, keys) =
                    ResponderHandshake::respond(&request.noise_handshake_message)?;
                self.crypter = Some(Crypter::new(keys, Role::Responder));
                self.state = SessionState::Established;
                debug!("session established");
                Ok(SessionResponse::Handshake(HandshakeResponse {
                    noise_handshake_message: message,
                }))
            }
            (SessionState::Established, SessionRequest::Encrypted(message)) => {
                let crypter = self.crypter.as_mut().ok_or(CryptoError::NotEstablished)?;
                let request = crypter.decrypt(&message.ciphertext)?;
                let response = self.handler.handle(request);
                let ciphertext = crypter.encrypt(&response)?;
                self.requests_served += 1;
                Ok(SessionResponse::Encrypted(EncryptedMessage { ciphertext }))
            }
            (state, request) => Err(Error::UnexpectedMessage {
                expected: state.describe(),
                actual: request.kind(),
            }),
        }
    }
}

impl<H> std::fmt::Debug for ServerSession<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("state", &self.state)
            .field("requests_served", &self.requests_served)
            .finish_non_exhaustive()
    }
}
