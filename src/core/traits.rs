//! Collaborator traits for the secure channel.
//!
//! The channel owns one of each and drives them from a single logical thread
//! of control. Fakes implementing these traits are how the channel is tested.

use super::error::{CryptoError, TransportError};
use super::message::{
    AttestRequest, AttestResponse, EncryptedMessage, HandshakeRequest, HandshakeResponse, Response,
    SessionRequest, SessionResponse,
};

/// Outcome of one transport exchange.
pub type TransportResult = Result<SessionResponse, TransportError>;

/// Completion callback handed to [`Transport::send`].
pub type ResponseCallback = Box<dyn FnOnce(TransportResult) + Send + 'static>;

/// Sends one session message at a time and delivers exactly one reply.
///
/// # Contract
///
/// - `callback` MUST be invoked exactly once, either synchronously from
///   inside `send` or later from any thread.
/// - The caller never issues a second `send` before the previous callback
///   has fired.
/// - Timeouts, if any, are enforced here and reported as
///   [`TransportError::Error`].
pub trait Transport: Send + 'static {
    /// Send `request` and report the reply through `callback`.
    fn send(&mut self, request: SessionRequest, callback: ResponseCallback);
}

/// Produces attestation requests and judges the peer's evidence.
pub trait AttestationHandler: Send + 'static {
    /// Build the attestation request, or `None` if none can be produced.
    fn attestation_request(&mut self) -> Option<AttestRequest>;

    /// Return `true` if the peer's evidence is acceptable.
    fn verify_attestation_response(&mut self, response: &AttestResponse) -> bool;
}

/// The cryptographic half of the channel: one handshake, then AEAD.
///
/// # Requirements
///
/// - `handshake_message` is called at most once per instance.
/// - `encrypt`/`decrypt` are valid only after one successful
///   `process_handshake_response`.
/// - After any failure the session is unusable.
pub trait SecureSession: Send + 'static {
    /// Start the handshake and return the initiator's message.
    fn handshake_message(&mut self) -> Result<HandshakeRequest, CryptoError>;

    /// Complete the handshake with the responder's message.
    fn process_handshake_response(&mut self, response: &HandshakeResponse)
    -> Result<(), CryptoError>;

    /// Encrypt an application request.
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<EncryptedMessage, CryptoError>;

    /// Decrypt an application response.
    fn decrypt(&mut self, message: &EncryptedMessage) -> Result<Response, CryptoError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, request: SessionRequest, callback: ResponseCallback) {
        (**self).send(request, callback)
    }
}

impl<A: AttestationHandler + ?Sized> AttestationHandler for Box<A> {
    fn attestation_request(&mut self) -> Option<AttestRequest> {
        (**self).attestation_request()
    }

    fn verify_attestation_response(&mut self, response: &AttestResponse) -> bool {
        (**self).verify_attestation_response(response)
    }
}

impl<S: SecureSession + ?Sized> SecureSession for Box<S> {
    fn handshake_message(&mut self) -> Result<HandshakeRequest, CryptoError> {
        (**self).handshake_message()
    }

    fn process_handshake_response(
        &mut self,
        response: &HandshakeResponse,
    ) -> Result<(), CryptoError> {
        (**self).process_handshake_response(response)
    }

    fn encrypt(&mut self, plaintext: &[u8]) -> Result<EncryptedMessage, CryptoError> {
        (**self).encrypt(plaintext)
    }

    fn decrypt(&mut self, message: &EncryptedMessage) -> Result<Response, CryptoError> {
        (**self).decrypt(message)
    }
}
