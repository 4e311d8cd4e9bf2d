//! Error types for the attested channel.

use thiserror::Error;

use crate::transport::FrameError;

/// Error kinds surfaced to callers of [`SecureChannel::write`].
///
/// Any failure during establishment, and any decryption failure, is reported
/// to every queued caller with the same code.
///
/// [`SecureChannel::write`]: crate::channel::SecureChannel::write
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No attestation request could be produced, the peer's evidence was
    /// rejected, or the transport failed during attestation.
    #[error("attestation failed")]
    AttestationFailed,

    /// The Noise handshake could not be started or completed.
    #[error("handshake failed")]
    HandshakeFailed,

    /// A request could not be encrypted.
    #[error("encryption failed")]
    EncryptionFailed,

    /// A response could not be decrypted or authenticated.
    #[error("decryption failed")]
    DecryptionFailed,

    /// The transport failed after the session was established.
    #[error("network error")]
    NetworkError,

    /// The channel is in permanent failure and accepts no more requests.
    #[error("channel failed permanently")]
    GenericError,

    /// The channel was torn down before the request resolved.
    #[error("channel shut down")]
    Cancelled,
}

/// Failures a [`Transport`](crate::core::Transport) reports instead of a reply.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportError {
    /// The underlying connection is gone.
    #[error("socket closed")]
    SocketClosed,

    /// The outgoing message could not be encoded.
    #[error("serialization error")]
    SerializationError,

    /// The reply could not be decoded.
    #[error("deserialization error")]
    DeserializationError,

    /// Any other transport failure (including timeouts).
    #[error("transport error")]
    Error,
}

/// Errors in the crypto layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A handshake message was already produced by this session.
    #[error("handshake already started")]
    HandshakeAlreadyStarted,

    /// A handshake response arrived with no handshake in progress.
    #[error("handshake not started")]
    HandshakeNotStarted,

    /// Traffic keys are not available yet.
    #[error("session not established")]
    NotEstablished,

    /// The session failed earlier and must not be used again.
    #[error("session is unusable after a previous failure")]
    SessionUnusable,

    /// The peer's ephemeral key is malformed or not on the curve.
    #[error("invalid peer public key")]
    InvalidPublicKey,

    /// The NN pattern carries no handshake payload.
    #[error("unexpected handshake payload of {0} bytes")]
    UnexpectedPayload(usize),

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// Nonce counter exhausted - session must terminate.
    #[error("nonce counter exhausted - session must terminate")]
    CounterExhaustion,

    /// Key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailed,
}

/// Top-level crate errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Wire encoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A peer sent a message that is not valid in the current phase.
    #[error("unexpected {actual} message while {expected}")]
    UnexpectedMessage {
        /// What the receiver was waiting for.
        expected: &'static str,
        /// Kind of message that arrived.
        actual: &'static str,
    },

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
