//! Session protocol messages carried over a [`Transport`](super::Transport).
//!
//! The message set is exactly three request/response pairs: attestation,
//! handshake, and encrypted application data.

/// Plaintext application request.
pub type Request = Vec<u8>;

/// Plaintext application response.
pub type Response = Vec<u8>;

/// Attestation request sent before the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttestRequest {
    /// Opaque evidence presented by the client (may be empty).
    pub evidence: Vec<u8>,
}

/// Attestation response carrying the peer's evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttestResponse {
    /// Opaque evidence presented by the service.
    pub evidence: Vec<u8>,
}

/// One Noise handshake message: an ephemeral key and a ciphertext blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoiseHandshakeMessage {
    /// Sender's ephemeral public key (uncompressed X9.62 for P-256).
    pub ephemeral_public_key: Vec<u8>,
    /// Payload encrypted under the current handshake key.
    pub ciphertext: Vec<u8>,
}

/// Initiator's handshake message (`-> e`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The Noise message.
    pub noise_handshake_message: NoiseHandshakeMessage,
}

/// Responder's handshake message (`<- e, ee`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Noise message.
    pub noise_handshake_message: NoiseHandshakeMessage,
}

/// Application data encrypted under the session's traffic keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptedMessage {
    /// AEAD ciphertext with appended tag.
    pub ciphertext: Vec<u8>,
}

/// A message sent to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    /// Attestation request.
    Attest(AttestRequest),
    /// Handshake request.
    Handshake(HandshakeRequest),
    /// Encrypted application request.
    Encrypted(EncryptedMessage),
}

impl SessionRequest {
    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Attest(_) => "attest",
            Self::Handshake(_) => "handshake",
            Self::Encrypted(_) => "encrypted",
        }
    }
}

/// A reply delivered by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResponse {
    /// Attestation response.
    Attest(AttestResponse),
    /// Handshake response.
    Handshake(HandshakeResponse),
    /// Encrypted application response.
    Encrypted(EncryptedMessage),
    /// A reply that carried no message at all.
    Empty,
}

impl SessionResponse {
    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Attest(_) => "attest",
            Self::Handshake(_) => "handshake",
            Self::Encrypted(_) => "encrypted",
            Self::Empty => "empty",
        }
    }
}
