//! Security layer
//!
//! Implements the cryptographic half of the channel:
//! - Noise_NN handshake over P-256 ([`InitiatorHandshake`], [`ResponderHandshake`])
//! - AES-256-GCM AEAD with counter nonces
//! - Per-direction traffic encryption ([`Crypter`])
//! - The client [`SecureSession`](crate::core::SecureSession) implementation
//!   ([`NoiseSession`])

mod aead;
mod crypter;
mod keys;
mod noise;
mod session;

pub use aead::{SymmetricKey, construct_nonce, decrypt, encrypt};
pub use crypter::Crypter;
pub use keys::{EphemeralKeypair, parse_public_key};
pub use noise::{InitiatorHandshake, ResponderHandshake, Role, SymmetricState, TrafficKeys};
pub use session::NoiseSession;
