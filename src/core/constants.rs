//! Protocol constants for the attested channel.
//!
//! These values are fixed by the wire protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// NOISE HANDSHAKE
// =============================================================================

/// Noise protocol name mixed into the initial transcript hash.
pub const NOISE_PROTOCOL_NAME: &[u8] = b"Noise_NN_P256_AESGCM_SHA256";

/// One-byte prologue mixed in by both sides before the first message.
pub const NOISE_PROLOGUE: [u8; 1] = [0x00];

/// Length of a P-256 public key in uncompressed X9.62 format.
pub const P256_X962_LENGTH: usize = 65;

/// SEC1 tag byte of an uncompressed curve point.
pub const SEC1_UNCOMPRESSED_TAG: u8 = 0x04;

/// SHA-256 output size (transcript hash and chaining key).
pub const HASH_SIZE: usize = 32;

/// AES-256 key size (handshake and traffic keys).
pub const SYMMETRIC_KEY_SIZE: usize = 32;

// =============================================================================
// AEAD (AES-256-GCM)
// =============================================================================

/// GCM authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// GCM nonce size.
pub const AEAD_NONCE_SIZE: usize = 12;

// =============================================================================
// FRAMING
// =============================================================================

/// Size of the big-endian length prefix in front of every frame and field.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound on a single encoded frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 20;

/// Message tag: response carrying no message.
pub const MESSAGE_TAG_EMPTY: u8 = 0x00;

/// Message tag: attestation request/response.
pub const MESSAGE_TAG_ATTEST: u8 = 0x01;

/// Message tag: handshake request/response.
pub const MESSAGE_TAG_HANDSHAKE: u8 = 0x02;

/// Message tag: encrypted application message.
pub const MESSAGE_TAG_ENCRYPTED: u8 = 0x03;

// =============================================================================
// TIMING
// =============================================================================

/// Default time a stream transport waits for a reply.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
