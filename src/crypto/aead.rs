//! AES-256-GCM AEAD encryption
//!
//! Used both inside the Noise handshake (`encrypt_and_hash`) and for
//! post-handshake traffic. Nonces are 12 bytes:
//! - Zeros (4 bytes)
//! - Counter (8 bytes, big-endian)

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{AEAD_NONCE_SIZE, AEAD_TAG_SIZE, CryptoError, SYMMETRIC_KEY_SIZE};

/// A 32-byte AES-256-GCM key.
///
/// Zeroized on drop for security.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; SYMMETRIC_KEY_SIZE],
}

impl SymmetricKey {
    /// Create a key from bytes.
    pub fn from_bytes(key: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Construct a 12-byte GCM nonce from a counter.
///
/// Layout:
/// ```text
/// [ zeros (4) | counter (8, big-endian) ]
/// ```
pub fn construct_nonce(counter: u64) -> [u8; AEAD_NONCE_SIZE] {
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// Encrypt plaintext using AES-256-GCM.
///
/// # Returns
/// Ciphertext with appended 16-byte GCM tag
pub fn encrypt(
    key: &SymmetricKey,
    counter: u64,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = construct_nonce(counter);

    cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypt ciphertext using AES-256-GCM.
///
/// Returns the plaintext, or an error if authentication fails.
pub fn decrypt(
    key: &SymmetricKey,
    counter: u64,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < AEAD_TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = construct_nonce(counter);

    cipher
        .decrypt(Nonce::from_slice(&nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::DecryptionFailed)
}
