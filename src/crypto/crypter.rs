//! Post-handshake transport encryption
//!
//! One key and one counter per direction. Each message is sealed with the
//! current send counter as nonce and empty associated data; the receive
//! counter only advances once a message authenticates, so a rejected
//! ciphertext does not desynchronize the stream.

use crate::core::CryptoError;

use super::aead::{self, SymmetricKey};
use super::noise::{Role, TrafficKeys};

/// Per-direction AEAD state for an established session.
pub struct Crypter {
    send_key: SymmetricKey,
    recv_key: SymmetricKey,
    send_counter: u64,
    recv_counter: u64,
}

impl Crypter {
    /// Create a crypter from handshake output for the given role.
    pub fn new(keys: TrafficKeys, role: Role) -> Self {
        let (send_key, recv_key) = keys.into_directional(role);
        Self {
            send_key,
            recv_key,
            send_counter: 0,
            recv_counter: 0,
        }
    }

    /// Encrypt one outgoing message.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let counter = self.send_counter;
        let next = counter.checked_add(1).ok_or(CryptoError::CounterExhaustion)?;

        let ciphertext = aead::encrypt(&self.send_key, counter, &[], plaintext)?;
        self.send_counter = next;
        Ok(ciphertext)
    }

    /// Decrypt one incoming message.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let counter = self.recv_counter;
        let next = counter.checked_add(1).ok_or(CryptoError::CounterExhaustion)?;

        let plaintext = aead::decrypt(&self.recv_key, counter, &[], ciphertext)?;
        self.recv_counter = next;
        Ok(plaintext)
    }

    /// Number of messages sent so far.
    pub fn send_counter(&self) -> u64 {
        self.send_counter
    }

    /// Number of messages received so far.
    pub fn recv_counter(&self) -> u64 {
        self.recv_counter
    }
}

impl std::fmt::Debug for Crypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crypter")
            .field("send_counter", &self.send_counter)
            .field("recv_counter", &self.recv_counter)
            .finish_non_exhaustive()
    }
}
