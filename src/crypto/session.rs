//! Client-side secure session
//!
//! [`NoiseSession`] is the production [`SecureSession`]: it runs the
//! initiator half of the Noise_NN handshake, then hands the traffic keys to
//! a [`Crypter`]. Any failure leaves the session permanently unusable.

use tracing::{debug, warn};

use crate::core::{
    CryptoError, EncryptedMessage, HandshakeRequest, HandshakeResponse, Response, SecureSession,
};

use super::crypter::Crypter;
use super::noise::{InitiatorHandshake, Role};

enum HandshakeState {
    NotStarted,
    InProgress(InitiatorHandshake),
    Established(Crypter),
    Failed,
}

/// Initiator session over Noise_NN (P-256, AES-256-GCM, SHA-256).
pub struct NoiseSession {
    state: HandshakeState,
}

impl NoiseSession {
    /// Create a session with no handshake started.
    pub fn new() -> Self {
        Self {
            state: HandshakeState::NotStarted,
        }
    }

    /// Whether traffic keys are available.
    pub fn is_established(&self) -> bool {
        matches!(self.state, HandshakeState::Established(_))
    }

    /// Whether the session has failed and must be discarded.
    pub fn is_failed(&self) -> bool {
        matches!(self.state, HandshakeState::Failed)
    }

    fn crypter(&mut self) -> Result<&mut Crypter, CryptoError> {
        match &mut self.state {
            HandshakeState::Established(crypter) => Ok(crypter),
            HandshakeState::Failed => Err(CryptoError::SessionUnusable),
            _ => Err(CryptoError::NotEstablished),
        }
    }

    fn fail(&mut self, err: CryptoError) -> CryptoError {
        warn!(error = %err, "secure session failed");
        self.state = HandshakeState::Failed;
        err
    }
}

impl Default for NoiseSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NoiseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            HandshakeState::NotStarted => "NotStarted",
            HandshakeState::InProgress(_) => "InProgress",
            HandshakeState::Established(_) => "Established",
            HandshakeState::Failed => "Failed",
        };
        f.debug_struct("NoiseSession").field("state", &state).finish()
    }
}

impl SecureSession for NoiseSession {
    fn handshake_message(&mut self) -> Result<HandshakeRequest, CryptoError> {
        match self.state {
            HandshakeState::NotStarted => {}
            HandshakeState::Failed => return Err(CryptoError::SessionUnusable),
            _ => return Err(CryptoError::HandshakeAlreadyStarted),
        }

        match InitiatorHandshake::start() {
            Ok((handshake, message)) => {
                debug!("handshake started");
                self.state = HandshakeState::InProgress(handshake);
                Ok(HandshakeRequest {
                    noise_handshake_message: message,
                })
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn process_handshake_response(
        &mut self,
        response: &HandshakeResponse,
    ) -> Result<(), CryptoError> {
        let handshake = match std::mem::replace(&mut self.state, HandshakeState::Failed) {
            HandshakeState::InProgress(handshake) => handshake,
            HandshakeState::Failed => return Err(CryptoError::SessionUnusable),
            other => {
                // Nothing to complete; leave an established session intact.
                self.state = other;
                return Err(CryptoError::HandshakeNotStarted);
            }
        };

        match handshake.finish(&response.noise_handshake_message) {
            Ok(keys) => {
                debug!("session established");
                self.state = HandshakeState::Established(Crypter::new(keys, Role::Initiator));
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn encrypt(&mut self, plaintext: &[u8]) -> Result<EncryptedMessage, CryptoError> {
        let result = self.crypter()?.encrypt(plaintext);
        match result {
            Ok(ciphertext) => Ok(EncryptedMessage { ciphertext }),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn decrypt(&mut self, message: &EncryptedMessage) -> Result<Response, CryptoError> {
        let result = self.crypter()?.decrypt(&message.ciphertext);
        result.map_err(|e| self.fail(e))
    }
}
