//! Noise_NN handshake implementation
//!
//! The channel uses the anonymous Noise_NN pattern over P-256, with
//! AES-256-GCM and SHA-256:
//!
//! ```text
//! Noise_NN():
//!   -> e
//!   <- e, ee
//! ```
//!
//! Both ephemeral keys are also fed to `MixKey`, so the initiator's first
//! message already carries an authenticated (empty) payload. Neither message
//! may carry a non-empty payload. Identity comes from attestation, which
//! happens before the handshake.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroize;

use crate::core::{
    CryptoError, HASH_SIZE, NOISE_PROLOGUE, NOISE_PROTOCOL_NAME, NoiseHandshakeMessage,
};

use super::aead::{self, SymmetricKey};
use super::keys::{EphemeralKeypair, parse_public_key};

/// Noise `HKDF(ck, ikm)` with two 32-byte outputs.
fn hkdf2(
    chaining_key: &[u8; HASH_SIZE],
    ikm: &[u8],
) -> Result<([u8; HASH_SIZE], [u8; HASH_SIZE]), CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(&chaining_key[..]), ikm);
    let mut okm = [0u8; 2 * HASH_SIZE];
    hk.expand(&[], &mut okm)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

    let mut first = [0u8; HASH_SIZE];
    let mut second = [0u8; HASH_SIZE];
    first.copy_from_slice(&okm[..HASH_SIZE]);
    second.copy_from_slice(&okm[HASH_SIZE..]);
    okm.zeroize();

    Ok((first, second))
}

/// Noise symmetric state: chaining key, transcript hash, and cipher state.
pub struct SymmetricState {
    chaining_key: [u8; HASH_SIZE],
    hash: [u8; HASH_SIZE],
    key: Option<SymmetricKey>,
    nonce: u64,
}

impl SymmetricState {
    /// Initialize from a protocol name.
    ///
    /// Names of at most 32 bytes are zero-padded; longer names are hashed.
    pub fn initialize(protocol_name: &[u8]) -> Self {
        let mut hash = [0u8; HASH_SIZE];
        if protocol_name.len() <= HASH_SIZE {
            hash[..protocol_name.len()].copy_from_slice(protocol_name);
        } else {
            hash.copy_from_slice(&Sha256::digest(protocol_name));
        }

        Self {
            chaining_key: hash,
            hash,
            key: None,
            nonce: 0,
        }
    }

    /// The current transcript hash.
    pub fn handshake_hash(&self) -> &[u8; HASH_SIZE] {
        &self.hash
    }

    /// Whether a handshake key has been derived.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// `h = SHA-256(h || data)`.
    pub fn mix_hash(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.hash);
        hasher.update(data);
        self.hash.copy_from_slice(&hasher.finalize());
    }

    /// `ck, k = HKDF(ck, ikm)`; resets the handshake nonce.
    pub fn mix_key(&mut self, ikm: &[u8]) -> Result<(), CryptoError> {
        let (chaining_key, key) = hkdf2(&self.chaining_key, ikm)?;
        self.chaining_key = chaining_key;
        self.key = Some(SymmetricKey::from_bytes(key));
        self.nonce = 0;
        Ok(())
    }

    /// Encrypt with the transcript hash as associated data, then mix the
    /// ciphertext into the hash. Passes plaintext through while no key exists.
    pub fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let ciphertext = match &self.key {
            Some(key) => {
                let nonce = next_nonce(&mut self.nonce)?;
                aead::encrypt(key, nonce, &self.hash, plaintext)?
            }
            None => plaintext.to_vec(),
        };
        self.mix_hash(&ciphertext);
        Ok(ciphertext)
    }

    /// Inverse of [`encrypt_and_hash`](Self::encrypt_and_hash).
    pub fn decrypt_and_hash(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let plaintext = match &self.key {
            Some(key) => {
                let nonce = next_nonce(&mut self.nonce)?;
                aead::decrypt(key, nonce, &self.hash, ciphertext)?
            }
            None => ciphertext.to_vec(),
        };
        self.mix_hash(ciphertext);
        Ok(plaintext)
    }

    /// Derive the two directional traffic keys from the final chaining key.
    ///
    /// Consumes the state; the transcript is discarded.
    pub fn split(self) -> Result<TrafficKeys, CryptoError> {
        let (mut first, mut second) = hkdf2(&self.chaining_key, &[])?;
        let keys = TrafficKeys {
            initiator_to_responder: SymmetricKey::from_bytes(first),
            responder_to_initiator: SymmetricKey::from_bytes(second),
        };
        first.zeroize();
        second.zeroize();
        Ok(keys)
    }
}

/// Take the current handshake nonce and advance the counter.
///
/// Operates on the counter field alone so callers can hold the key borrowed.
fn next_nonce(counter: &mut u64) -> Result<u64, CryptoError> {
    let nonce = *counter;
    *counter = nonce.checked_add(1).ok_or(CryptoError::CounterExhaustion)?;
    Ok(nonce)
}

impl Drop for SymmetricState {
    fn drop(&mut self) {
        self.chaining_key.zeroize();
        self.hash.zeroize();
    }
}

/// Directional traffic keys derived at handshake completion.
pub struct TrafficKeys {
    /// Key for initiator → responder messages
    pub initiator_to_responder: SymmetricKey,
    /// Key for responder → initiator messages
    pub responder_to_initiator: SymmetricKey,
}

/// Role in the handshake (affects which key is used for send/receive)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Initiator (client)
    Initiator,
    /// Responder (attested service)
    Responder,
}

impl TrafficKeys {
    /// Split into `(send, receive)` keys for the given role.
    pub fn into_directional(self, role: Role) -> (SymmetricKey, SymmetricKey) {
        match role {
            Role::Initiator => (self.initiator_to_responder, self.responder_to_initiator),
            Role::Responder => (self.responder_to_initiator, self.initiator_to_responder),
        }
    }
}

/// Fresh symmetric state with the prologue already mixed in.
fn initial_state() -> SymmetricState {
    let mut state = SymmetricState::initialize(NOISE_PROTOCOL_NAME);
    state.mix_hash(&NOISE_PROLOGUE);
    state
}

/// Handshake state machine for the initiator (client).
///
/// Holds the transcript and the ephemeral key between the two messages.
/// Both are dropped when [`finish`](Self::finish) returns, whatever the
/// outcome.
pub struct InitiatorHandshake {
    state: SymmetricState,
    ephemeral: EphemeralKeypair,
}

impl InitiatorHandshake {
    /// Generate the first handshake message (`-> e`).
    pub fn start() -> Result<(Self, NoiseHandshakeMessage), CryptoError> {
        let mut state = initial_state();
        let ephemeral = EphemeralKeypair::generate()?;

        state.mix_hash(ephemeral.public_key());
        state.mix_key(ephemeral.public_key())?;
        let ciphertext = state.encrypt_and_hash(&[])?;

        let message = NoiseHandshakeMessage {
            ephemeral_public_key: ephemeral.public_key().to_vec(),
            ciphertext,
        };
        Ok((Self { state, ephemeral }, message))
    }

    /// Process the handshake response (`<- e, ee`) and derive traffic keys.
    pub fn finish(mut self, response: &NoiseHandshakeMessage) -> Result<TrafficKeys, CryptoError> {
        let peer = parse_public_key(&response.ephemeral_public_key)?;
        let shared = self.ephemeral.diffie_hellman(&peer);

        self.state.mix_hash(&response.ephemeral_public_key);
        self.state.mix_key(&response.ephemeral_public_key)?;
        self.state.mix_key(shared.raw_secret_bytes())?;

        let payload = self.state.decrypt_and_hash(&response.ciphertext)?;
        if !payload.is_empty() {
            return Err(CryptoError::UnexpectedPayload(payload.len()));
        }

        debug!("initiator handshake complete");
        self.state.split()
    }
}

/// Handshake logic for the responder (attested service).
pub struct ResponderHandshake;

impl ResponderHandshake {
    /// Process the initiator's message and produce the response.
    ///
    /// Returns the response message and the derived traffic keys.
    pub fn respond(
        request: &NoiseHandshakeMessage,
    ) -> Result<(NoiseHandshakeMessage, TrafficKeys), CryptoError> {
        Self::respond_with_payload(request, &[])
    }

    /// As [`respond`](Self::respond), but encrypting `payload` into the
    /// response. Conforming initiators reject any non-empty payload.
    pub(crate) fn respond_with_payload(
        request: &NoiseHandshakeMessage,
        payload: &[u8],
    ) -> Result<(NoiseHandshakeMessage, TrafficKeys), CryptoError> {
        let mut state = initial_state();

        state.mix_hash(&request.ephemeral_public_key);
        state.mix_key(&request.ephemeral_public_key)?;
        let initiator_payload = state.decrypt_and_hash(&request.ciphertext)?;
        if !initiator_payload.is_empty() {
            return Err(CryptoError::UnexpectedPayload(initiator_payload.len()));
        }
        let peer = parse_public_key(&request.ephemeral_public_key)?;

        let ephemeral = EphemeralKeypair::generate()?;
        state.mix_hash(ephemeral.public_key());
        state.mix_key(ephemeral.public_key())?;
        let shared = ephemeral.diffie_hellman(&peer);
        state.mix_key(shared.raw_secret_bytes())?;

        let ciphertext = state.encrypt_and_hash(payload)?;
        let message = NoiseHandshakeMessage {
            ephemeral_public_key: ephemeral.public_key().to_vec(),
            ciphertext,
        };

        debug!("responder handshake complete");
        Ok((message, state.split()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AEAD_TAG_SIZE, P256_X962_LENGTH};

    fn complete_handshake() -> (TrafficKeys, TrafficKeys) {
        let (initiator, request) = InitiatorHandshake::start().unwrap();
        let (response, responder_keys) = ResponderHandshake::respond(&request).unwrap();
        let initiator_keys = initiator.finish(&response).unwrap();
        (initiator_keys, responder_keys)
    }

    #[test]
    fn test_initialize_pads_short_name() {
        let state = SymmetricState::initialize(NOISE_PROTOCOL_NAME);

        let hash = state.handshake_hash();
        assert_eq!(&hash[..NOISE_PROTOCOL_NAME.len()], NOISE_PROTOCOL_NAME);
        assert!(hash[NOISE_PROTOCOL_NAME.len()..].iter().all(|b| *b == 0));
        assert!(!state.has_key());
    }

    #[test]
    fn test_mix_hash_matches_sha256() {
        let mut state = SymmetricState::initialize(b"Noise_test");
        let before = *state.handshake_hash();
        state.mix_hash(b"data");

        let mut hasher = Sha256::new();
        hasher.update(before);
        hasher.update(b"data");
        assert_eq!(state.handshake_hash().as_slice(), hasher.finalize().as_slice());
    }

    #[test]
    fn test_hkdf2_matches_rfc5869_empty_info() {
        // Noise HKDF is RFC 5869 with empty info; check the two outputs are
        // the first 64 bytes of the RFC expansion.
        let ck = [0x0b; HASH_SIZE];
        let (first, second) = hkdf2(&ck, b"ikm").unwrap();

        let mut expected = [0u8; 64];
        Hkdf::<Sha256>::new(Some(&ck[..]), b"ikm")
            .expand(&[], &mut expected)
            .unwrap();
        assert_eq!(hex::encode(first), hex::encode(&expected[..32]));
        assert_eq!(hex::encode(second), hex::encode(&expected[32..]));
        assert_ne!(first, second);
    }

    #[test]
    fn test_encrypt_and_hash_passthrough_without_key() {
        let mut state = SymmetricState::initialize(NOISE_PROTOCOL_NAME);
        let ciphertext = state.encrypt_and_hash(b"clear").unwrap();
        assert_eq!(ciphertext, b"clear");
    }

    #[test]
    fn test_keyed_states_advance_nonce_in_step() {
        let mut sender = SymmetricState::initialize(NOISE_PROTOCOL_NAME);
        let mut receiver = SymmetricState::initialize(NOISE_PROTOCOL_NAME);
        sender.mix_key(b"shared").unwrap();
        receiver.mix_key(b"shared").unwrap();

        let first = sender.encrypt_and_hash(b"payload").unwrap();
        let second = sender.encrypt_and_hash(b"payload").unwrap();
        assert_eq!(first.len(), b"payload".len() + AEAD_TAG_SIZE);
        assert_ne!(first, second);

        assert_eq!(receiver.decrypt_and_hash(&first).unwrap(), b"payload");
        assert_eq!(receiver.decrypt_and_hash(&second).unwrap(), b"payload");
        assert_eq!(sender.handshake_hash(), receiver.handshake_hash());
    }

    #[test]
    fn test_keyed_state_rejects_out_of_order_ciphertext() {
        let mut sender = SymmetricState::initialize(NOISE_PROTOCOL_NAME);
        let mut receiver = SymmetricState::initialize(NOISE_PROTOCOL_NAME);
        sender.mix_key(b"shared").unwrap();
        receiver.mix_key(b"shared").unwrap();

        let _first = sender.encrypt_and_hash(b"one").unwrap();
        let second = sender.encrypt_and_hash(b"two").unwrap();
        assert!(matches!(
            receiver.decrypt_and_hash(&second),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_next_nonce_exhaustion() {
        let mut counter = u64::MAX - 1;
        assert_eq!(next_nonce(&mut counter).unwrap(), u64::MAX - 1);
        assert!(matches!(
            next_nonce(&mut counter),
            Err(CryptoError::CounterExhaustion)
        ));
        assert_eq!(counter, u64::MAX);
    }

    #[test]
    fn test_first_message_shape() {
        let (_, message) = InitiatorHandshake::start().unwrap();

        assert_eq!(message.ephemeral_public_key.len(), P256_X962_LENGTH);
        // Empty payload encrypted under the key mixed from `e`: tag only.
        assert_eq!(message.ciphertext.len(), AEAD_TAG_SIZE);
    }

    #[test]
    fn test_handshake_roundtrip() {
        let (initiator_keys, responder_keys) = complete_handshake();

        let (i_send, i_recv) = initiator_keys.into_directional(Role::Initiator);
        let (r_send, r_recv) = responder_keys.into_directional(Role::Responder);

        assert_eq!(i_send.as_bytes(), r_recv.as_bytes());
        assert_eq!(i_recv.as_bytes(), r_send.as_bytes());
        assert_ne!(i_send.as_bytes(), i_recv.as_bytes());
    }

    #[test]
    fn test_handshakes_derive_fresh_keys() {
        let (first, _) = complete_handshake();
        let (second, _) = complete_handshake();

        assert_ne!(
            first.initiator_to_responder.as_bytes(),
            second.initiator_to_responder.as_bytes()
        );
    }

    #[test]
    fn test_non_empty_response_payload_rejected() {
        let (initiator, request) = InitiatorHandshake::start().unwrap();
        let (response, _) = ResponderHandshake::respond_with_payload(&request, &[1, 2, 3]).unwrap();

        let result = initiator.finish(&response);
        assert!(matches!(result, Err(CryptoError::UnexpectedPayload(3))));
    }

    #[test]
    fn test_flipped_bit_in_response_ciphertext_rejected() {
        let (initiator, request) = InitiatorHandshake::start().unwrap();
        let (mut response, _) = ResponderHandshake::respond(&request).unwrap();
        response.ciphertext[0] ^= 0x01;

        assert!(matches!(
            initiator.finish(&response),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_flipped_bit_in_request_ciphertext_rejected() {
        let (_, mut request) = InitiatorHandshake::start().unwrap();
        request.ciphertext[AEAD_TAG_SIZE - 1] ^= 0x80;

        assert!(matches!(
            ResponderHandshake::respond(&request),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_substituted_responder_key_rejected() {
        let (initiator, request) = InitiatorHandshake::start().unwrap();
        let (mut response, _) = ResponderHandshake::respond(&request).unwrap();

        // A valid point that the responder did not use breaks the transcript.
        let other = EphemeralKeypair::generate().unwrap();
        response.ephemeral_public_key = other.public_key().to_vec();

        assert!(matches!(
            initiator.finish(&response),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_invalid_responder_key_rejected() {
        let (initiator, _) = InitiatorHandshake::start().unwrap();
        let response = NoiseHandshakeMessage {
            ephemeral_public_key: b"invalid key".to_vec(),
            ciphertext: b"some ciphertext".to_vec(),
        };

        assert!(matches!(
            initiator.finish(&response),
            Err(CryptoError::InvalidPublicKey)
        ));
    }
}
