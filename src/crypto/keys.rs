//! P-256 ephemeral key management
//!
//! Ephemeral keys live only for the duration of one handshake.

use p256::{
    PublicKey,
    ecdh::{EphemeralSecret, SharedSecret},
    elliptic_curve::sec1::ToEncodedPoint,
};
use rand::rngs::OsRng;

use crate::core::{CryptoError, P256_X962_LENGTH, SEC1_UNCOMPRESSED_TAG};

/// An ephemeral P-256 keypair for one Noise handshake.
///
/// The secret scalar is zeroized on drop by `p256`.
pub struct EphemeralKeypair {
    secret: EphemeralSecret,
    public: [u8; P256_X962_LENGTH],
}

impl EphemeralKeypair {
    /// Generate a new random keypair.
    pub fn generate() -> Result<Self, CryptoError> {
        let secret = EphemeralSecret::random(&mut OsRng);
        let encoded = secret.public_key().to_encoded_point(false);
        let public = encoded
            .as_bytes()
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;

        Ok(Self { secret, public })
    }

    /// Get the public key in uncompressed X9.62 form.
    pub fn public_key(&self) -> &[u8; P256_X962_LENGTH] {
        &self.public
    }

    /// Compute the ECDH shared secret with a peer's public key.
    pub fn diffie_hellman(&self, peer: &PublicKey) -> SharedSecret {
        self.secret.diffie_hellman(peer)
    }
}

impl std::fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Parse a peer's ephemeral key.
///
/// Only uncompressed 65-byte points are accepted; points that are not on the
/// curve (or are the identity) are rejected.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    if bytes.len() != P256_X962_LENGTH || bytes[0] != SEC1_UNCOMPRESSED_TAG {
        return Err(CryptoError::InvalidPublicKey);
    }
    PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp1 = EphemeralKeypair::generate().unwrap();
        let kp2 = EphemeralKeypair::generate().unwrap();

        assert_ne!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.public_key()[0], SEC1_UNCOMPRESSED_TAG);
    }

    #[test]
    fn test_shared_secret_agrees() {
        let alice = EphemeralKeypair::generate().unwrap();
        let bob = EphemeralKeypair::generate().unwrap();

        let alice_view = parse_public_key(bob.public_key()).unwrap();
        let bob_view = parse_public_key(alice.public_key()).unwrap();

        assert_eq!(
            alice.diffie_hellman(&alice_view).raw_secret_bytes(),
            bob.diffie_hellman(&bob_view).raw_secret_bytes()
        );
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert_eq!(
            parse_public_key(b"invalid key"),
            Err(CryptoError::InvalidPublicKey)
        );
    }

    #[test]
    fn test_parse_rejects_compressed_point() {
        let kp = EphemeralKeypair::generate().unwrap();
        let compressed = parse_public_key(kp.public_key())
            .unwrap()
            .to_encoded_point(true);

        assert_eq!(
            parse_public_key(compressed.as_bytes()),
            Err(CryptoError::InvalidPublicKey)
        );
    }

    #[test]
    fn test_parse_rejects_point_off_curve() {
        let kp = EphemeralKeypair::generate().unwrap();
        let mut bytes = *kp.public_key();
        // Perturbing y leaves (x, y) off the curve.
        bytes[P256_X962_LENGTH - 1] ^= 0x01;

        assert_eq!(parse_public_key(&bytes), Err(CryptoError::InvalidPublicKey));
    }

    #[test]
    fn test_parse_rejects_all_zero_point() {
        let mut bytes = [0u8; P256_X962_LENGTH];
        bytes[0] = SEC1_UNCOMPRESSED_TAG;

        assert_eq!(parse_public_key(&bytes), Err(CryptoError::InvalidPublicKey));
    }
}
