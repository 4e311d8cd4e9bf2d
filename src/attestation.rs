//! Attestation handler implementations.
//!
//! Attestation runs before the Noise handshake and is the only place the
//! peer's identity is established. The trust decision itself belongs to the
//! caller: [`VerifyingAttestationHandler`] delegates it to a predicate.

use tracing::{debug, warn};

use crate::core::{AttestRequest, AttestResponse, AttestationHandler};

/// Sends an empty attestation request and accepts any response.
///
/// Only for talking to unattested development peers.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsecureAttestationHandler;

impl InsecureAttestationHandler {
    /// Create a handler that trusts every peer.
    pub fn new() -> Self {
        Self
    }
}

impl AttestationHandler for InsecureAttestationHandler {
    fn attestation_request(&mut self) -> Option<AttestRequest> {
        Some(AttestRequest::default())
    }

    fn verify_attestation_response(&mut self, response: &AttestResponse) -> bool {
        warn!(
            evidence_len = response.evidence.len(),
            "accepting peer without verifying attestation"
        );
        true
    }
}

/// Presents fixed evidence and judges the peer with a caller-supplied predicate.
pub struct VerifyingAttestationHandler<F> {
    evidence: Vec<u8>,
    verifier: F,
}

impl<F> VerifyingAttestationHandler<F>
where
    F: FnMut(&[u8]) -> bool + Send + 'static,
{
    /// Create a handler sending `evidence` and accepting responses for which
    /// `verifier` returns `true`.
    pub fn new(evidence: Vec<u8>, verifier: F) -> Self {
        Self { evidence, verifier }
    }
}

impl<F> std::fmt::Debug for VerifyingAttestationHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyingAttestationHandler")
            .field("evidence_len", &self.evidence.len())
            .finish_non_exhaustive()
    }
}

impl<F> AttestationHandler for VerifyingAttestationHandler<F>
where
    F: FnMut(&[u8]) -> bool + Send + 'static,
{
    fn attestation_request(&mut self) -> Option<AttestRequest> {
        Some(AttestRequest {
            evidence: self.evidence.clone(),
        })
    }

    fn verify_attestation_response(&mut self, response: &AttestResponse) -> bool {
        let accepted = (self.verifier)(&response.evidence);
        debug!(accepted, "attestation verdict");
        accepted
    }
}
