//! # Attested Channel
//!
//! An authenticated, encrypted request/response channel to a remote attested
//! service. A client writes opaque requests; the channel first verifies the
//! service's attestation, then runs a Noise_NN handshake over P-256 and
//! exchanges AES-256-GCM encrypted messages, one request in flight at a time.
//!
//! - **Attestation first**: the peer's evidence is checked before any key
//!   exchange
//! - **Fail closed**: any failure fails every queued request and the channel
//!   never recovers; construct a new one to retry
//! - **Ordered**: requests resolve strictly in submission order
//! - **Pluggable**: transport, session and attestation are traits with
//!   injectable implementations
//!
//! ## Feature Flags
//!
//! - `crypto` (default): Noise_NN / P-256 / AES-256-GCM session ([`NoiseSession`])
//! - `server` (default): responder-side session and stream server
//!
//! ## Modules
//!
//! - [`core`]: Core traits, messages, constants, and error types
//! - [`channel`]: The channel state machine and its handle
//! - [`transport`]: Message codec and stream transport
//! - [`attestation`]: Attestation handler implementations
//! - [`crypto`]: Security layer (requires `crypto` feature)
//! - [`server`]: Responder side (requires `server` feature)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use attested_channel::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:7000").await?;
//! let channel = SecureChannel::spawn(
//!     StreamTransport::new(stream),
//!     NoiseSession::new(),
//!     InsecureAttestationHandler::new(),
//! );
//!
//! let response = channel.write(b"hello".to_vec()).await?;
//! println!("{} bytes back", response.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

pub mod attestation;
pub mod channel;
pub mod transport;

// Crypto layer (feature-gated)
#[cfg(feature = "crypto")]
#[cfg_attr(docsrs, doc(cfg(feature = "crypto")))]
pub mod crypto;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::attestation::{InsecureAttestationHandler, VerifyingAttestationHandler};
    pub use crate::channel::{ChannelDriver, ChannelState, SecureChannel, WriteFuture};
    pub use crate::transport::{StreamTransport, StreamTransportBuilder, StreamTransportConfig};

    // Crypto types (when enabled)
    #[cfg(feature = "crypto")]
    pub use crate::crypto::NoiseSession;

    #[cfg(feature = "server")]
    pub use crate::server::{RequestHandler, ServerSession, serve};
}

// Re-export commonly used items at crate root
pub use crate::channel::{ChannelState, SecureChannel};
pub use crate::core::{Error, ErrorCode, Request, Response};

#[cfg(feature = "crypto")]
pub use crate::crypto::NoiseSession;
