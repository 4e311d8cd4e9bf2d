//! Transport layer
//!
//! Carries session messages between client and service. It provides:
//!
//! - **Message encoding/decoding**: [`encode_request`], [`decode_response`]
//!   and their counterparts for the service side
//! - **Stream transport**: [`StreamTransport`], a [`Transport`] over any
//!   tokio byte stream with length-prefixed framing
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Secure Channel                  │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │   message codec, framing, timeouts      │
//! ├─────────────────────────────────────────┤
//! │    TCP / Unix socket / in-memory        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! [`Transport`]: crate::core::Transport

mod frame;
mod stream;

pub use frame::*;
pub use stream::{StreamTransport, StreamTransportBuilder, StreamTransportConfig};

pub(crate) use stream::{read_frame, write_frame};
