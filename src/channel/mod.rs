//! Secure channel orchestration.
//!
//! Drives the attestation → handshake → established sequence and queues
//! application requests until the channel can carry them.

#[allow(clippy::module_inception)]
mod channel;
mod driver;

pub use channel::*;
pub use driver::{ChannelDriver, ChannelState};
