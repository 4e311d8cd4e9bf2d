//! Responder side of the secure channel.
//!
//! For services (and tests) that answer attested clients.

#[allow(clippy::module_inception)]
mod server;
mod session;

pub use server::*;
pub use session::*;
