//! Core types, traits, and constants shared by every layer.
//!
//! This module has no crypto dependencies and defines the collaborator
//! abstractions the channel is written against.

mod constants;
mod error;
mod message;
mod traits;

pub use constants::*;
pub use error::*;
pub use message::*;
pub use traits::*;
