//! Protocol types for the scene-graph query socket.
//!
//! Transport-agnostic: anything that moves UTF-8 JSON frames both ways can
//! carry these messages.

pub mod message;
pub mod query;

pub use message::*;
pub use query::*;
