//! Query session over a persistent scene-graph socket.
//!
//! Composes the correlator with message construction, the transport, and the
//! lifecycle of repeating queries and event bindings.

pub mod error;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::*;
pub use registry::*;
pub use session::*;
pub use transport::*;
