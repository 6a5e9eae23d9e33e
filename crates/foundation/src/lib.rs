pub mod ids;
pub mod retry;
pub mod time;

// Foundation crate: small, well-tested primitives only.
pub use ids::*;
pub use retry::*;
pub use time::*;
