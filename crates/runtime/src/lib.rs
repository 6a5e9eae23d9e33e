pub mod correlator;
pub mod metrics;
pub mod reply;

pub use correlator::*;
pub use metrics::*;
pub use reply::*;
