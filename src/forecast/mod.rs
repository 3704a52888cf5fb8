pub mod engine;
pub mod metrics;
pub mod weather;

pub use engine::*;
pub use metrics::*;
pub use weather::*;
