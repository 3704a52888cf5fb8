//! Resampling & alignment engine
//!
//! Turns raw meter and weather observations into equally spaced, gap-free inputs
//! for the model trainer and the forecast engine.

pub mod align;
pub mod resample;

pub use align::{AlignedSeries, Aligner, TailFill};
pub use resample::Resampler;
