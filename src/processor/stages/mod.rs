//! Built-in processor stages.
//!
//! The default FFT chain is magnitude, then noise reduction, then
//! Savitzky–Golay smoothing. Gain and threshold are optional extras.

pub mod gain;
pub mod magnitude;
pub mod noise_reduction;
pub mod savitzky_golay;
pub mod threshold;

pub use gain::GainStage;
pub use magnitude::MagnitudeStage;
pub use noise_reduction::NoiseReductionStage;
pub use savitzky_golay::{SavitzkyGolayStage, SmoothingWindow};
pub use threshold::ThresholdStage;
