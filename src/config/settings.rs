//! Per-section settings for the visualizer pipeline
//!
//! Each section is independently defaultable so a config file only needs to
//! mention the values it changes.
//!
//! # Main Types
//!
//! - [`ProcessingConfig`] - Parameters of the processor chain stages
//! - [`AnimationConfig`] - Interpolation and render cadence
//! - [`PoolConfig`] - Array pool sharding and bucket limits
//! - [`CaptureConfig`] - Capture size and rate requested from the audio source

use crate::processor::stages::SmoothingWindow;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default dB multiplier applied to magnitudes
pub const DEFAULT_DB_VALUE: f64 = 75.0;

/// Fraction of the block maximum below which a magnitude counts as noise
pub const DEFAULT_NOISE_THRESHOLD_FRACTION: f64 = 0.05;

/// Default dB floor for the noise reduction stage
pub const DEFAULT_MIN_DB: f64 = 25.0;

/// Default number of interpolation steps between two committed frames
pub const DEFAULT_INTERPOLATION_FRAMES: u32 = 20;

/// Processor chain settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Multiplier in `|db_value * log10(magnitude)|`
    pub db_value: f64,

    /// Magnitudes below `fraction * block max` are zeroed
    pub noise_threshold_fraction: f64,

    /// Samples below this floor are dropped by the noise reduction stage
    pub min_db: f64,

    /// Step between inspected samples in the noise reduction stage (1 = every sample)
    pub stride: usize,

    /// Savitzky–Golay kernel width
    pub smoothing_window: SmoothingWindow,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            db_value: DEFAULT_DB_VALUE,
            noise_threshold_fraction: DEFAULT_NOISE_THRESHOLD_FRACTION,
            min_db: DEFAULT_MIN_DB,
            stride: 1,
            smoothing_window: SmoothingWindow::default(),
        }
    }
}

/// Interpolation and render cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Steps taken from the previous frame to the current one
    pub interpolation_frames: u32,

    /// Render ticks per second for consumers that poll the queue
    pub max_fps: u32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            interpolation_frames: DEFAULT_INTERPOLATION_FRAMES,
            max_fps: 60,
        }
    }
}

impl AnimationConfig {
    /// Time between render ticks
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_fps.max(1) as f64)
    }
}

/// Array pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of bucket shards (threads hash onto a shard)
    pub shard_count: usize,

    /// Free buffers kept per (shard, length) bucket; extras are dropped
    pub max_buffers_per_bucket: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            shard_count: 8,
            max_buffers_per_bucket: 32,
        }
    }
}

/// Settings forwarded to the capture source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Bytes per captured block (two bytes per complex bin)
    pub capture_size: usize,

    /// Blocks delivered per second
    pub capture_rate_hz: u32,

    /// Sample rate of the underlying audio
    pub sample_rate_hz: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_size: 1024,
            capture_rate_hz: 20,
            sample_rate_hz: 44_100,
        }
    }
}

impl CaptureConfig {
    /// Complex bins per captured block
    pub fn bin_count(&self) -> usize {
        self.capture_size / 2
    }

    /// Time between captured blocks
    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.capture_rate_hz.max(1) as f64)
    }
}
