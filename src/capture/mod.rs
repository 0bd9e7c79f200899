//! Audio capture collaborator interface.
//!
//! A capture source delivers raw FFT blocks (`[re0, im0, re1, im1, ...]`,
//! one signed byte per component) to a sink at its own rate, on its own
//! thread. The pipeline driver forwards its `start`/`stop`/`release`
//! lifecycle to the source.

pub mod synthetic;

pub use synthetic::{default_tones, SpectrumGenerator, SyntheticCapture, Tone, WindowFunction};

use crate::error::Result;
use std::sync::Arc;

/// Callback invoked by a capture source for every captured block.
pub type CaptureSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// A producer of raw FFT capture blocks.
pub trait CaptureSource: Send {
    /// Begin delivering blocks to `sink`.
    fn start(&mut self, sink: CaptureSink) -> Result<()>;

    /// Stop delivering blocks. The source may be started again.
    fn stop(&mut self) -> Result<()>;

    /// Stop and free the underlying device. The source cannot be restarted.
    fn release(&mut self) -> Result<()>;
}
