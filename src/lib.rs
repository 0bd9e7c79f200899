//! # SpecVis-RS: Spectrum Visualizer Core
//!
//! Turns raw FFT capture blocks into a smooth, animated loudness curve. The
//! architecture separates the capture thread (producer) from the render tick
//! (consumer) with a newest-wins hand-off, so neither side ever waits on the
//! other.
//!
//! ## Architecture
//!
//! - **Pool**: recycling allocator for `f64` buffers with generational,
//!   lease-counted handles shared by both threads
//! - **Processor**: ordered chain of stages (magnitude/dB, noise reduction,
//!   Savitzky–Golay smoothing, plus gain and threshold)
//! - **Queue**: newest-wins slot and per-tick interpolation between frames
//! - **Driver**: wires a capture source through the chain into the queue
//! - **Capture**: the capture source interface and a synthetic FFT source
//!
//! ## Configuration
//!
//! A [`VisualizerConfig`] is read from TOML or JSON, by default from the
//! platform config directory under `specvis-rs`:
//!
//! - **Linux**: `~/.config/specvis-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/specvis-rs/config.toml`
//! - **Windows**: `%APPDATA%\specvis-rs\config.toml`
//!
//! ## Example
//!
//! ```ignore
//! use specvis_rs::{capture::SyntheticCapture, PipelineDriver, VisualizerConfig};
//! use std::sync::Arc;
//!
//! let config = VisualizerConfig::default();
//! let driver = Arc::new(
//!     PipelineDriver::from_config(&config)
//!         .with_source(Box::new(SyntheticCapture::new(config.capture.clone()))),
//! );
//! driver.start()?;
//!
//! // Once per render tick:
//! driver.acquire_buffer();
//! if let Some(frame) = driver.interpolated() {
//!     draw(&frame);
//! }
//! ```

pub mod capture;
pub mod config;
pub mod driver;
pub mod error;
pub mod pool;
pub mod processor;
pub mod queue;

// Re-export commonly used types
pub use capture::{CaptureSink, CaptureSource, SyntheticCapture};
pub use config::VisualizerConfig;
pub use driver::{DriverStats, FrameListener, PipelineDriver};
pub use error::{Result, SpecVisError};
pub use pool::{ArrayPool, BufferId, PoolStats, PooledBuffer, SharedBuffer};
pub use processor::{AnyStage, PipelineError, Processor, ProcessorChain, StageError, StageId};
pub use queue::{AnimatedDataQueue, Frame, QueueSignal};
