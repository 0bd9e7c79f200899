//! Spectrum Visualizer - Headless Demo
//!
//! Feeds the synthetic capture source through the default processor chain and
//! logs a coarse bar view of the interpolated frames.
//!
//! Environment:
//! - `SPECVIS_CONFIG`: config file to load (defaults to the platform config path)
//! - `SPECVIS_RUN_SECS`: how long to run (default 5)
//! - `RUST_LOG`: log filter

use anyhow::Context;
use specvis_rs::{
    capture::SyntheticCapture, config::VisualizerConfig, PipelineDriver, QueueSignal,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const BAR_COUNT: usize = 16;
const BAR_LEVELS: &[char] = &[' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,specvis_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting spectrum visualizer demo");

    let config_path = match std::env::var_os("SPECVIS_CONFIG") {
        Some(path) => PathBuf::from(path),
        None => VisualizerConfig::default_path()?,
    };
    let config = VisualizerConfig::load_or_default(&config_path);
    tracing::info!("Using config {:?}", config_path);

    let run_for = std::env::var("SPECVIS_RUN_SECS")
        .ok()
        .map(|secs| secs.parse::<u64>())
        .transpose()
        .context("SPECVIS_RUN_SECS must be a whole number of seconds")?
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(5));

    let source = SyntheticCapture::new(config.capture.clone());
    let driver = Arc::new(PipelineDriver::from_config(&config).with_source(Box::new(source)));
    tracing::info!("Processor chain: {}", driver.stage_names().join(" -> "));

    let signals = driver.queue().signals();
    driver.start().context("Failed to start pipeline")?;

    let tick = config.animation.frame_interval();
    let started = Instant::now();
    let mut ticks = 0u64;
    while started.elapsed() < run_for {
        if let Ok(QueueSignal::BufferAvailable) = signals.try_recv() {
            driver.acquire_buffer();
        }
        if let Some(frame) = driver.interpolated() {
            // Log roughly twice a second.
            if ticks % (config.animation.max_fps as u64 / 2).max(1) == 0 {
                tracing::info!("[{}] progress {:.2}", bars(&frame), frame.progress());
            }
        }
        ticks += 1;
        std::thread::sleep(tick);
    }

    driver.stop().context("Failed to stop pipeline")?;
    let stats = driver.stats();
    tracing::info!(
        "Processed {} frames ({} dropped, {} overwritten before display)",
        stats.frames_processed,
        stats.frames_dropped,
        stats.queue.overwritten
    );
    driver.release().context("Failed to release pipeline")?;

    tracing::info!("Spectrum visualizer demo exiting");
    Ok(())
}

/// Collapse a frame into `BAR_COUNT` bars scaled to the frame maximum.
fn bars(frame: &[f64]) -> String {
    if frame.is_empty() {
        return String::new();
    }
    let chunk = frame.len().div_ceil(BAR_COUNT);
    let peaks: Vec<f64> = frame
        .chunks(chunk)
        .map(|c| c.iter().copied().fold(0.0, f64::max))
        .collect();
    let max = peaks.iter().copied().fold(0.0, f64::max);
    if max <= 0.0 {
        return " ".repeat(peaks.len());
    }

    let top = (BAR_LEVELS.len() - 1) as f64;
    peaks
        .iter()
        .map(|&p| BAR_LEVELS[((p / max) * top).round() as usize])
        .collect()
}
