//! Synthetic capture source
//!
//! Stands in for a platform audio capture: a background thread synthesizes a
//! few pulsing tones, windows each block, runs a forward FFT and delivers the
//! positive-frequency bins as signed `(re, im)` byte pairs.

use crate::capture::{CaptureSink, CaptureSource};
use crate::config::CaptureConfig;
use crate::error::{Result, SpecVisError};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Window function applied before the FFT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFunction {
    /// Rectangular window (no windowing)
    Rectangular,
    /// Hann window (good general purpose)
    #[default]
    Hann,
    /// Hamming window (reduced side lobes)
    Hamming,
    /// Blackman window (very low side lobes)
    Blackman,
}

impl WindowFunction {
    pub fn display_name(&self) -> &'static str {
        match self {
            WindowFunction::Rectangular => "Rectangular",
            WindowFunction::Hann => "Hann",
            WindowFunction::Hamming => "Hamming",
            WindowFunction::Blackman => "Blackman",
        }
    }

    pub fn all() -> &'static [WindowFunction] {
        &[
            WindowFunction::Rectangular,
            WindowFunction::Hann,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
        ]
    }

    /// Window coefficient at position i out of n samples
    pub fn coefficient(&self, i: usize, n: usize) -> f64 {
        let phase = 2.0 * PI * i as f64 / n as f64;

        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 * (1.0 - phase.cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * phase.cos(),
            // Clamped: 0.42 and 0.08 are inexact and can give -ε at the ends.
            WindowFunction::Blackman => (0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()).max(0.0),
        }
    }

    pub fn generate(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }

    /// Mean coefficient, used to undo the window's amplitude loss.
    fn coherent_gain(&self) -> f64 {
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5,
            WindowFunction::Hamming => 0.54,
            WindowFunction::Blackman => 0.42,
        }
    }
}

/// A sine component of the synthetic signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Tone {
    pub frequency_hz: f64,
    /// Peak amplitude in `[0, 1]` relative to full scale.
    pub amplitude: f64,
    /// Rate of the amplitude envelope; 0 keeps the tone steady.
    pub pulse_hz: f64,
}

impl Tone {
    pub fn new(frequency_hz: f64, amplitude: f64) -> Self {
        Self {
            frequency_hz,
            amplitude,
            pulse_hz: 0.0,
        }
    }

    pub fn with_pulse(mut self, pulse_hz: f64) -> Self {
        self.pulse_hz = pulse_hz;
        self
    }

    /// Envelope is full scale at t = 0 and dips to half.
    fn amplitude_at(&self, t: f64) -> f64 {
        self.amplitude * (0.75 + 0.25 * (2.0 * PI * self.pulse_hz * t).cos())
    }
}

/// Renders FFT capture blocks for a set of tones.
pub struct SpectrumGenerator {
    fft: Option<Arc<dyn Fft<f64>>>,
    window: Vec<f64>,
    /// Maps a full-scale bin to 1.0.
    scale: f64,
    tones: Vec<Tone>,
    sample_rate: f64,
    capture_interval: f64,
    scratch: Vec<Complex<f64>>,
}

impl SpectrumGenerator {
    pub fn new(config: &CaptureConfig, tones: Vec<Tone>, window: WindowFunction) -> Self {
        let n = config.capture_size;
        let fft = (n > 0).then(|| FftPlanner::<f64>::new().plan_fft_forward(n));
        let scale = if n > 0 {
            1.0 / (n as f64 / 2.0 * window.coherent_gain())
        } else {
            0.0
        };

        Self {
            fft,
            window: window.generate(n),
            scale,
            tones,
            sample_rate: config.sample_rate_hz.max(1) as f64,
            capture_interval: config.capture_interval().as_secs_f64(),
            scratch: Vec::with_capacity(n),
        }
    }

    pub fn block_len(&self) -> usize {
        self.window.len()
    }

    /// Render the `index`-th capture block.
    pub fn render(&mut self, index: u64) -> Vec<u8> {
        let n = self.window.len();
        let Some(fft) = self.fft.as_ref() else {
            return Vec::new();
        };
        let start = index as f64 * self.capture_interval;

        self.scratch.clear();
        self.scratch.extend((0..n).map(|i| {
            let t = start + i as f64 / self.sample_rate;
            let sample: f64 = self
                .tones
                .iter()
                .map(|tone| tone.amplitude_at(start) * (2.0 * PI * tone.frequency_hz * t).sin())
                .sum();
            Complex::new(sample * self.window[i], 0.0)
        }));
        fft.process(&mut self.scratch);

        let quantize = |v: f64| (v * self.scale * 127.0).round().clamp(-128.0, 127.0) as i8 as u8;
        self.scratch[..n / 2]
            .iter()
            .flat_map(|c| [quantize(c.re), quantize(c.im)])
            .collect()
    }
}

/// Default tone set for demos.
pub fn default_tones() -> Vec<Tone> {
    vec![
        Tone::new(440.0, 0.6).with_pulse(0.5),
        Tone::new(1760.0, 0.4).with_pulse(1.25),
        Tone::new(5000.0, 0.25).with_pulse(2.0),
    ]
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Capture source backed by [`SpectrumGenerator`] on a background thread.
pub struct SyntheticCapture {
    config: CaptureConfig,
    tones: Vec<Tone>,
    window: WindowFunction,
    worker: Option<Worker>,
    released: bool,
}

impl SyntheticCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            tones: default_tones(),
            window: WindowFunction::default(),
            worker: None,
            released: false,
        }
    }

    pub fn with_tones(mut self, tones: Vec<Tone>) -> Self {
        self.tones = tones;
        self
    }

    pub fn with_window(mut self, window: WindowFunction) -> Self {
        self.window = window;
        self
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn generator(&self) -> SpectrumGenerator {
        SpectrumGenerator::new(&self.config, self.tones.clone(), self.window)
    }
}

impl CaptureSource for SyntheticCapture {
    fn start(&mut self, sink: CaptureSink) -> Result<()> {
        if self.released {
            return Err(SpecVisError::Capture("capture source released".to_string()));
        }
        if self.worker.is_some() {
            return Err(SpecVisError::Capture("capture already running".to_string()));
        }

        let mut generator = self.generator();
        let interval = self.config.capture_interval();
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("synthetic-capture".to_string())
            .spawn(move || {
                tracing::info!("Synthetic capture thread started");
                let mut index = 0u64;
                loop {
                    let block = generator.render(index);
                    sink(block.as_slice());
                    index += 1;

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                tracing::info!("Synthetic capture thread exiting after {} blocks", index);
            })?;

        self.worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        drop(worker.stop_tx);
        // Stopped from inside the sink: the loop exits once the sink returns.
        if worker.handle.thread().id() == std::thread::current().id() {
            tracing::debug!("Synthetic capture stopped from its own thread");
            return Ok(());
        }
        worker
            .handle
            .join()
            .map_err(|_| SpecVisError::Capture("capture thread panicked".to_string()))
    }

    fn release(&mut self) -> Result<()> {
        let result = self.stop();
        self.released = true;
        result
    }
}

impl Drop for SyntheticCapture {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Failed to stop synthetic capture: {}", e);
        }
    }
}
