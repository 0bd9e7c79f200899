//! SavitzkyGolayStage: Circular polynomial smoothing.
//!
//! Each output sample is the weighted sum of a centered window of input
//! samples divided by the kernel's normalization constant. Indices wrap
//! around both ends of the block, so the first and last bins are smoothed
//! against each other.

use crate::config::ProcessingConfig;
use crate::pool::{ArrayPool, PooledBuffer};
use crate::processor::{check_finite, fill_buffer, process_real_parts, Processor, StageResult};
use serde::{Deserialize, Serialize};

const WINDOW_5: [f64; 5] = [-3.0, 12.0, 17.0, 12.0, -3.0];
const WINDOW_7: [f64; 7] = [-2.0, 3.0, 6.0, 7.0, 6.0, 3.0, -2.0];
const WINDOW_9: [f64; 9] = [-21.0, 14.0, 39.0, 54.0, 59.0, 54.0, 39.0, 14.0, -21.0];

/// Quadratic/cubic Savitzky–Golay kernel width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingWindow {
    Window5,
    #[default]
    Window7,
    Window9,
}

impl SmoothingWindow {
    pub fn all() -> &'static [SmoothingWindow] {
        &[
            SmoothingWindow::Window5,
            SmoothingWindow::Window7,
            SmoothingWindow::Window9,
        ]
    }

    pub fn coefficients(self) -> &'static [f64] {
        match self {
            SmoothingWindow::Window5 => &WINDOW_5,
            SmoothingWindow::Window7 => &WINDOW_7,
            SmoothingWindow::Window9 => &WINDOW_9,
        }
    }

    /// Normalization constant; equals the sum of the coefficients.
    pub fn divisor(self) -> f64 {
        match self {
            SmoothingWindow::Window5 => 35.0,
            SmoothingWindow::Window7 => 21.0,
            SmoothingWindow::Window9 => 231.0,
        }
    }

    pub fn width(self) -> usize {
        self.coefficients().len()
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SmoothingWindow::Window5 => "5-point",
            SmoothingWindow::Window7 => "7-point",
            SmoothingWindow::Window9 => "9-point",
        }
    }
}

/// Circular Savitzky–Golay smoother.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SavitzkyGolayStage {
    window: SmoothingWindow,
}

impl SavitzkyGolayStage {
    pub fn new(window: SmoothingWindow) -> Self {
        Self { window }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.smoothing_window)
    }

    pub fn window(&self) -> SmoothingWindow {
        self.window
    }

    pub fn set_window(&mut self, window: SmoothingWindow) {
        self.window = window;
    }
}

impl Processor for SavitzkyGolayStage {
    fn name(&self) -> &str {
        "Savitzky-Golay"
    }

    fn process_raw(&mut self, data: &[u8], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        process_real_parts(self, data, pool)
    }

    fn process(&mut self, data: &[f64], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        check_finite(data)?;
        let len = data.len() as isize;
        let coefficients = self.window.coefficients();
        let center = (coefficients.len() / 2) as isize;
        let divisor = self.window.divisor();

        fill_buffer(pool, data.len(), |out| {
            for (i, sample) in out.iter_mut().enumerate() {
                let sum: f64 = coefficients
                    .iter()
                    .enumerate()
                    .map(|(k, &c)| {
                        let j = (i as isize + k as isize - center).rem_euclid(len);
                        c * data[j as usize]
                    })
                    .sum();
                *sample = sum / divisor;
            }
            check_finite(out)
        })
    }
}
