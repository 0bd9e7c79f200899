//! NoiseReductionStage: Drop quiet samples and compact the rest.
//!
//! Walks the input with a fixed stride, skips every sample below the dB
//! floor and packs the survivors at the front of an output buffer of the
//! same length. The tail is zero-filled. Output positions do not line up
//! with input positions once a sample has been dropped.

use crate::config::{ProcessingConfig, DEFAULT_MIN_DB};
use crate::pool::{ArrayPool, PooledBuffer};
use crate::processor::{check_finite, fill_buffer, process_real_parts, Processor, StageResult};

/// Compacting dB-floor filter with optional decimation.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseReductionStage {
    min_db: f64,
    /// Always at least 1.
    stride: usize,
}

impl NoiseReductionStage {
    pub fn new() -> Self {
        Self {
            min_db: DEFAULT_MIN_DB,
            stride: 1,
        }
    }

    /// A stride of 0 is treated as 1.
    pub fn with_params(min_db: f64, stride: usize) -> Self {
        Self {
            min_db,
            stride: stride.max(1),
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::with_params(config.min_db, config.stride)
    }

    pub fn min_db(&self) -> f64 {
        self.min_db
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl Default for NoiseReductionStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for NoiseReductionStage {
    fn name(&self) -> &str {
        "Noise Reduction"
    }

    fn process_raw(&mut self, data: &[u8], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        process_real_parts(self, data, pool)
    }

    fn process(&mut self, data: &[f64], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        check_finite(data)?;
        fill_buffer(pool, data.len(), |out| {
            let mut kept = 0;
            for &value in data.iter().step_by(self.stride) {
                if value < self.min_db {
                    continue;
                }
                out[kept] = value;
                kept += 1;
            }
            out[kept..].fill(0.0);
            Ok(())
        })
    }
}
