//! ThresholdStage: Zero every sample below an absolute floor.
//!
//! Unlike noise reduction this keeps bin positions intact.

use crate::pool::{ArrayPool, PooledBuffer};
use crate::processor::stages::MagnitudeStage;
use crate::processor::{fill_buffer, Processor, StageResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdStage {
    threshold: f64,
    magnitude: MagnitudeStage,
}

impl ThresholdStage {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            magnitude: MagnitudeStage::new(),
        }
    }

    pub fn with_magnitude(mut self, magnitude: MagnitudeStage) -> Self {
        self.magnitude = magnitude;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    fn apply(&self, samples: &mut [f64]) {
        for v in samples.iter_mut().filter(|v| **v < self.threshold) {
            *v = 0.0;
        }
    }
}

impl Default for ThresholdStage {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Processor for ThresholdStage {
    fn name(&self) -> &str {
        "Threshold"
    }

    fn process_raw(&mut self, data: &[u8], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        let mut output = self.magnitude.process_raw(data, pool)?;
        self.apply(&mut output);
        Ok(output)
    }

    fn process(&mut self, data: &[f64], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        fill_buffer(pool, data.len(), |out| {
            out.copy_from_slice(data);
            self.apply(out);
            Ok(())
        })
    }
}
