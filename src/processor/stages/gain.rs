//! GainStage: Scale every sample by a constant factor.

use crate::pool::{ArrayPool, PooledBuffer};
use crate::processor::stages::MagnitudeStage;
use crate::processor::{check_finite, fill_buffer, Processor, StageResult};

#[derive(Debug, Clone, PartialEq)]
pub struct GainStage {
    factor: f64,
    /// Converts raw bytes when this stage sits first in a chain.
    magnitude: MagnitudeStage,
}

impl GainStage {
    pub fn new(factor: f64) -> Self {
        Self {
            factor,
            magnitude: MagnitudeStage::new(),
        }
    }

    pub fn with_magnitude(mut self, magnitude: MagnitudeStage) -> Self {
        self.magnitude = magnitude;
        self
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn set_factor(&mut self, factor: f64) {
        self.factor = factor;
    }
}

impl Default for GainStage {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Processor for GainStage {
    fn name(&self) -> &str {
        "Gain"
    }

    fn process_raw(&mut self, data: &[u8], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        let mut output = self.magnitude.process_raw(data, pool)?;
        output.iter_mut().for_each(|v| *v *= self.factor);
        if let Err(e) = check_finite(&output) {
            pool.recycle(output);
            return Err(e);
        }
        Ok(output)
    }

    fn process(&mut self, data: &[f64], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        fill_buffer(pool, data.len(), |out| {
            for (o, &v) in out.iter_mut().zip(data) {
                *o = v * self.factor;
            }
            check_finite(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scales_samples() {
        let pool = ArrayPool::new();
        let mut stage = GainStage::new(2.5);
        let out = stage.process(&[1.0, -2.0, 0.0], &pool).unwrap();
        assert_eq!(&out[..], &[2.5, -5.0, 0.0]);
        pool.recycle(out);
    }

    #[test]
    fn test_raw_entry_scales_magnitudes() {
        let pool = ArrayPool::new();
        let mut stage = GainStage::new(2.0);
        let out = stage.process_raw(&[3, 4, 0, 0], &pool).unwrap();
        assert!((out[0] - 150.0 * 5f64.log10()).abs() < 1e-9);
        assert_eq!(out[1], 0.0);
        pool.recycle(out);
    }

    #[test]
    fn test_overflow_is_rejected_without_leaking() {
        let pool = ArrayPool::new();
        let mut stage = GainStage::new(f64::MAX);
        assert!(stage.process(&[10.0], &pool).is_err());
        assert!(stage.process_raw(&[100, 100], &pool).is_err());
        assert_eq!(pool.stats().live, 0);
    }
}
