//! MagnitudeStage: Complex bins to a dB-scaled loudness curve.
//!
//! Each raw (real, imaginary) byte pair becomes its Euclidean magnitude.
//! Magnitudes below a fraction of the block maximum are zeroed as noise; the
//! rest are mapped to `|db_value * log10(magnitude)|`. Silent bins stay at
//! exactly zero.

use crate::config::{ProcessingConfig, DEFAULT_DB_VALUE, DEFAULT_NOISE_THRESHOLD_FRACTION};
use crate::pool::{ArrayPool, PooledBuffer};
use crate::processor::{check_finite, check_pairs, fill_buffer, Processor, StageResult};

/// Magnitude extraction with a relative noise floor and dB scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnitudeStage {
    db_value: f64,
    noise_threshold_fraction: f64,
}

impl MagnitudeStage {
    pub fn new() -> Self {
        Self {
            db_value: DEFAULT_DB_VALUE,
            noise_threshold_fraction: DEFAULT_NOISE_THRESHOLD_FRACTION,
        }
    }

    pub fn with_params(db_value: f64, noise_threshold_fraction: f64) -> Self {
        Self {
            db_value,
            noise_threshold_fraction,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::with_params(config.db_value, config.noise_threshold_fraction)
    }

    pub fn db_value(&self) -> f64 {
        self.db_value
    }

    pub fn noise_threshold_fraction(&self) -> f64 {
        self.noise_threshold_fraction
    }

    /// Apply the noise floor and dB mapping to raw magnitudes in place.
    fn scale(&self, magnitudes: &mut [f64]) {
        let max = magnitudes.iter().copied().fold(0.0, f64::max);
        let threshold = if max > 0.0 {
            max * self.noise_threshold_fraction
        } else {
            0.0
        };

        for m in magnitudes.iter_mut() {
            if *m < threshold {
                *m = 0.0;
            }
            if *m > 0.0 {
                *m = (self.db_value * m.log10()).abs();
            }
        }
    }
}

impl Default for MagnitudeStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for MagnitudeStage {
    fn name(&self) -> &str {
        "Magnitude"
    }

    fn process_raw(&mut self, data: &[u8], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        let bins = check_pairs(data)?;
        fill_buffer(pool, bins, |out| {
            for (m, pair) in out.iter_mut().zip(data.chunks_exact(2)) {
                let re = pair[0] as i8 as f64;
                let im = pair[1] as i8 as f64;
                *m = re.hypot(im);
            }
            self.scale(out);
            check_finite(out)
        })
    }

    /// Already-converted data passes through unchanged.
    fn process(&mut self, data: &[f64], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        fill_buffer(pool, data.len(), |out| {
            out.copy_from_slice(data);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::StageError;

    #[test]
    fn test_pair_magnitudes_are_db_scaled() {
        let pool = ArrayPool::new();
        let mut stage = MagnitudeStage::new();
        let out = stage.process_raw(&[3, 4, 0, 0], &pool).unwrap();

        assert_eq!(out.len(), 2);
        assert!((out[0] - 75.0 * 5f64.log10()).abs() < 1e-9);
        assert!((out[0] - 52.42).abs() < 0.01);
        assert_eq!(out[1], 0.0);
        pool.recycle(out);
    }

    #[test]
    fn test_bytes_are_signed_components() {
        let pool = ArrayPool::new();
        let mut stage = MagnitudeStage::new();
        // 0xFD = -3, 0xFC = -4
        let out = stage.process_raw(&[0xFD, 0xFC], &pool).unwrap();
        assert!((out[0] - 75.0 * 5f64.log10()).abs() < 1e-9);
        pool.recycle(out);
    }

    #[test]
    fn test_noise_floor_is_relative_to_block_max() {
        let pool = ArrayPool::new();
        let mut stage = MagnitudeStage::with_params(75.0, 0.5);
        // magnitudes 100, 40, 60 -> threshold 50 drops the 40
        let out = stage.process_raw(&[100, 0, 40, 0, 0, 60], &pool).unwrap();
        assert!(out[0] > 0.0);
        assert_eq!(out[1], 0.0);
        assert!(out[2] > 0.0);
        pool.recycle(out);
    }

    #[test]
    fn test_unit_magnitude_maps_to_zero() {
        let pool = ArrayPool::new();
        let mut stage = MagnitudeStage::new();
        let out = stage.process_raw(&[1, 0], &pool).unwrap();
        assert_eq!(out[0], 0.0);
        pool.recycle(out);
    }

    #[test]
    fn test_silence_and_empty_input() {
        let pool = ArrayPool::new();
        let mut stage = MagnitudeStage::new();

        let out = stage.process_raw(&[0; 8], &pool).unwrap();
        assert_eq!(&out[..], &[0.0; 4]);
        pool.recycle(out);

        let out = stage.process_raw(&[], &pool).unwrap();
        assert!(out.is_empty());
        pool.recycle(out);
    }

    #[test]
    fn test_odd_length_fails_without_leaking() {
        let pool = ArrayPool::new();
        let mut stage = MagnitudeStage::new();
        let err = stage.process_raw(&[1, 2, 3], &pool).unwrap_err();
        assert_eq!(err, StageError::OddLength { len: 3 });
        assert_eq!(pool.stats().live, 0);
    }

    #[test]
    fn test_buffer_entry_passes_through() {
        let pool = ArrayPool::new();
        let mut stage = MagnitudeStage::new();
        let out = stage.process(&[1.5, -2.0], &pool).unwrap();
        assert_eq!(&out[..], &[1.5, -2.0]);
        pool.recycle(out);
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_output_has_one_non_negative_sample_per_pair(
            pairs in prop::collection::vec(any::<(u8, u8)>(), 0..256)
        ) {
            let raw: Vec<u8> = pairs.iter().flat_map(|&(re, im)| [re, im]).collect();
            let pool = ArrayPool::new();
            let mut stage = MagnitudeStage::new();
            let out = stage.process_raw(&raw, &pool).unwrap();

            prop_assert_eq!(out.len(), pairs.len());
            prop_assert!(out.iter().all(|&v| v >= 0.0));
            if pairs.iter().all(|&(re, im)| re == 0 && im == 0) {
                prop_assert!(out.iter().all(|&v| v == 0.0));
            }
            pool.recycle(out);
        }
    }
}
