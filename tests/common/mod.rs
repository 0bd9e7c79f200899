//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::Duration;

/// Upper bound for waits on background threads
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Assert two sample slices are element-wise approximately equal
pub fn assert_samples_eq(actual: &[f64], expected: &[f64], epsilon: f64) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() < epsilon,
            "sample {}: expected {} to be approximately equal to {}",
            i,
            a,
            e
        );
    }
}

/// `|75 * log10(magnitude)|`, the default dB mapping
pub fn db(magnitude: f64) -> f64 {
    (75.0 * magnitude.log10()).abs()
}
