//! Processor chain: raw FFT bytes in, smoothed magnitude curve out.
//!
//! Every stage has two entry points. The first stage of a chain receives the
//! raw capture bytes (`process_raw`); every later stage receives the previous
//! stage's output (`process`). Stages read their input by reference and
//! return a freshly leased [`PooledBuffer`]; the chain recycles each
//! intermediate buffer once the next stage has consumed it.
//!
//! Two-layer design:
//! - **`Processor` trait**: for user-supplied stages.
//! - **`BuiltinStage` enum**: for the built-in stages, dispatched by `match`.
//!
//! `AnyStage` wraps either variant so the chain can handle both uniformly.

pub mod chain;
pub mod error;
pub mod stages;

pub use chain::{ProcessorChain, StageId};
pub use error::{PipelineError, PipelineResult, StageError, StageResult};

use crate::pool::{ArrayPool, PooledBuffer};
use stages::{GainStage, MagnitudeStage, NoiseReductionStage, SavitzkyGolayStage, ThresholdStage};

/// A transform stage with the two chain entry points.
pub trait Processor: Send {
    /// Human-readable name of this stage.
    fn name(&self) -> &str;

    /// Consume raw capture bytes `[re0, im0, re1, im1, ...]`.
    fn process_raw(&mut self, data: &[u8], pool: &ArrayPool) -> StageResult<PooledBuffer>;

    /// Consume the previous stage's output.
    fn process(&mut self, data: &[f64], pool: &ArrayPool) -> StageResult<PooledBuffer>;
}

/// Lease a `len`-sample buffer and let `fill` write it. The buffer goes back
/// to the pool if `fill` fails, so no error path leaks a lease.
pub fn fill_buffer<F>(pool: &ArrayPool, len: usize, fill: F) -> StageResult<PooledBuffer>
where
    F: FnOnce(&mut [f64]) -> StageResult<()>,
{
    let mut output = pool.acquire(len);
    match fill(&mut output) {
        Ok(()) => Ok(output),
        Err(e) => {
            pool.recycle(output);
            Err(e)
        }
    }
}

/// Check that raw input is made of whole (real, imaginary) pairs.
pub(crate) fn check_pairs(data: &[u8]) -> StageResult<usize> {
    if data.len() % 2 != 0 {
        return Err(StageError::OddLength { len: data.len() });
    }
    Ok(data.len() / 2)
}

/// Fail on the first NaN or infinite sample.
pub(crate) fn check_finite(samples: &[f64]) -> StageResult<()> {
    match samples.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(StageError::NonFinite { index }),
        None => Ok(()),
    }
}

/// Run `process` over the real component of each raw pair.
///
/// Used by stages that are not meant to sit first in a chain but still have
/// to accept raw bytes.
pub(crate) fn process_real_parts<P>(stage: &mut P, data: &[u8], pool: &ArrayPool) -> StageResult<PooledBuffer>
where
    P: Processor + ?Sized,
{
    let bins = check_pairs(data)?;
    let real = fill_buffer(pool, bins, |out| {
        for (sample, pair) in out.iter_mut().zip(data.chunks_exact(2)) {
            *sample = pair[0] as i8 as f64;
        }
        Ok(())
    })?;

    let result = stage.process(&real, pool);
    pool.recycle(real);
    result
}

/// Enum dispatch for built-in stages.
pub enum BuiltinStage {
    Magnitude(MagnitudeStage),
    NoiseReduction(NoiseReductionStage),
    SavitzkyGolay(SavitzkyGolayStage),
    Gain(GainStage),
    Threshold(ThresholdStage),
}

impl BuiltinStage {
    pub fn name(&self) -> &str {
        match self {
            BuiltinStage::Magnitude(s) => s.name(),
            BuiltinStage::NoiseReduction(s) => s.name(),
            BuiltinStage::SavitzkyGolay(s) => s.name(),
            BuiltinStage::Gain(s) => s.name(),
            BuiltinStage::Threshold(s) => s.name(),
        }
    }

    pub fn process_raw(&mut self, data: &[u8], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        match self {
            BuiltinStage::Magnitude(s) => s.process_raw(data, pool),
            BuiltinStage::NoiseReduction(s) => s.process_raw(data, pool),
            BuiltinStage::SavitzkyGolay(s) => s.process_raw(data, pool),
            BuiltinStage::Gain(s) => s.process_raw(data, pool),
            BuiltinStage::Threshold(s) => s.process_raw(data, pool),
        }
    }

    pub fn process(&mut self, data: &[f64], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        match self {
            BuiltinStage::Magnitude(s) => s.process(data, pool),
            BuiltinStage::NoiseReduction(s) => s.process(data, pool),
            BuiltinStage::SavitzkyGolay(s) => s.process(data, pool),
            BuiltinStage::Gain(s) => s.process(data, pool),
            BuiltinStage::Threshold(s) => s.process(data, pool),
        }
    }
}

/// Wrapper that holds either a built-in stage (enum dispatch) or a plugin (trait object).
pub enum AnyStage {
    Builtin(BuiltinStage),
    Plugin(Box<dyn Processor>),
}

impl AnyStage {
    pub fn name(&self) -> &str {
        match self {
            AnyStage::Builtin(s) => s.name(),
            AnyStage::Plugin(s) => s.name(),
        }
    }

    pub fn process_raw(&mut self, data: &[u8], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        match self {
            AnyStage::Builtin(s) => s.process_raw(data, pool),
            AnyStage::Plugin(s) => s.process_raw(data, pool),
        }
    }

    pub fn process(&mut self, data: &[f64], pool: &ArrayPool) -> StageResult<PooledBuffer> {
        match self {
            AnyStage::Builtin(s) => s.process(data, pool),
            AnyStage::Plugin(s) => s.process(data, pool),
        }
    }

    /// Wrap a user-supplied stage.
    pub fn plugin(stage: impl Processor + 'static) -> Self {
        AnyStage::Plugin(Box::new(stage))
    }
}

impl std::fmt::Debug for AnyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyStage").field(&self.name()).finish()
    }
}

macro_rules! impl_builtin_from {
    ($($variant:ident($stage:ty)),* $(,)?) => {
        $(
            impl From<$stage> for AnyStage {
                fn from(stage: $stage) -> Self {
                    AnyStage::Builtin(BuiltinStage::$variant(stage))
                }
            }
        )*
    };
}

impl_builtin_from!(
    Magnitude(MagnitudeStage),
    NoiseReduction(NoiseReductionStage),
    SavitzkyGolay(SavitzkyGolayStage),
    Gain(GainStage),
    Threshold(ThresholdStage),
);
