//! Ordered stage list that turns one raw capture block into one frame.
//!
//! The chain hands the raw bytes to the first stage, then feeds each output
//! to the next stage, recycling the previous output as soon as it has been
//! consumed. On a stage failure the in-flight intermediate is recycled too,
//! so a failed frame never leaves a live lease behind.

use crate::config::ProcessingConfig;
use crate::pool::{ArrayPool, PooledBuffer};
use crate::processor::error::{PipelineError, PipelineResult, StageError};
use crate::processor::stages::{MagnitudeStage, NoiseReductionStage, SavitzkyGolayStage};
use crate::processor::AnyStage;
use std::fmt;

/// Stable handle to a stage in a [`ProcessorChain`]. Ids are never reused
/// within one chain, so a handle stays valid across inserts and removals.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StageId(pub u32);

impl StageId {
    pub const INVALID: StageId = StageId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Debug for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "StageId(INVALID)")
        } else {
            write!(f, "StageId({})", self.0)
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct StageSlot {
    id: StageId,
    stage: AnyStage,
}

impl StageSlot {
    fn error(&self, source: StageError) -> PipelineError {
        PipelineError::Stage {
            stage_id: self.id,
            name: self.stage.name().to_string(),
            source,
        }
    }
}

/// An ordered, editable sequence of processor stages.
#[derive(Default)]
pub struct ProcessorChain {
    stages: Vec<StageSlot>,
    next_id: u32,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Magnitude, noise reduction and 7-point smoothing with default parameters.
    pub fn default_fft() -> Self {
        Self::from_config(&ProcessingConfig::default())
    }

    /// The default FFT chain built from the processing settings.
    pub fn from_config(config: &ProcessingConfig) -> Self {
        let mut chain = Self::new();
        chain.add(MagnitudeStage::from_config(config));
        chain.add(NoiseReductionStage::from_config(config));
        chain.add(SavitzkyGolayStage::from_config(config));
        chain
    }

    fn allocate_id(&mut self) -> StageId {
        let id = StageId(self.next_id);
        self.next_id += 1;
        id
    }

    fn position(&self, id: StageId) -> Option<usize> {
        self.stages.iter().position(|slot| slot.id == id)
    }

    /// Append a stage at the end of the chain.
    pub fn add(&mut self, stage: impl Into<AnyStage>) -> StageId {
        let stage = stage.into();
        let id = self.allocate_id();
        tracing::debug!("Added stage {} ({})", id, stage.name());
        self.stages.push(StageSlot { id, stage });
        id
    }

    /// Insert a stage at `index`, clamped to the chain length.
    pub fn insert(&mut self, index: usize, stage: impl Into<AnyStage>) -> StageId {
        let stage = stage.into();
        let id = self.allocate_id();
        let index = index.min(self.stages.len());
        tracing::debug!("Inserted stage {} ({}) at {}", id, stage.name(), index);
        self.stages.insert(index, StageSlot { id, stage });
        id
    }

    /// Remove a stage, returning it if the id was present.
    pub fn remove(&mut self, id: StageId) -> Option<AnyStage> {
        let index = self.position(id)?;
        let slot = self.stages.remove(index);
        tracing::debug!("Removed stage {} ({})", id, slot.stage.name());
        Some(slot.stage)
    }

    /// Swap the stage behind `id` for a new one, keeping its position and id.
    /// Returns the previous stage, or `None` if the id is unknown (in which
    /// case the new stage is dropped).
    pub fn replace(&mut self, id: StageId, stage: impl Into<AnyStage>) -> Option<AnyStage> {
        let index = self.position(id)?;
        let stage = stage.into();
        tracing::debug!(
            "Replaced stage {} ({} -> {})",
            id,
            self.stages[index].stage.name(),
            stage.name()
        );
        Some(std::mem::replace(&mut self.stages[index].stage, stage))
    }

    pub fn clear(&mut self) {
        self.stages.clear();
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn ids(&self) -> Vec<StageId> {
        self.stages.iter().map(|slot| slot.id).collect()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|slot| slot.stage.name()).collect()
    }

    pub fn get(&self, id: StageId) -> Option<&AnyStage> {
        self.position(id).map(|index| &self.stages[index].stage)
    }

    pub fn get_mut(&mut self, id: StageId) -> Option<&mut AnyStage> {
        let index = self.position(id)?;
        Some(&mut self.stages[index].stage)
    }

    /// Run one raw capture block through every stage.
    ///
    /// An empty chain yields a zero-length buffer.
    pub fn process(&mut self, data: &[u8], pool: &ArrayPool) -> PipelineResult<PooledBuffer> {
        let mut slots = self.stages.iter_mut();
        let Some(first) = slots.next() else {
            return Ok(pool.acquire(0));
        };

        let mut current = match first.stage.process_raw(data, pool) {
            Ok(buffer) => buffer,
            Err(e) => return Err(first.error(e)),
        };

        for slot in slots {
            let next = slot.stage.process(&current, pool);
            pool.recycle(current);
            current = match next {
                Ok(buffer) => buffer,
                Err(e) => return Err(slot.error(e)),
            };
        }

        Ok(current)
    }
}

impl fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|slot| (slot.id, slot.stage.name())))
            .finish()
    }
}
