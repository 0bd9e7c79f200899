//! Processor-specific error types.

use crate::processor::chain::StageId;
use thiserror::Error;

/// Failure inside a single stage. The stage has already recycled any buffer
/// it allocated before returning one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("raw input must hold (real, imaginary) byte pairs, got {len} bytes")]
    OddLength { len: usize },

    #[error("non-finite sample at index {index}")]
    NonFinite { index: usize },

    #[error("{0}")]
    Custom(String),
}

pub type StageResult<T> = std::result::Result<T, StageError>;

/// Errors that can occur while driving frames through the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage {stage_id} ({name}) failed: {source}")]
    Stage {
        stage_id: StageId,
        name: String,
        #[source]
        source: StageError,
    },

    #[error("Pipeline not running")]
    NotRunning,

    #[error("Pipeline released")]
    Released,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
