//! The de-identification + confidence-gated transformation pipeline.
//!
//! One transaction flows strictly in stage order:
//! Redact → Extract → Map/Build → Assemble/Validate → Gate.
//! Each stage consumes the complete output of the previous one; the only
//! external call is the entity extraction service.

pub mod deidentify;
pub mod extraction;
pub mod fhir;
pub mod gate;
pub mod orchestrator;
pub mod result;
pub mod terminology;

pub use orchestrator::ScribePipeline;
pub use result::{PipelineResult, Stage, StageRecord, StageStatus};

use thiserror::Error;

/// Errors that abort a transaction before the gate is reached.
///
/// Validation failures are deliberately absent: a bundle that fails
/// validation is recorded and routed to review, not aborted.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("redaction failed: {0}")]
    Redaction(#[from] deidentify::RedactionError),

    #[error("extraction failed: {0}")]
    Extraction(#[from] extraction::ExtractionError),

    #[error("internal error in stage {stage}: {reason}")]
    Internal { stage: Stage, reason: String },
}

impl PipelineError {
    /// The stage this error is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Redaction(_) => Stage::Deidentification,
            Self::Extraction(_) => Stage::Extraction,
            Self::Internal { stage, .. } => *stage,
        }
    }
}
