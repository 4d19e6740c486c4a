//! Per-transaction result types.
//!
//! A `PipelineResult` is created when a transaction enters the pipeline,
//! populated stage by stage (or short-circuited on the first hard failure),
//! then handed to the audit recorder and persistence sink. Read-only after.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::deidentify::RedactionAudit;
use super::extraction::ClinicalEntities;
use super::fhir::{BundleValidation, FhirBundle};
use super::gate::GateState;

/// The four audited pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Deidentification,
    Extraction,
    Transformation,
    GateDecision,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deidentification => "deidentification",
            Self::Extraction => "extraction",
            Self::Transformation => "transformation",
            Self::GateDecision => "gate_decision",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deidentification" => Some(Self::Deidentification),
            "extraction" => Some(Self::Extraction),
            "transformation" => Some(Self::Transformation),
            "gate_decision" => Some(Self::GateDecision),
            _ => None,
        }
    }

    pub fn all() -> &'static [Stage] {
        &[
            Self::Deidentification,
            Self::Extraction,
            Self::Transformation,
            Self::GateDecision,
        ]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single stage for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One stage's status line in the transaction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StageRecord {
    pub fn success(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Success,
            detail: None,
        }
    }

    pub fn success_with(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Success,
            detail: Some(detail.into()),
        }
    }

    pub fn failed(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            detail: None,
        }
    }
}

/// The downstream-facing payloads of a completed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutputs {
    pub masked_conversation: String,
    pub structured_clinical_data: ClinicalEntities,
    pub fhir_bundle: FhirBundle,
}

/// Aggregate result of one `process()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub transaction_id: Uuid,
    /// True when every stage ran to completion; review may still be required.
    pub success: bool,
    pub stages: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redaction_audit: Option<RedactionAudit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<BundleValidation>,
    pub gate_state: GateState,
    pub review_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<PipelineOutputs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineResult {
    /// A fresh result for a transaction that just entered the pipeline.
    pub fn pending(transaction_id: Uuid) -> Self {
        Self {
            transaction_id,
            success: false,
            stages: Vec::new(),
            redaction_audit: None,
            validation: None,
            gate_state: GateState::Pending,
            review_required: false,
            outputs: None,
            error: None,
        }
    }

    /// Look up a stage's record, if the stage was reached.
    pub fn stage(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}
