//! Pipeline orchestration — one synchronous `process()` per transaction.
//!
//! Stages run strictly in order; each consumes the complete output of the
//! previous one. One audit event is emitted per stage. A hard failure
//! (bad input, transient exhaustion, schema violation) short-circuits the
//! transaction to `rejected`; nothing reaches the persistence sink until
//! the result is fully formed — persisting is the caller's step.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::config::PipelineConfig;
use crate::pipeline::deidentify;
use crate::pipeline::extraction::{
    parse_clinical_note, ClinicalEntities, ExtractionError, ExtractionRequest, ExtractorClient,
};
use crate::pipeline::fhir::{self, BundleValidation, FhirBundle};
use crate::pipeline::gate::{self, GateDecision, GateState};
use crate::pipeline::result::{PipelineOutputs, PipelineResult, Stage, StageRecord, StageStatus};
use crate::pipeline::PipelineError;

/// The clinical conversation pipeline.
pub struct ScribePipeline {
    extractor: Box<dyn ExtractorClient>,
    audit: Arc<dyn AuditSink>,
    config: PipelineConfig,
}

impl ScribePipeline {
    pub fn new(
        extractor: Box<dyn ExtractorClient>,
        audit: Arc<dyn AuditSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            audit,
            config,
        }
    }

    /// Process one raw conversation end to end.
    ///
    /// Never panics and never returns `Err`: failures are embedded in the
    /// returned result with the failing stage recorded, so one bad
    /// transaction cannot take down a batch.
    pub fn process(&self, conversation_text: &str) -> PipelineResult {
        let transaction_id = Uuid::new_v4();
        let _span = tracing::info_span!("process", txn_id = %transaction_id).entered();
        let mut result = PipelineResult::pending(transaction_id);

        // Stage 1: de-identification
        let (masked_text, redaction_audit) = match deidentify::deidentify(conversation_text) {
            Ok(output) => output,
            Err(e) => {
                self.fail_stage(&mut result, Stage::Deidentification, &e.to_string());
                return result;
            }
        };
        let safety = deidentify::validate(&masked_text);
        self.record(
            transaction_id,
            Stage::Deidentification,
            StageStatus::Success,
            json!({
                "original_length": redaction_audit.original_length,
                "masked_length": redaction_audit.masked_length,
                "redactions": redaction_audit.redactions_by_category,
                "validation_safe": safety.is_safe,
                "residual_risks": safety.residual_risks.len(),
            }),
        );
        result.stages.push(StageRecord::success_with(
            Stage::Deidentification,
            format!(
                "{} redactions, residual risks: {}",
                redaction_audit.total_redactions(),
                safety.residual_risks.len()
            ),
        ));
        result.redaction_audit = Some(redaction_audit);

        // Stage 2: entity extraction (the single network-bound call)
        let entities = match self.extract_with_retry(&masked_text, transaction_id) {
            Ok(entities) => entities,
            Err(e) => {
                self.fail_stage(&mut result, Stage::Extraction, &e.to_string());
                return result;
            }
        };
        self.record(
            transaction_id,
            Stage::Extraction,
            StageStatus::Success,
            json!({
                "overall_confidence": entities.overall_confidence,
                "diagnoses": entities.diagnoses.len(),
                "medications": entities.medications.len(),
                "allergies": entities.allergies.len(),
                "review_flags": entities.review_flags.len(),
            }),
        );
        result.stages.push(StageRecord::success_with(
            Stage::Extraction,
            format!("confidence {}/100", entities.overall_confidence),
        ));

        // Stages 3 + 4: transformation and gate are pure in-memory work;
        // an unexpected panic is wrapped as an internal error per policy
        let staged = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.transform_and_gate(transaction_id, &entities)
        }));
        let (bundle, validation, decision) = match staged {
            Ok(output) => output,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                let error = PipelineError::Internal {
                    stage: Stage::Transformation,
                    reason,
                };
                self.fail_stage(&mut result, Stage::Transformation, &error.to_string());
                return result;
            }
        };

        result.stages.push(StageRecord::success_with(
            Stage::Transformation,
            format!(
                "{} resources, validation {}",
                bundle.entry.len(),
                if validation.passed { "passed" } else { "failed" }
            ),
        ));
        result.validation = Some(validation);
        result.stages.push(StageRecord::success_with(
            Stage::GateDecision,
            decision.state.as_str(),
        ));
        result.gate_state = decision.state;
        result.review_required = decision.state == GateState::FlaggedForReview;
        result.outputs = Some(PipelineOutputs {
            masked_conversation: masked_text,
            structured_clinical_data: entities,
            fhir_bundle: bundle,
        });
        result.success = true;

        tracing::info!(
            gate_state = result.gate_state.as_str(),
            review_required = result.review_required,
            "Transaction complete"
        );
        result
    }

    /// Process a batch of conversations sequentially.
    /// Each transaction succeeds or fails on its own.
    pub fn process_batch(&self, conversations: &[String]) -> Vec<PipelineResult> {
        conversations
            .iter()
            .enumerate()
            .map(|(i, conversation)| {
                tracing::info!(index = i + 1, total = conversations.len(), "Processing batch item");
                self.process(conversation)
            })
            .collect()
    }

    /// Call the extractor, retrying transient failures with scaled backoff.
    /// Schema and malformed-response errors are never retried — against a
    /// deterministic extractor they would only reproduce.
    fn extract_with_retry(
        &self,
        masked_text: &str,
        transaction_id: Uuid,
    ) -> Result<ClinicalEntities, ExtractionError> {
        let request = ExtractionRequest {
            masked_text,
            transaction_id,
            deterministic: true,
        };
        let attempts = self.config.max_extraction_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.extractor.extract(&request) {
                Ok(raw_response) => return parse_clinical_note(&raw_response),
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        txn_id = %transaction_id,
                        attempt,
                        error = %e,
                        "Extraction call failed, retrying"
                    );
                    std::thread::sleep(std::time::Duration::from_millis(
                        self.config.retry_backoff_ms * attempt as u64,
                    ));
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ExtractionError::Connection("no extraction attempt was made".into())
        }))
    }

    /// Build resources, assemble and validate the bundle, run the gate.
    fn transform_and_gate(
        &self,
        transaction_id: Uuid,
        entities: &ClinicalEntities,
    ) -> (FhirBundle, BundleValidation, GateDecision) {
        let authored = Utc::now();
        let resources = fhir::build_resources(entities, authored);
        let bundle = fhir::assemble(transaction_id, resources, authored);
        let validation = fhir::validate(&bundle);

        self.record(
            transaction_id,
            Stage::Transformation,
            StageStatus::Success,
            json!({
                "resource_count": bundle.entry.len(),
                "validation_passed": validation.passed,
                "validation_errors": validation.errors.len(),
            }),
        );

        let decision = gate::evaluate(
            entities.overall_confidence,
            &entities.field_confidence,
            &validation,
            &self.config.gate_thresholds(),
        );
        self.record(
            transaction_id,
            Stage::GateDecision,
            StageStatus::Success,
            json!({
                "state": decision.state.as_str(),
                "reasons": decision.reasons,
            }),
        );

        (bundle, validation, decision)
    }

    /// Record a failed stage: audit event, stage record, rejection.
    fn fail_stage(&self, result: &mut PipelineResult, stage: Stage, error: &str) {
        tracing::error!(
            txn_id = %result.transaction_id,
            stage = stage.as_str(),
            error,
            "Stage failed, transaction rejected"
        );
        self.record(
            result.transaction_id,
            stage,
            StageStatus::Failed,
            json!({"error": error}),
        );
        result.stages.push(StageRecord::failed(stage, error));
        result.gate_state = GateState::Rejected;
        result.error = Some(error.to_string());
    }

    fn record(
        &self,
        transaction_id: Uuid,
        stage: Stage,
        status: StageStatus,
        metadata: serde_json::Value,
    ) {
        self.audit
            .record(&AuditEvent::new(transaction_id, stage, status, metadata));
    }
}
