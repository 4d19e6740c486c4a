//! Entity extraction — the pipeline's single external collaborator.
//!
//! Masked text goes out; a structured clinical note comes back. The
//! service response is untrusted: it is parsed (`parser`) and then
//! validated against the clinical note schema (`schema`) at this boundary.
//! Only a fully valid `ClinicalEntities` value travels deeper into the
//! pipeline — malformed responses are rejected, never coerced.

pub mod client;
pub mod parser;
pub mod prompt;
pub mod schema;
pub mod types;

pub use client::{HttpExtractorClient, MockExtractorClient};
pub use schema::parse_clinical_note;
pub use types::{
    Allergy, AllergySeverity, ClinicalEntities, Diagnosis, DiagnosisStatus, EncounterSummary,
    ExtractionRequest, ExtractorClient, MedicationOrder, VitalSigns,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("extraction service unreachable at {0}")]
    Connection(String),

    #[error("extraction request timed out after {0}s")]
    Timeout(u64),

    #[error("extraction service returned status {status}: {body}")]
    Service { status: u16, body: String },

    #[error("malformed extractor response: {0}")]
    MalformedResponse(String),

    #[error("extractor response violates the clinical note schema: {0}")]
    Schema(String),
}

impl ExtractionError {
    /// Whether the caller may retry this error with backoff.
    ///
    /// Network failures, timeouts, and server-side errors are transient;
    /// a response that parsed but violates the schema never is — retrying
    /// a deterministic extractor would return the same bad shape.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Service { status, .. } => *status >= 500,
            Self::MalformedResponse(_) | Self::Schema(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ExtractionError::Connection("http://localhost".into()).is_transient());
        assert!(ExtractionError::Timeout(30).is_transient());
        assert!(ExtractionError::Service { status: 503, body: String::new() }.is_transient());
    }

    #[test]
    fn fatal_classification() {
        assert!(!ExtractionError::Service { status: 400, body: String::new() }.is_transient());
        assert!(!ExtractionError::MalformedResponse("no JSON".into()).is_transient());
        assert!(!ExtractionError::Schema("missing field".into()).is_transient());
    }
}
