//! PHI redaction — pattern-based detection and masking of protected health
//! information before any text leaves the process.
//!
//! Flow: clean invisible chars → apply ordered category rules → audit →
//! (post-hoc) validate the masked text for residual PHI.

pub mod patterns;
pub mod redactor;

pub use patterns::PhiCategory;
pub use redactor::{
    deidentify, validate, RedactionAudit, RedactionError, ResidualRisk, ValidationReport,
};
