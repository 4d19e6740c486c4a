//! Bundle assembly and integrity validation.
//!
//! `assemble` packages one transaction's resources as a FHIR transaction
//! bundle. `validate` checks referential integrity, Patient/Encounter
//! cardinality, and per-type required fields. Validation never mutates the
//! bundle and never aborts the transaction — its outcome feeds the
//! confidence gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{BundleEntry, BundleMeta, FhirBundle, FhirResource};

/// Source tag stamped into every bundle's meta.
const BUNDLE_SOURCE: &str = "clinscribe";

/// Assemble resources into a transaction bundle.
pub fn assemble(
    transaction_id: Uuid,
    resources: Vec<FhirResource>,
    timestamp: DateTime<Utc>,
) -> FhirBundle {
    let entry = resources
        .into_iter()
        .map(|resource| BundleEntry {
            full_url: format!("urn:uuid:{}", resource.id()),
            resource,
        })
        .collect();

    FhirBundle {
        resource_type: "Bundle".into(),
        id: Uuid::new_v4(),
        bundle_type: "transaction".into(),
        timestamp,
        entry,
        meta: BundleMeta {
            source: BUNDLE_SOURCE.into(),
            transaction_id,
        },
    }
}

/// Outcome of bundle validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleValidation {
    pub passed: bool,
    pub errors: Vec<String>,
}

/// Check the bundle's structural invariants.
///
/// (a) every reference resolves to a resource in the same bundle,
/// (b) Patient and Encounter appear exactly once,
/// (c) category-required fields are non-empty.
pub fn validate(bundle: &FhirBundle) -> BundleValidation {
    let mut errors = Vec::new();

    check_cardinality(bundle, &mut errors);
    check_references(bundle, &mut errors);
    for resource in bundle.resources() {
        check_required_fields(resource, &mut errors);
    }

    if !errors.is_empty() {
        tracing::warn!(
            txn_id = %bundle.meta.transaction_id,
            error_count = errors.len(),
            "Bundle validation failed"
        );
    }

    BundleValidation {
        passed: errors.is_empty(),
        errors,
    }
}

fn check_cardinality(bundle: &FhirBundle, errors: &mut Vec<String>) {
    for required in ["Patient", "Encounter"] {
        let count = bundle.count_of(required);
        if count != 1 {
            errors.push(format!("{required}: expected exactly one, found {count}"));
        }
    }
}

fn check_references(bundle: &FhirBundle, errors: &mut Vec<String>) {
    for resource in bundle.resources() {
        for reference in resource.references() {
            let Some((target_type, target_id)) = reference.target() else {
                errors.push(format!(
                    "{}: malformed reference '{}'",
                    resource.resource_type(),
                    reference.reference
                ));
                continue;
            };

            let resolves = bundle.resources().any(|r| {
                r.resource_type() == target_type && r.id().to_string() == target_id
            });
            if !resolves {
                errors.push(format!(
                    "{}: reference '{}' does not resolve within the bundle",
                    resource.resource_type(),
                    reference.reference
                ));
            }
        }
    }
}

fn check_required_fields(resource: &FhirResource, errors: &mut Vec<String>) {
    let is_blank = |text: &Option<String>| text.as_deref().map_or(true, |t| t.trim().is_empty());

    match resource {
        FhirResource::Patient(p) => {
            if p.name.is_empty() {
                errors.push("Patient: missing name".into());
            }
        }
        FhirResource::Encounter(e) => {
            if e.status.trim().is_empty() {
                errors.push("Encounter: empty status".into());
            }
        }
        FhirResource::Condition(c) => {
            if c.clinical_status.coding.is_empty() {
                errors.push("Condition: empty clinicalStatus".into());
            }
            if is_blank(&c.code.text) {
                errors.push("Condition: missing code text".into());
            }
        }
        FhirResource::MedicationRequest(m) => {
            if is_blank(&m.medication_codeable_concept.text) {
                errors.push("MedicationRequest: missing medication text".into());
            }
            if m.dosage_instruction.is_empty()
                || m.dosage_instruction.iter().any(|d| d.text.trim().is_empty())
            {
                errors.push("MedicationRequest: missing dosage instruction".into());
            }
        }
        FhirResource::AllergyIntolerance(a) => {
            if is_blank(&a.code.text) {
                errors.push("AllergyIntolerance: missing substance text".into());
            }
        }
    }
}
