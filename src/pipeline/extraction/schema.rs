//! Trust-boundary validation of the extraction service response.
//!
//! The raw JSON is deserialized into wire structs and checked field by
//! field; a typed `ClinicalEntities` is constructed only after every check
//! passes. Anything missing or mistyped is a `Schema` error — the
//! transaction is rejected rather than silently patched.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::types::{
    Allergy, AllergySeverity, ClinicalEntities, Diagnosis, DiagnosisStatus, EncounterSummary,
    MedicationOrder, VitalSigns,
};
use super::{parser, ExtractionError};

/// Parse and validate a raw service response into `ClinicalEntities`.
pub fn parse_clinical_note(response: &str) -> Result<ClinicalEntities, ExtractionError> {
    let payload = parser::extract_json_payload(response)?;
    let raw: RawClinicalNote = serde_json::from_str(&payload)
        .map_err(|e| ExtractionError::Schema(e.to_string()))?;
    validate_note(raw)
}

// Wire shapes. Required fields are non-Option so serde itself rejects
// their absence; value-level constraints are checked in validate_note.

#[derive(Deserialize)]
struct RawClinicalNote {
    encounter_summary: RawEncounterSummary,
    vital_signs: RawVitalSigns,
    diagnoses: Vec<RawDiagnosis>,
    medications: Vec<RawMedication>,
    allergies: Vec<RawAllergy>,
    assessment_plan: String,
    overall_confidence: i64,
    field_confidence: BTreeMap<String, i64>,
    review_flags: Vec<String>,
}

#[derive(Deserialize)]
struct RawEncounterSummary {
    chief_complaint: String,
    history_of_present_illness: String,
}

#[derive(Deserialize)]
struct RawVitalSigns {
    blood_pressure: String,
    temperature: String,
    heart_rate: String,
    respiratory_rate: Option<String>,
    oxygen_saturation: Option<String>,
}

#[derive(Deserialize)]
struct RawDiagnosis {
    text: String,
    status: String,
}

#[derive(Deserialize)]
struct RawMedication {
    text: String,
    dosage: String,
    route: String,
    frequency: Option<String>,
    reason: Option<String>,
}

#[derive(Deserialize)]
struct RawAllergy {
    substance: String,
    reaction: String,
    severity: Option<String>,
}

fn validate_note(raw: RawClinicalNote) -> Result<ClinicalEntities, ExtractionError> {
    let overall_confidence = validate_confidence("overall_confidence", raw.overall_confidence)?;

    let mut field_confidence = BTreeMap::new();
    for (field, value) in raw.field_confidence {
        let value = validate_confidence(&format!("field_confidence.{field}"), value)?;
        field_confidence.insert(field, value);
    }

    let diagnoses = raw
        .diagnoses
        .into_iter()
        .map(|d| {
            let status = DiagnosisStatus::from_str(&d.status).ok_or_else(|| {
                ExtractionError::Schema(format!(
                    "diagnosis '{}' has invalid status '{}'",
                    d.text, d.status
                ))
            })?;
            if d.text.trim().is_empty() {
                return Err(ExtractionError::Schema("diagnosis with empty text".into()));
            }
            Ok(Diagnosis { text: d.text, status })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let medications = raw
        .medications
        .into_iter()
        .map(|m| {
            if m.text.trim().is_empty() {
                return Err(ExtractionError::Schema("medication with empty text".into()));
            }
            Ok(MedicationOrder {
                text: m.text,
                dosage: m.dosage,
                route: m.route,
                frequency: m.frequency,
                reason: m.reason,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let allergies = raw
        .allergies
        .into_iter()
        .map(|a| {
            if a.substance.trim().is_empty() {
                return Err(ExtractionError::Schema("allergy with empty substance".into()));
            }
            let severity = match a.severity.as_deref() {
                None => AllergySeverity::Unknown,
                Some(s) => AllergySeverity::from_str(s).ok_or_else(|| {
                    ExtractionError::Schema(format!(
                        "allergy '{}' has invalid severity '{s}'",
                        a.substance
                    ))
                })?,
            };
            Ok(Allergy {
                substance: a.substance,
                reaction: a.reaction,
                severity,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ClinicalEntities {
        encounter_summary: EncounterSummary {
            chief_complaint: raw.encounter_summary.chief_complaint,
            history_of_present_illness: raw.encounter_summary.history_of_present_illness,
        },
        vital_signs: VitalSigns {
            blood_pressure: raw.vital_signs.blood_pressure,
            temperature: raw.vital_signs.temperature,
            heart_rate: raw.vital_signs.heart_rate,
            respiratory_rate: raw.vital_signs.respiratory_rate,
            oxygen_saturation: raw.vital_signs.oxygen_saturation,
        },
        diagnoses,
        medications,
        allergies,
        assessment_plan: raw.assessment_plan,
        overall_confidence,
        field_confidence,
        review_flags: raw.review_flags,
    })
}

fn validate_confidence(field: &str, value: i64) -> Result<u8, ExtractionError> {
    if !(1..=100).contains(&value) {
        return Err(ExtractionError::Schema(format!(
            "{field} must be an integer between 1 and 100, got {value}"
        )));
    }
    Ok(value as u8)
}
