//! Deterministic construction of FHIR resources from extracted entities.
//!
//! Given identical `ClinicalEntities` and the same `authored` instant,
//! resource content is byte-identical across runs; the freshly generated
//! resource ids are the only non-deterministic fields.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{
    AllergyIntolerance, AllergyReaction, CodeableConcept, Coding, Condition, DosageInstruction,
    Encounter, FhirResource, HumanName, MedicationRequest, Patient, Period, Reference, Timing,
    ALLERGY_CLINICAL_SYSTEM, ALLERGY_VERIFICATION_SYSTEM, CONDITION_CLINICAL_SYSTEM,
    ENCOUNTER_CLASS_SYSTEM,
};
use crate::pipeline::extraction::{AllergySeverity, ClinicalEntities, DiagnosisStatus};
use crate::pipeline::terminology::{self, CodedTerm, TermCategory};

/// Build the full resource set for one transaction.
///
/// Always exactly one Patient and one Encounter; one Condition per
/// diagnosis, one MedicationRequest per medication, one AllergyIntolerance
/// per allergy. Empty entity lists produce no resources of that type.
pub fn build_resources(entities: &ClinicalEntities, authored: DateTime<Utc>) -> Vec<FhirResource> {
    let patient_id = Uuid::new_v4();
    let encounter_id = Uuid::new_v4();

    let mut resources = Vec::with_capacity(
        2 + entities.diagnoses.len() + entities.medications.len() + entities.allergies.len(),
    );

    resources.push(FhirResource::Patient(build_patient(patient_id)));
    resources.push(FhirResource::Encounter(build_encounter(
        encounter_id,
        patient_id,
        entities,
        authored,
    )));

    for diagnosis in &entities.diagnoses {
        resources.push(FhirResource::Condition(build_condition(
            patient_id,
            encounter_id,
            &diagnosis.text,
            diagnosis.status,
            authored,
        )));
    }

    for medication in &entities.medications {
        resources.push(FhirResource::MedicationRequest(build_medication_request(
            patient_id,
            encounter_id,
            medication,
            authored,
        )));
    }

    for allergy in &entities.allergies {
        resources.push(FhirResource::AllergyIntolerance(build_allergy(
            patient_id, allergy,
        )));
    }

    resources
}

fn build_patient(id: Uuid) -> Patient {
    Patient {
        id,
        name: vec![HumanName {
            use_: "usual".into(),
            text: "[PATIENT_NAME]".into(),
        }],
        gender: "unknown".into(),
    }
}

fn build_encounter(
    id: Uuid,
    patient_id: Uuid,
    entities: &ClinicalEntities,
    authored: DateTime<Utc>,
) -> Encounter {
    let chief_complaint = entities.encounter_summary.chief_complaint.as_str();

    Encounter {
        id,
        status: "finished".into(),
        class: Coding::new(ENCOUNTER_CLASS_SYSTEM, "AMB", "Ambulatory"),
        type_: vec![CodeableConcept {
            coding: vec![Coding::new(
                terminology::SNOMED_SYSTEM,
                "185347001",
                "Encounter for problem",
            )],
            text: Some("Clinical Encounter".into()),
        }],
        subject: Reference::to("Patient", patient_id),
        period: Period { start: authored },
        reason_code: vec![CodeableConcept::text_only(chief_complaint)],
    }
}

/// Extractor diagnosis status → FHIR condition-clinical code.
fn clinical_status_code(status: DiagnosisStatus) -> &'static str {
    match status {
        DiagnosisStatus::Active => "active",
        DiagnosisStatus::Resolved => "resolved",
        DiagnosisStatus::RuleOut => "unconfirmed",
    }
}

fn build_condition(
    patient_id: Uuid,
    encounter_id: Uuid,
    diagnosis_text: &str,
    status: DiagnosisStatus,
    authored: DateTime<Utc>,
) -> Condition {
    let term = terminology::map_term(TermCategory::Diagnosis, diagnosis_text);

    Condition {
        id: Uuid::new_v4(),
        clinical_status: CodeableConcept {
            coding: vec![Coding {
                system: Some(CONDITION_CLINICAL_SYSTEM.into()),
                code: Some(clinical_status_code(status).into()),
                display: None,
            }],
            text: None,
        },
        code: codeable_concept_from(&term),
        subject: Reference::to("Patient", patient_id),
        encounter: Reference::to("Encounter", encounter_id),
        recorded_date: authored,
    }
}

fn build_medication_request(
    patient_id: Uuid,
    encounter_id: Uuid,
    medication: &crate::pipeline::extraction::MedicationOrder,
    authored: DateTime<Utc>,
) -> MedicationRequest {
    let term = terminology::map_term(TermCategory::Medication, &medication.text);

    MedicationRequest {
        id: Uuid::new_v4(),
        status: "active".into(),
        intent: "order".into(),
        medication_codeable_concept: codeable_concept_from(&term),
        subject: Reference::to("Patient", patient_id),
        encounter: Reference::to("Encounter", encounter_id),
        authored_on: authored,
        dosage_instruction: vec![DosageInstruction {
            text: medication.dosage.clone(),
            timing: medication.frequency.as_deref().map(|f| Timing {
                code: CodeableConcept::text_only(f),
            }),
            route: Some(route_concept(&medication.route)),
        }],
        reason_code: medication
            .reason
            .as_deref()
            .map(|r| vec![CodeableConcept::text_only(r)])
            .unwrap_or_default(),
    }
}

fn build_allergy(
    patient_id: Uuid,
    allergy: &crate::pipeline::extraction::Allergy,
) -> AllergyIntolerance {
    let severity = match allergy.severity {
        AllergySeverity::Unknown => None,
        known => Some(known.as_str().to_string()),
    };

    AllergyIntolerance {
        id: Uuid::new_v4(),
        patient: Reference::to("Patient", patient_id),
        clinical_status: CodeableConcept {
            coding: vec![Coding {
                system: Some(ALLERGY_CLINICAL_SYSTEM.into()),
                code: Some("active".into()),
                display: None,
            }],
            text: None,
        },
        verification_status: CodeableConcept {
            coding: vec![Coding {
                system: Some(ALLERGY_VERIFICATION_SYSTEM.into()),
                code: Some("unconfirmed".into()),
                display: None,
            }],
            text: None,
        },
        code: CodeableConcept::text_only(&allergy.substance),
        reaction: vec![AllergyReaction {
            manifestation: vec![CodeableConcept::text_only(&allergy.reaction)],
            severity,
        }],
    }
}

/// A terminology lookup result as a FHIR CodeableConcept.
/// Unmapped terms keep their text with no coding list.
fn codeable_concept_from(term: &CodedTerm) -> CodeableConcept {
    CodeableConcept {
        coding: term
            .codings
            .iter()
            .map(|c| Coding::new(&c.system, &c.code, &c.display))
            .collect(),
        text: Some(term.text.clone()),
    }
}

/// Route text as a CodeableConcept, coded when the route is known.
fn route_concept(route: &str) -> CodeableConcept {
    match terminology::route_coding(route) {
        Some(coding) => CodeableConcept {
            coding: vec![Coding::new(&coding.system, &coding.code, &coding.display)],
            text: Some(route.to_string()),
        },
        None => CodeableConcept::text_only(route),
    }
}
