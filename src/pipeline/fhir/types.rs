//! FHIR R4 resource shapes.
//!
//! Only the fields this pipeline produces are modeled, not the full
//! specification. Serialization matches the R4 JSON form (camelCase,
//! `resourceType` discriminator) so bundles are consumable downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CONDITION_CLINICAL_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/condition-clinical";
pub const ALLERGY_CLINICAL_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/allergyintolerance-clinical";
pub const ALLERGY_VERIFICATION_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/allergyintolerance-verification";
pub const ENCOUNTER_CLASS_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    pub fn new(system: &str, code: &str, display: &str) -> Self {
        Self {
            system: Some(system.to_string()),
            code: Some(code.to_string()),
            display: Some(display.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    pub fn text_only(text: &str) -> Self {
        Self {
            coding: Vec::new(),
            text: Some(text.to_string()),
        }
    }
}

/// A weak reference to another resource in the same bundle, by value
/// ("Patient/<uuid>"). Lookup only — resolution is the bundle validator's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub reference: String,
}

impl Reference {
    pub fn to(resource_type: &str, id: Uuid) -> Self {
        Self {
            reference: format!("{resource_type}/{id}"),
        }
    }

    /// Split into (resource type, id), if the reference is well-formed.
    pub fn target(&self) -> Option<(&str, &str)> {
        self.reference.split_once('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanName {
    #[serde(rename = "use")]
    pub use_: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: Vec<HumanName>,
    pub gender: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    pub id: Uuid,
    pub status: String,
    pub class: Coding,
    #[serde(rename = "type")]
    pub type_: Vec<CodeableConcept>,
    pub subject: Reference,
    pub period: Period,
    pub reason_code: Vec<CodeableConcept>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: Uuid,
    pub clinical_status: CodeableConcept,
    pub code: CodeableConcept,
    pub subject: Reference,
    pub encounter: Reference,
    pub recorded_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub code: CodeableConcept,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DosageInstruction {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<CodeableConcept>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationRequest {
    pub id: Uuid,
    pub status: String,
    pub intent: String,
    pub medication_codeable_concept: CodeableConcept,
    pub subject: Reference,
    pub encounter: Reference,
    pub authored_on: DateTime<Utc>,
    pub dosage_instruction: Vec<DosageInstruction>,
    pub reason_code: Vec<CodeableConcept>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllergyReaction {
    pub manifestation: Vec<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllergyIntolerance {
    pub id: Uuid,
    pub patient: Reference,
    pub clinical_status: CodeableConcept,
    pub verification_status: CodeableConcept,
    pub code: CodeableConcept,
    pub reaction: Vec<AllergyReaction>,
}

/// The resource kinds this pipeline produces, tagged for FHIR JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "resourceType")]
pub enum FhirResource {
    Patient(Patient),
    Encounter(Encounter),
    Condition(Condition),
    MedicationRequest(MedicationRequest),
    AllergyIntolerance(AllergyIntolerance),
}

impl FhirResource {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Patient(r) => r.id,
            Self::Encounter(r) => r.id,
            Self::Condition(r) => r.id,
            Self::MedicationRequest(r) => r.id,
            Self::AllergyIntolerance(r) => r.id,
        }
    }

    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Patient(_) => "Patient",
            Self::Encounter(_) => "Encounter",
            Self::Condition(_) => "Condition",
            Self::MedicationRequest(_) => "MedicationRequest",
            Self::AllergyIntolerance(_) => "AllergyIntolerance",
        }
    }

    /// Every outgoing reference carried by this resource.
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Self::Patient(_) => vec![],
            Self::Encounter(r) => vec![&r.subject],
            Self::Condition(r) => vec![&r.subject, &r.encounter],
            Self::MedicationRequest(r) => vec![&r.subject, &r.encounter],
            Self::AllergyIntolerance(r) => vec![&r.patient],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub full_url: String,
    pub resource: FhirResource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMeta {
    pub source: String,
    pub transaction_id: Uuid,
}

/// One transaction's resources as a single logical FHIR collection.
/// Owns every resource id; references resolve only within the bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FhirBundle {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub id: Uuid,
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub timestamp: DateTime<Utc>,
    pub entry: Vec<BundleEntry>,
    pub meta: BundleMeta,
}

impl FhirBundle {
    /// Iterate over the resources in entry order.
    pub fn resources(&self) -> impl Iterator<Item = &FhirResource> {
        self.entry.iter().map(|e| &e.resource)
    }

    /// Count resources of one type.
    pub fn count_of(&self, resource_type: &str) -> usize {
        self.resources()
            .filter(|r| r.resource_type() == resource_type)
            .count()
    }
}
