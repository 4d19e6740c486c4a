use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExtractionError;

/// Everything the extraction service found in one masked conversation.
/// Produced once per transaction at the trust boundary; never mutated after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalEntities {
    pub encounter_summary: EncounterSummary,
    pub vital_signs: VitalSigns,
    pub diagnoses: Vec<Diagnosis>,
    pub medications: Vec<MedicationOrder>,
    pub allergies: Vec<Allergy>,
    pub assessment_plan: String,
    /// Overall extraction confidence, 1-100.
    pub overall_confidence: u8,
    /// Per-field confidence, 1-100, keyed by field name.
    pub field_confidence: BTreeMap<String, u8>,
    /// Free-text reasons the extractor wants a human to look at this.
    pub review_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterSummary {
    pub chief_complaint: String,
    pub history_of_present_illness: String,
}

/// Vital signs as reported in conversation. "N/A" marks an unreported value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalSigns {
    pub blood_pressure: String,
    pub temperature: String,
    pub heart_rate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oxygen_saturation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosisStatus {
    Active,
    Resolved,
    RuleOut,
}

impl DiagnosisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::RuleOut => "rule-out",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "resolved" => Some(Self::Resolved),
            "rule-out" => Some(Self::RuleOut),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiagnosisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub text: String,
    pub status: DiagnosisStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationOrder {
    pub text: String,
    pub dosage: String,
    pub route: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllergySeverity {
    Mild,
    Moderate,
    Severe,
    Unknown,
}

impl AllergySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mild => "mild",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mild" => Some(Self::Mild),
            "moderate" => Some(Self::Moderate),
            "severe" => Some(Self::Severe),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allergy {
    pub substance: String,
    pub reaction: String,
    pub severity: AllergySeverity,
}

/// One extraction call's inputs.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest<'a> {
    pub masked_text: &'a str,
    pub transaction_id: Uuid,
    /// Require the service to run at its most deterministic setting
    /// (temperature 0) so identical input yields identical output.
    pub deterministic: bool,
}

/// The entity extraction collaborator.
///
/// Implementations return the service's raw textual response; parsing and
/// schema validation happen on this side of the boundary. Transport-level
/// retry policy belongs to the service; this crate only retries errors
/// classified transient by [`ExtractionError::is_transient`].
pub trait ExtractorClient: Send + Sync {
    fn extract(&self, request: &ExtractionRequest<'_>) -> Result<String, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnosis_status_round_trips() {
        for status in [
            DiagnosisStatus::Active,
            DiagnosisStatus::Resolved,
            DiagnosisStatus::RuleOut,
        ] {
            assert_eq!(DiagnosisStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(DiagnosisStatus::from_str("chronic"), None);
    }

    #[test]
    fn diagnosis_status_serde_uses_kebab_case() {
        let json = serde_json::to_string(&DiagnosisStatus::RuleOut).unwrap();
        assert_eq!(json, "\"rule-out\"");
        let parsed: DiagnosisStatus = serde_json::from_str("\"rule-out\"").unwrap();
        assert_eq!(parsed, DiagnosisStatus::RuleOut);
    }

    #[test]
    fn severity_round_trips() {
        assert_eq!(AllergySeverity::from_str("severe"), Some(AllergySeverity::Severe));
        assert_eq!(AllergySeverity::from_str("fatal"), None);
    }
}
