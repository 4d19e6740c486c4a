//! Static terminology lookup — free-text clinical terms to coded systems.
//!
//! Tables are process-wide constants; extension happens by shipping updated
//! tables, never by runtime mutation. Lookup is exact-match on a normalized
//! key (lowercased, whitespace-collapsed). A miss is not an error: the term
//! comes back text-only with no codings, so unmapped vocabulary never blocks
//! the pipeline.

use serde::{Deserialize, Serialize};

pub const ICD10_SYSTEM: &str = "http://hl7.org/fhir/sid/icd-10";
pub const SNOMED_SYSTEM: &str = "http://snomed.info/sct";
pub const RXNORM_SYSTEM: &str = "http://www.nlm.nih.gov/research/umls/rxnorm";

/// The term categories with dedicated code tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermCategory {
    Diagnosis,
    Medication,
}

/// One coding of a term in a terminology system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermCoding {
    pub system: String,
    pub code: String,
    pub display: String,
}

/// A clinical term with zero or more codings.
/// Zero codings means the term was not in the tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedTerm {
    pub text: String,
    pub codings: Vec<TermCoding>,
}

impl CodedTerm {
    pub fn is_mapped(&self) -> bool {
        !self.codings.is_empty()
    }
}

struct DiagnosisCode {
    term: &'static str,
    icd10: &'static str,
    snomed: &'static str,
}

/// Common condition terms with their ICD-10 and SNOMED codes.
const DIAGNOSIS_CODES: &[DiagnosisCode] = &[
    DiagnosisCode { term: "high blood pressure", icd10: "I10", snomed: "59621000" },
    DiagnosisCode { term: "hypertension", icd10: "I10", snomed: "59621000" },
    DiagnosisCode { term: "diabetes", icd10: "E11.9", snomed: "44054006" },
    DiagnosisCode { term: "type 2 diabetes", icd10: "E11.9", snomed: "44054006" },
    DiagnosisCode { term: "heart failure", icd10: "I50", snomed: "84114007" },
    DiagnosisCode { term: "pneumonia", icd10: "J18.9", snomed: "233604007" },
    DiagnosisCode { term: "upper respiratory infection", icd10: "J06.9", snomed: "54150009" },
    DiagnosisCode { term: "anxiety", icd10: "F41.9", snomed: "48694002" },
    DiagnosisCode { term: "headache", icd10: "R51.9", snomed: "25064002" },
    DiagnosisCode { term: "chest pain", icd10: "R07.9", snomed: "29650007" },
    DiagnosisCode { term: "cough", icd10: "R05.9", snomed: "13645005" },
    DiagnosisCode { term: "fatigue", icd10: "R53.83", snomed: "84216000" },
    DiagnosisCode { term: "shortness of breath", icd10: "R06.02", snomed: "267036007" },
    DiagnosisCode { term: "neuropathy", icd10: "G89.29", snomed: "386033004" },
    DiagnosisCode { term: "edema", icd10: "R60.9", snomed: "267038008" },
];

struct MedicationCode {
    term: &'static str,
    rxnorm: &'static str,
    snomed: &'static str,
}

/// Common medication terms with their RxNorm and SNOMED codes.
const MEDICATION_CODES: &[MedicationCode] = &[
    MedicationCode { term: "aspirin", rxnorm: "1191", snomed: "387458008" },
    MedicationCode { term: "metformin", rxnorm: "6809", snomed: "372567009" },
    MedicationCode { term: "lisinopril", rxnorm: "21600", snomed: "386876001" },
    MedicationCode { term: "amlodipine", rxnorm: "17767", snomed: "386929003" },
    MedicationCode { term: "atorvastatin", rxnorm: "83367", snomed: "412263009" },
    MedicationCode { term: "sertraline", rxnorm: "36437", snomed: "372588000" },
    MedicationCode { term: "albuterol", rxnorm: "435", snomed: "372897005" },
    MedicationCode { term: "hydrochlorothiazide", rxnorm: "5487", snomed: "366333007" },
    MedicationCode { term: "atenolol", rxnorm: "733", snomed: "372495000" },
    MedicationCode { term: "acetaminophen", rxnorm: "161", snomed: "372348007" },
    MedicationCode { term: "ibuprofen", rxnorm: "5640", snomed: "373025003" },
    MedicationCode { term: "amoxicillin", rxnorm: "2230", snomed: "372687004" },
    MedicationCode { term: "glipizide", rxnorm: "4821", snomed: "386228008" },
    MedicationCode { term: "insulin", rxnorm: "5856", snomed: "325072002" },
];

struct RouteCode {
    route: &'static str,
    snomed: &'static str,
    display: &'static str,
}

/// Administration routes with SNOMED route codes.
const ROUTE_CODES: &[RouteCode] = &[
    RouteCode { route: "oral", snomed: "26643006", display: "Oral" },
    RouteCode { route: "iv", snomed: "47625008", display: "Intravenous" },
    RouteCode { route: "intravenous", snomed: "47625008", display: "Intravenous" },
    RouteCode { route: "im", snomed: "78421000", display: "Intramuscular" },
    RouteCode { route: "intramuscular", snomed: "78421000", display: "Intramuscular" },
    RouteCode { route: "sc", snomed: "34206005", display: "Subcutaneous" },
    RouteCode { route: "subcutaneous", snomed: "34206005", display: "Subcutaneous" },
    RouteCode { route: "topical", snomed: "6064005", display: "Topical" },
    RouteCode { route: "inhaled", snomed: "447694001", display: "Inhalation" },
    RouteCode { route: "sublingual", snomed: "37161004", display: "Sublingual" },
    RouteCode { route: "sublingually", snomed: "37161004", display: "Sublingual" },
];

/// Normalize a lookup key: lowercase, whitespace collapsed to single spaces.
fn normalize_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Look up the codings for a clinical term.
///
/// Exact match on the normalized key only — no fuzzy matching. Unknown
/// terms return a text-only `CodedTerm` with an empty coding list.
pub fn map_term(category: TermCategory, text: &str) -> CodedTerm {
    let key = normalize_key(text);

    let codings = match category {
        TermCategory::Diagnosis => DIAGNOSIS_CODES
            .iter()
            .find(|c| c.term == key)
            .map(|c| {
                vec![
                    TermCoding {
                        system: ICD10_SYSTEM.to_string(),
                        code: c.icd10.to_string(),
                        display: text.to_string(),
                    },
                    TermCoding {
                        system: SNOMED_SYSTEM.to_string(),
                        code: c.snomed.to_string(),
                        display: text.to_string(),
                    },
                ]
            }),
        TermCategory::Medication => MEDICATION_CODES
            .iter()
            .find(|c| c.term == key)
            .map(|c| {
                vec![
                    TermCoding {
                        system: RXNORM_SYSTEM.to_string(),
                        code: c.rxnorm.to_string(),
                        display: text.to_string(),
                    },
                    TermCoding {
                        system: SNOMED_SYSTEM.to_string(),
                        code: c.snomed.to_string(),
                        display: text.to_string(),
                    },
                ]
            }),
    };

    CodedTerm {
        text: text.to_string(),
        codings: codings.unwrap_or_default(),
    }
}

/// Look up the SNOMED coding for an administration route, if known.
pub fn route_coding(route: &str) -> Option<TermCoding> {
    let key = normalize_key(route);
    ROUTE_CODES.iter().find(|c| c.route == key).map(|c| TermCoding {
        system: SNOMED_SYSTEM.to_string(),
        code: c.snomed.to_string(),
        display: c.display.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_diagnosis_gets_both_codings() {
        let term = map_term(TermCategory::Diagnosis, "hypertension");
        assert!(term.is_mapped());
        assert_eq!(term.codings.len(), 2);
        assert_eq!(term.codings[0].system, ICD10_SYSTEM);
        assert_eq!(term.codings[0].code, "I10");
        assert_eq!(term.codings[1].system, SNOMED_SYSTEM);
        assert_eq!(term.codings[1].code, "59621000");
    }

    #[test]
    fn known_medication_gets_rxnorm_coding() {
        let term = map_term(TermCategory::Medication, "metformin");
        assert!(term.is_mapped());
        assert_eq!(term.codings[0].system, RXNORM_SYSTEM);
        assert_eq!(term.codings[0].code, "6809");
    }

    #[test]
    fn lookup_is_case_and_whitespace_insensitive() {
        let term = map_term(TermCategory::Diagnosis, "  High   Blood  Pressure ");
        assert!(term.is_mapped());
        assert_eq!(term.codings[0].code, "I10");
        // Original casing is preserved in the term text
        assert_eq!(term.text, "  High   Blood  Pressure ");
    }

    #[test]
    fn unmapped_term_falls_back_to_text_only() {
        let term = map_term(TermCategory::Diagnosis, "fibromyalgia flare");
        assert!(!term.is_mapped());
        assert_eq!(term.text, "fibromyalgia flare");
        assert!(term.codings.is_empty());
    }

    #[test]
    fn category_tables_are_separate() {
        // "metformin" is a medication, not a diagnosis
        let term = map_term(TermCategory::Diagnosis, "metformin");
        assert!(!term.is_mapped());
    }

    #[test]
    fn route_lookup_known_and_unknown() {
        let oral = route_coding("Oral").unwrap();
        assert_eq!(oral.system, SNOMED_SYSTEM);
        assert_eq!(oral.display, "Oral");

        let iv = route_coding("IV").unwrap();
        assert_eq!(iv.display, "Intravenous");

        assert!(route_coding("transdermal patch").is_none());
    }

    #[test]
    fn mapping_is_deterministic() {
        let a = map_term(TermCategory::Medication, "aspirin");
        let b = map_term(TermCategory::Medication, "aspirin");
        assert_eq!(a, b);
    }
}
