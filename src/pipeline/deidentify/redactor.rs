//! PHI masking and post-hoc validation.
//!
//! `deidentify` replaces every detected PHI span with its category
//! placeholder and returns an audit of what was masked. `validate` re-runs
//! detection plus broader residual heuristics against masked text and
//! reports anything that still looks like PHI — it never raises.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::patterns::{PhiCategory, REDACTION_RULES, RESIDUAL_CHECKS};

#[derive(Error, Debug)]
pub enum RedactionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// What was masked in one transaction. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionAudit {
    /// Count of masked spans per category, in category order.
    pub redactions_by_category: BTreeMap<PhiCategory, usize>,
    pub original_length: usize,
    pub masked_length: usize,
}

impl RedactionAudit {
    pub fn total_redactions(&self) -> usize {
        self.redactions_by_category.values().sum()
    }

    pub fn count(&self, category: PhiCategory) -> usize {
        self.redactions_by_category
            .get(&category)
            .copied()
            .unwrap_or(0)
    }
}

/// A residual-PHI finding from `validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualRisk {
    pub check: String,
    pub count: usize,
    /// First few matching spans, for the review screen.
    pub examples: Vec<String>,
}

/// Report of the post-hoc safety check over masked text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_safe: bool,
    pub residual_risks: Vec<ResidualRisk>,
}

/// Mask all detected PHI in `raw`, returning the masked text and the audit.
///
/// Rules run in the documented fixed order; every match increments its
/// category counter, so identical input always yields identical audits.
/// Finding no PHI is not an error — the audit is simply empty.
pub fn deidentify(raw: &str) -> Result<(String, RedactionAudit), RedactionError> {
    if raw.trim().is_empty() {
        return Err(RedactionError::InvalidInput("empty input".into()));
    }

    let cleaned = remove_invisible_chars(raw);
    if cleaned.trim().is_empty() {
        return Err(RedactionError::InvalidInput(
            "input contains no readable text".into(),
        ));
    }

    let original_length = cleaned.len();
    let mut masked = cleaned;
    let mut counts: BTreeMap<PhiCategory, usize> = BTreeMap::new();

    for rule in REDACTION_RULES.iter() {
        let matches = rule.regex.find_iter(&masked).count();
        if matches == 0 {
            continue;
        }
        masked = rule
            .regex
            .replace_all(&masked, rule.category.placeholder())
            .into_owned();
        *counts.entry(rule.category).or_insert(0) += matches;
    }

    let audit = RedactionAudit {
        redactions_by_category: counts,
        original_length,
        masked_length: masked.len(),
    };

    tracing::debug!(
        total_redactions = audit.total_redactions(),
        original_length = audit.original_length,
        masked_length = audit.masked_length,
        "De-identification complete"
    );

    Ok((masked, audit))
}

/// Re-run detection patterns and residual heuristics against masked text.
///
/// A detection-rule hit signals a missed redaction or pattern collision;
/// a heuristic hit signals text that merely looks like PHI. Both are
/// reported, neither raises.
pub fn validate(masked_text: &str) -> ValidationReport {
    let mut residual_risks = Vec::new();

    for rule in REDACTION_RULES.iter() {
        let matches: Vec<&str> = rule
            .regex
            .find_iter(masked_text)
            .map(|m| m.as_str())
            .collect();
        if !matches.is_empty() {
            residual_risks.push(ResidualRisk {
                check: rule.category.as_str().to_string(),
                count: matches.len(),
                examples: matches.iter().take(3).map(|s| s.to_string()).collect(),
            });
        }
    }

    for check in RESIDUAL_CHECKS.iter() {
        let matches: Vec<&str> = check
            .regex
            .find_iter(masked_text)
            .map(|m| m.as_str())
            .collect();
        if !matches.is_empty() {
            residual_risks.push(ResidualRisk {
                check: check.name.to_string(),
                count: matches.len(),
                examples: matches.iter().take(3).map(|s| s.to_string()).collect(),
            });
        }
    }

    ValidationReport {
        is_safe: residual_risks.is_empty(),
        residual_risks,
    }
}

/// Remove invisible Unicode and control characters before pattern matching.
/// Preserves standard whitespace (space, newline, tab, carriage return).
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if *c == ' ' || *c == '\n' || *c == '\t' || *c == '\r' {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'  // Zero-width space
                | '\u{200C}' // Zero-width non-joiner
                | '\u{200D}' // Zero-width joiner
                | '\u{200E}' // Left-to-right mark
                | '\u{200F}' // Right-to-left mark
                | '\u{202A}'..='\u{202E}' // Directional embedding/override block
                | '\u{2060}'..='\u{2064}' // Word joiner + invisible operators
                | '\u{FEFF}' // BOM / zero-width no-break space
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Category coverage ───────────────────────────────────────────

    #[test]
    fn scenario_masks_name_date_and_mrn() {
        let text = "Patient John Smith, DOB 05/15/1980, MRN 123456, reports chest pain.";
        let (masked, audit) = deidentify(text).unwrap();

        assert!(!masked.contains("John Smith"));
        assert!(!masked.contains("05/15/1980"));
        assert!(!masked.contains("123456"));
        assert!(masked.contains("chest pain"));

        assert_eq!(audit.count(PhiCategory::Name), 1);
        assert_eq!(audit.count(PhiCategory::Date), 1);
        assert_eq!(audit.count(PhiCategory::IdentifierNumber), 1);
    }

    #[test]
    fn masks_ssn() {
        let (masked, audit) = deidentify("SSN on file: 123-45-6789.").unwrap();
        assert!(!masked.contains("123-45-6789"));
        assert!(masked.contains("[IDENTIFIER]"));
        assert_eq!(audit.count(PhiCategory::IdentifierNumber), 1);
    }

    #[test]
    fn masks_phone_number() {
        let (masked, audit) = deidentify("Call me at (555) 867-5309 anytime.").unwrap();
        assert!(!masked.contains("867-5309"));
        assert!(masked.contains("[PHONE]"));
        assert_eq!(audit.count(PhiCategory::Phone), 1);
    }

    #[test]
    fn masks_email() {
        let (masked, audit) = deidentify("Send results to jdoe@example.com please.").unwrap();
        assert!(!masked.contains("jdoe@example.com"));
        assert!(masked.contains("[EMAIL]"));
        assert_eq!(audit.count(PhiCategory::Email), 1);
    }

    #[test]
    fn masks_month_name_date() {
        let (masked, audit) = deidentify("Surgery was on March 3rd, 2019 at the clinic.").unwrap();
        assert!(!masked.contains("March 3rd, 2019"));
        assert_eq!(audit.count(PhiCategory::Date), 1);
    }

    #[test]
    fn masks_address_with_direction() {
        let (masked, audit) = deidentify("Lives at 42 North Maple Street since June.").unwrap();
        assert!(!masked.contains("42 North Maple Street"));
        assert!(masked.contains("[ADDRESS]"));
        assert_eq!(audit.count(PhiCategory::Address), 1);
    }

    #[test]
    fn masks_age_references() {
        let (masked, audit) = deidentify("A 45-year-old presenting with cough, 45 yo.").unwrap();
        assert!(!masked.contains("45-year-old"));
        assert!(!masked.to_lowercase().contains("45 yo"));
        assert_eq!(audit.count(PhiCategory::AgeReference), 2);
    }

    #[test]
    fn masks_titled_names() {
        let (masked, audit) = deidentify("Referred by Dr. Chen and Mrs. Brown.").unwrap();
        assert!(!masked.contains("Chen"));
        // "Mrs. Brown" is consumed by the title rule before the surname rule sees it
        assert_eq!(audit.count(PhiCategory::TitleReference), 2);
        assert_eq!(audit.count(PhiCategory::Name), 0);
        assert!(masked.contains("[NAME]"));
    }

    #[test]
    fn masks_self_introduction() {
        let (masked, audit) = deidentify("Hello, I'm Sarah and my knee hurts.").unwrap();
        assert!(!masked.contains("Sarah"));
        assert_eq!(audit.count(PhiCategory::TitleReference), 1);
    }

    // ── Properties ──────────────────────────────────────────────────

    #[test]
    fn deidentify_is_idempotent_on_masked_text() {
        let text = "Patient John Smith, DOB 05/15/1980, MRN 123456, phone (555) 867-5309.";
        let (masked_once, _) = deidentify(text).unwrap();
        let (masked_twice, audit) = deidentify(&masked_once).unwrap();

        assert_eq!(masked_once, masked_twice);
        assert_eq!(audit.total_redactions(), 0);
    }

    #[test]
    fn round_trip_validation_is_safe() {
        let text = "John Smith, 123-45-6789, jdoe@example.com, 05/15/1980, MRN 123456, \
                    42 West Oak Avenue, 83-year-old, Dr. Wilson.";
        let (masked, _) = deidentify(text).unwrap();
        let report = validate(&masked);
        assert!(
            report.is_safe,
            "Expected safe masked text, found {:?}",
            report.residual_risks
        );
    }

    #[test]
    fn identical_input_yields_identical_audit() {
        let text = "Ms. Garcia, MRN 7654321, seen May 2nd for follow-up.";
        let (masked_a, audit_a) = deidentify(text).unwrap();
        let (masked_b, audit_b) = deidentify(text).unwrap();
        assert_eq!(masked_a, masked_b);
        assert_eq!(
            audit_a.redactions_by_category,
            audit_b.redactions_by_category
        );
    }

    #[test]
    fn no_phi_yields_empty_audit() {
        let (masked, audit) = deidentify("reports mild chest pain and shortness of breath")
            .unwrap();
        assert_eq!(audit.total_redactions(), 0);
        assert_eq!(masked, "reports mild chest pain and shortness of breath");
    }

    #[test]
    fn lengths_recorded_in_audit() {
        let text = "MRN 123456 noted.";
        let (masked, audit) = deidentify(text).unwrap();
        assert_eq!(audit.original_length, text.len());
        assert_eq!(audit.masked_length, masked.len());
    }

    // ── Input handling ──────────────────────────────────────────────

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            deidentify(""),
            Err(RedactionError::InvalidInput(_))
        ));
        assert!(matches!(
            deidentify("   \n  "),
            Err(RedactionError::InvalidInput(_))
        ));
    }

    #[test]
    fn control_only_input_is_an_error() {
        assert!(matches!(
            deidentify("\u{200B}\u{FEFF}\x01"),
            Err(RedactionError::InvalidInput(_))
        ));
    }

    #[test]
    fn strips_zero_width_chars_before_matching() {
        // Zero-width space inside the number must not defeat the pattern
        let (masked, audit) = deidentify("MRN 123\u{200B}456 on file").unwrap();
        assert!(!masked.contains("123456"));
        assert_eq!(audit.count(PhiCategory::IdentifierNumber), 1);
    }

    // ── Validator ───────────────────────────────────────────────────

    #[test]
    fn validate_flags_unmasked_phi() {
        let report = validate("Jane Smith came in on 05/15/1980 with MRN 123456.");
        assert!(!report.is_safe);
        let checks: Vec<&str> = report.residual_risks.iter().map(|r| r.check.as_str()).collect();
        assert!(checks.contains(&"name"));
        assert!(checks.contains(&"date"));
        assert!(checks.contains(&"identifier_number"));
    }

    #[test]
    fn validate_reports_at_most_three_examples() {
        let report = validate("111111 222222 333333 444444 555555");
        let risk = report
            .residual_risks
            .iter()
            .find(|r| r.check == "potential_identifiers")
            .unwrap();
        assert_eq!(risk.count, 5);
        assert_eq!(risk.examples.len(), 3);
    }

    #[test]
    fn validate_passes_clean_text() {
        let report = validate("[PATIENT_NAME] reports chest pain since [DATE].");
        assert!(report.is_safe);
        assert!(report.residual_risks.is_empty());
    }
}
