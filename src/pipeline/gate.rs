//! Confidence gate — routes each transaction to auto-accept or human review.
//!
//! The gate is a pure function of (overall confidence, per-field confidence,
//! bundle validation outcome). It has no side effects; persisting the
//! decision is the caller's job. Transactions that hard-failed upstream
//! move straight to `Rejected` and never reach the gate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::fhir::BundleValidation;

/// Per-transaction disposition. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Pending,
    AutoAccepted,
    FlaggedForReview,
    Rejected,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AutoAccepted => "auto_accepted",
            Self::FlaggedForReview => "flagged_for_review",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "auto_accepted" => Some(Self::AutoAccepted),
            "flagged_for_review" => Some(Self::FlaggedForReview),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Thresholds the gate decides against.
#[derive(Debug, Clone, Copy)]
pub struct GateThresholds {
    /// Minimum overall confidence (1-100) for auto-acceptance.
    pub accept_threshold: u8,
    /// Any field below this (1-100) forces review.
    pub field_floor: u8,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            accept_threshold: 85,
            field_floor: 70,
        }
    }
}

/// The gate's verdict with the reasons that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub state: GateState,
    pub reasons: Vec<String>,
}

/// Decide a transaction's disposition.
///
/// Auto-accepted only when overall confidence meets the threshold,
/// bundle validation passed, and no field sits below the floor.
/// The boundary is inclusive: confidence exactly at the threshold accepts.
pub fn evaluate(
    overall_confidence: u8,
    field_confidence: &BTreeMap<String, u8>,
    validation: &BundleValidation,
    thresholds: &GateThresholds,
) -> GateDecision {
    let mut reasons = Vec::new();

    if overall_confidence < thresholds.accept_threshold {
        reasons.push(format!(
            "overall confidence {overall_confidence} below threshold {}",
            thresholds.accept_threshold
        ));
    }

    for (field, confidence) in field_confidence {
        if *confidence < thresholds.field_floor {
            reasons.push(format!(
                "field '{field}' confidence {confidence} below floor {}",
                thresholds.field_floor
            ));
        }
    }

    if !validation.passed {
        reasons.push(format!(
            "bundle validation failed with {} error(s)",
            validation.errors.len()
        ));
    }

    let state = if reasons.is_empty() {
        GateState::AutoAccepted
    } else {
        GateState::FlaggedForReview
    };

    GateDecision { state, reasons }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passed() -> BundleValidation {
        BundleValidation {
            passed: true,
            errors: vec![],
        }
    }

    fn failed(errors: &[&str]) -> BundleValidation {
        BundleValidation {
            passed: false,
            errors: errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn fields(entries: &[(&str, u8)]) -> BTreeMap<String, u8> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn confidence_at_threshold_auto_accepts() {
        let decision = evaluate(
            85,
            &fields(&[("diagnoses", 90), ("medications", 70)]),
            &passed(),
            &GateThresholds::default(),
        );
        assert_eq!(decision.state, GateState::AutoAccepted);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn confidence_one_below_threshold_flags() {
        let decision = evaluate(
            84,
            &fields(&[("diagnoses", 90)]),
            &passed(),
            &GateThresholds::default(),
        );
        assert_eq!(decision.state, GateState::FlaggedForReview);
        assert_eq!(decision.reasons.len(), 1);
        assert!(decision.reasons[0].contains("below threshold 85"));
    }

    #[test]
    fn field_at_floor_is_acceptable() {
        let decision = evaluate(
            90,
            &fields(&[("allergies", 70)]),
            &passed(),
            &GateThresholds::default(),
        );
        assert_eq!(decision.state, GateState::AutoAccepted);
    }

    #[test]
    fn low_field_flags_even_with_high_overall() {
        let decision = evaluate(
            95,
            &fields(&[("diagnoses", 95), ("allergies", 69)]),
            &passed(),
            &GateThresholds::default(),
        );
        assert_eq!(decision.state, GateState::FlaggedForReview);
        assert!(decision.reasons[0].contains("allergies"));
    }

    #[test]
    fn low_overall_and_low_field_accumulate_reasons() {
        let decision = evaluate(
            60,
            &fields(&[("medications", 50)]),
            &passed(),
            &GateThresholds::default(),
        );
        assert_eq!(decision.state, GateState::FlaggedForReview);
        assert_eq!(decision.reasons.len(), 2);
    }

    #[test]
    fn failed_validation_flags() {
        let decision = evaluate(
            95,
            &fields(&[("diagnoses", 95)]),
            &failed(&["Condition: missing code text"]),
            &GateThresholds::default(),
        );
        assert_eq!(decision.state, GateState::FlaggedForReview);
        assert!(decision.reasons[0].contains("validation failed with 1 error"));
    }

    #[test]
    fn empty_field_map_relies_on_overall_only() {
        let decision = evaluate(85, &BTreeMap::new(), &passed(), &GateThresholds::default());
        assert_eq!(decision.state, GateState::AutoAccepted);
    }

    #[test]
    fn custom_thresholds_apply() {
        let thresholds = GateThresholds {
            accept_threshold: 95,
            field_floor: 90,
        };
        let decision = evaluate(94, &fields(&[("diagnoses", 89)]), &passed(), &thresholds);
        assert_eq!(decision.state, GateState::FlaggedForReview);
        assert_eq!(decision.reasons.len(), 2);
    }

    #[test]
    fn evaluate_is_pure() {
        let field_map = fields(&[("diagnoses", 80)]);
        let validation = passed();
        let a = evaluate(88, &field_map, &validation, &GateThresholds::default());
        let b = evaluate(88, &field_map, &validation, &GateThresholds::default());
        assert_eq!(a.state, b.state);
        assert_eq!(a.reasons, b.reasons);
    }

    #[test]
    fn terminal_states() {
        assert!(!GateState::Pending.is_terminal());
        assert!(GateState::AutoAccepted.is_terminal());
        assert!(GateState::FlaggedForReview.is_terminal());
        assert!(GateState::Rejected.is_terminal());
    }

    #[test]
    fn state_round_trips_through_strings() {
        for state in [
            GateState::Pending,
            GateState::AutoAccepted,
            GateState::FlaggedForReview,
            GateState::Rejected,
        ] {
            assert_eq!(GateState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(GateState::from_str("escalated"), None);
    }
}
