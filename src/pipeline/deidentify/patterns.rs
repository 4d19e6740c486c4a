//! PHI detection rules.
//!
//! Rules are applied in the fixed order of `REDACTION_RULES`: the most
//! specific patterns (SSN, phone, email, dates, prefixed record numbers)
//! run before the broader ones (addresses, ages, titled names, full names),
//! so a broad pattern can never swallow a span a specific one owns.
//! Within one rule, `Regex::replace_all` scans left to right, which makes
//! redaction counts reproducible for identical input.
//!
//! Placeholder tokens use only `[UPPER_SNAKE]` characters. No detection
//! pattern can match inside a placeholder (every pattern needs digits,
//! lowercase letters, or `@`), so already-masked text is a fixed point.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The PHI categories this pipeline detects and masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhiCategory {
    Name,
    Date,
    IdentifierNumber,
    Phone,
    Email,
    Address,
    AgeReference,
    TitleReference,
}

impl PhiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Date => "date",
            Self::IdentifierNumber => "identifier_number",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Address => "address",
            Self::AgeReference => "age_reference",
            Self::TitleReference => "title_reference",
        }
    }

    /// The placeholder token inserted for every masked span of this category.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Name => "[PATIENT_NAME]",
            Self::Date => "[DATE]",
            Self::IdentifierNumber => "[IDENTIFIER]",
            Self::Phone => "[PHONE]",
            Self::Email => "[EMAIL]",
            Self::Address => "[ADDRESS]",
            Self::AgeReference => "[AGE]",
            Self::TitleReference => "[NAME]",
        }
    }

    pub fn all() -> &'static [PhiCategory] {
        &[
            Self::Name,
            Self::Date,
            Self::IdentifierNumber,
            Self::Phone,
            Self::Email,
            Self::Address,
            Self::AgeReference,
            Self::TitleReference,
        ]
    }
}

impl std::fmt::Display for PhiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A compiled detection pattern with its category.
/// Several rules may share one category; audit counts aggregate per category.
pub(crate) struct RedactionRule {
    pub category: PhiCategory,
    pub regex: Regex,
}

/// Surnames used by the full-name heuristic. A two- or three-token
/// capitalized run ending in one of these is treated as a patient name.
const COMMON_SURNAMES: &str = "Smith|Johnson|Williams|Brown|Jones|Garcia|Miller|Davis|Rodriguez|\
Martinez|Hernandez|Lopez|Gonzalez|Wilson|Anderson|Thomas|Taylor|Moore|Jackson|Martin|Lee|Perez|\
Thompson|White|Harris|Sanchez|Clark|Ramirez|Lewis|Robinson|Young|King|Wright|Long|Chavez";

pub(crate) static REDACTION_RULES: LazyLock<Vec<RedactionRule>> = LazyLock::new(|| {
    vec![
        // Social security numbers (3-2-4 digit groups)
        RedactionRule {
            category: PhiCategory::IdentifierNumber,
            regex: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
        },
        // US phone numbers, with or without separators/parens
        RedactionRule {
            category: PhiCategory::Phone,
            regex: Regex::new(r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap(),
        },
        RedactionRule {
            category: PhiCategory::Email,
            regex: Regex::new(r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b").unwrap(),
        },
        // Month-name dates ("May 15th, 1980", "Jan 3")
        RedactionRule {
            category: PhiCategory::Date,
            regex: Regex::new(
                r"(?i)\b(?:January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?\b",
            )
            .unwrap(),
        },
        // Numeric dates (05/15/1980, 5/15/80)
        RedactionRule {
            category: PhiCategory::Date,
            regex: Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").unwrap(),
        },
        // Keyword-prefixed record numbers (MRN 123456, Record: 99887766)
        RedactionRule {
            category: PhiCategory::IdentifierNumber,
            regex: Regex::new(r"(?i)\b(?:MRN|Record|ID)[\s:#]*\d{6,10}\b").unwrap(),
        },
        // Street addresses with a directional component
        RedactionRule {
            category: PhiCategory::Address,
            regex: Regex::new(
                r"(?i)\b\d+\s+(?:North|South|East|West|N|S|E|W)\s+[A-Za-z ]+(?:Street|St|Avenue|Ave|Road|Rd|Drive|Dr|Lane|Ln|Boulevard|Blvd|Court|Ct|Circle|Cir|Trail|Trl)\b",
            )
            .unwrap(),
        },
        // Specific age references ("45-year-old", "45 yo", "45 y.o.")
        RedactionRule {
            category: PhiCategory::AgeReference,
            regex: Regex::new(r"(?i)\b\d{1,3}[\s-]*(?:year[\s-]*old\b|y\.o\.|yo\b)").unwrap(),
        },
        // Titled names ("Dr. Chen", "Mrs Brown") — capitalization is the signal,
        // so this rule is case-sensitive
        RedactionRule {
            category: PhiCategory::TitleReference,
            regex: Regex::new(r"\b(?:Dr|Mr|Mrs|Ms)\.?\s+[A-Z][a-z]+\b").unwrap(),
        },
        // Self-introductions ("I'm Sarah")
        RedactionRule {
            category: PhiCategory::TitleReference,
            regex: Regex::new(r"\b[Ii]'m\s+[A-Z][a-z]+\b").unwrap(),
        },
        // Capitalized runs ending in a common surname
        RedactionRule {
            category: PhiCategory::Name,
            regex: Regex::new(&format!(
                r"\b[A-Z][a-z]+ (?:[A-Z][a-z]+ )?(?:{COMMON_SURNAMES})\b"
            ))
            .unwrap(),
        },
    ]
});

/// A residual-PHI heuristic run by the post-hoc validator.
/// Broader than the redaction rules: a hit means possible missed PHI,
/// not certain PHI.
pub(crate) struct ResidualCheck {
    pub name: &'static str,
    pub regex: Regex,
}

pub(crate) static RESIDUAL_CHECKS: LazyLock<Vec<ResidualCheck>> = LazyLock::new(|| {
    vec![
        ResidualCheck {
            name: "potential_names",
            regex: Regex::new(r"\b[A-Z][a-z]+ [A-Z][a-z]+\b").unwrap(),
        },
        ResidualCheck {
            name: "potential_dates",
            regex: Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").unwrap(),
        },
        ResidualCheck {
            name: "potential_identifiers",
            regex: Regex::new(r"\b\d{6,10}\b").unwrap(),
        },
    ]
});
