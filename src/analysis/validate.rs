use std::fmt;

use thiserror::Error;

use crate::analysis::types::ParsedAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeeklySchema {
    Minimal,
    Labeled,
}

impl WeeklySchema {
    pub fn default_min_weekly(&self) -> usize {
        match self {
            WeeklySchema::Minimal => 2,
            WeeklySchema::Labeled => 3,
        }
    }
}

// Labeled sections as `(label, accepted spellings)`, matched
// case-insensitively against the joined weekly text.
const LABELED_SECTIONS: &[(&str, &[&str])] = &[
    ("Daily base (AM)", &["daily base (am)"]),
    ("Daily base (PM)", &["daily base (pm)"]),
    ("Active cycle", &["active cycle"]),
    ("Ramp-up", &["ramp-up", "ramp up"]),
    ("Rules", &["rules:"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RichnessRules {
    pub min_am: usize,
    pub min_pm: usize,
    pub min_weekly: usize,
    pub min_products: usize,
    pub weekly_schema: WeeklySchema,
}

impl Default for RichnessRules {
    fn default() -> Self {
        Self::for_schema(WeeklySchema::Minimal)
    }
}

impl RichnessRules {
    pub fn for_schema(weekly_schema: WeeklySchema) -> Self {
        Self {
            min_am: 4,
            min_pm: 5,
            min_weekly: weekly_schema.default_min_weekly(),
            min_products: 4,
            weekly_schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RichnessViolation {
    AmTooShort { found: usize, min: usize },
    PmTooShort { found: usize, min: usize },
    WeeklyTooShort { found: usize, min: usize },
    WeeklyMissingSection(&'static str),
    TooFewProducts { found: usize, min: usize },
}

impl fmt::Display for RichnessViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RichnessViolation::AmTooShort { found, min } => {
                write!(f, "AM routine has {found} steps (minimum {min})")
            }
            RichnessViolation::PmTooShort { found, min } => {
                write!(f, "PM routine has {found} steps (minimum {min})")
            }
            RichnessViolation::WeeklyTooShort { found, min } => {
                write!(f, "weekly plan has {found} entries (minimum {min})")
            }
            RichnessViolation::WeeklyMissingSection(label) => {
                write!(f, "weekly plan is missing the \"{label}\" section")
            }
            RichnessViolation::TooFewProducts { found, min } => {
                write!(f, "only {found} products recommended (minimum {min})")
            }
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("analysis is not rich enough: {}", describe(.0))]
pub struct RichnessFailure(pub Vec<RichnessViolation>);

fn describe(violations: &[RichnessViolation]) -> String {
    violations
        .iter()
        .map(|violation| violation.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn validate(analysis: &ParsedAnalysis, rules: &RichnessRules) -> Result<(), RichnessFailure> {
    let mut violations = Vec::new();

    let am = analysis.am_steps();
    if am < rules.min_am {
        violations.push(RichnessViolation::AmTooShort {
            found: am,
            min: rules.min_am,
        });
    }

    let pm = analysis.pm_steps();
    if pm < rules.min_pm {
        violations.push(RichnessViolation::PmTooShort {
            found: pm,
            min: rules.min_pm,
        });
    }

    let weekly = analysis.weekly_len();
    if weekly < rules.min_weekly {
        violations.push(RichnessViolation::WeeklyTooShort {
            found: weekly,
            min: rules.min_weekly,
        });
    }

    if rules.weekly_schema == WeeklySchema::Labeled {
        let weekly_text = analysis.weekly_text().to_lowercase();
        for (label, spellings) in LABELED_SECTIONS {
            if !spellings.iter().any(|spelling| weekly_text.contains(spelling)) {
                violations.push(RichnessViolation::WeeklyMissingSection(label));
            }
        }
    }

    let products = analysis.product_count();
    if products < rules.min_products {
        violations.push(RichnessViolation::TooFewProducts {
            found: products,
            min: rules.min_products,
        });
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(RichnessFailure(violations))
    }
}
