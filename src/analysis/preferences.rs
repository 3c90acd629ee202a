use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PREFERENCES_VERSION: u32 = 2;

const MIN_AGE: u8 = 13;
const MAX_AGE: u8 = 120;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreferencesError {
    #[error("Unsupported preference field: {0}")]
    UnknownField(String),
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
    #[error("Unsupported preferences version: {0}")]
    UnsupportedVersion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFocus {
    BestValue,
    MidrangeWorthIt,
    SplurgeIfUnique,
}

impl ValueFocus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "best_value" => Some(ValueFocus::BestValue),
            "midrange_worth_it" => Some(ValueFocus::MidrangeWorthIt),
            "splurge_if_unique" => Some(ValueFocus::SplurgeIfUnique),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueFocus::BestValue => "best_value",
            ValueFocus::MidrangeWorthIt => "midrange_worth_it",
            ValueFocus::SplurgeIfUnique => "splurge_if_unique",
        }
    }

    pub fn guidance(&self) -> &'static str {
        match self {
            ValueFocus::BestValue => {
                "bang-for-buck; proven actives and reliable basics"
            }
            ValueFocus::MidrangeWorthIt => {
                "allow a bit more spend for better textures or UV filters"
            }
            ValueFocus::SplurgeIfUnique => {
                "only spend more when there is a clear unique advantage"
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub goals: String,
    pub age: Option<u8>,
    pub value_focus: Option<ValueFocus>,
    pub fragrance_free: bool,
    pub pregnancy_safe: bool,
    pub sensitive_mode: bool,
}

fn parse_bool(field: &str, value: &str) -> Result<bool, PreferencesError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("false") {
        return Ok(false);
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Ok(true);
    }
    Err(PreferencesError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

impl Preferences {
    pub fn from_fields<'a, I>(fields: I) -> Result<Self, PreferencesError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut prefs = Preferences::default();
        for (name, value) in fields {
            match name {
                "goals" => prefs.goals = value.trim().to_string(),
                "age" => {
                    let trimmed = value.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let age = trimmed
                        .parse::<u8>()
                        .ok()
                        .filter(|age| (MIN_AGE..=MAX_AGE).contains(age))
                        .ok_or_else(|| PreferencesError::InvalidValue {
                            field: "age".to_string(),
                            value: value.to_string(),
                        })?;
                    prefs.age = Some(age);
                }
                "valueFocus" => {
                    if value.trim().is_empty() {
                        continue;
                    }
                    let focus = ValueFocus::parse(value).ok_or_else(|| {
                        PreferencesError::InvalidValue {
                            field: "valueFocus".to_string(),
                            value: value.to_string(),
                        }
                    })?;
                    prefs.value_focus = Some(focus);
                }
                "fragranceFree" => prefs.fragrance_free = parse_bool(name, value)?,
                "pregnancySafe" => prefs.pregnancy_safe = parse_bool(name, value)?,
                "sensitiveMode" => prefs.sensitive_mode = parse_bool(name, value)?,
                "prefsVersion" => {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() && trimmed != PREFERENCES_VERSION.to_string() {
                        return Err(PreferencesError::UnsupportedVersion(trimmed.to_string()));
                    }
                }
                other => return Err(PreferencesError::UnknownField(other.to_string())),
            }
        }
        Ok(prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_form() {
        let prefs = Preferences::from_fields([
            ("goals", "  acne + dark spots "),
            ("age", "38"),
            ("valueFocus", "midrange_worth_it"),
            ("fragranceFree", "TRUE"),
            ("pregnancySafe", "false"),
            ("sensitiveMode", "true"),
            ("prefsVersion", "2"),
        ])
        .unwrap();
        assert_eq!(prefs.goals, "acne + dark spots");
        assert_eq!(prefs.age, Some(38));
        assert_eq!(prefs.value_focus, Some(ValueFocus::MidrangeWorthIt));
        assert!(prefs.fragrance_free);
        assert!(!prefs.pregnancy_safe);
        assert!(prefs.sensitive_mode);
    }

    #[test]
    fn empty_form_yields_defaults() {
        let prefs = Preferences::from_fields(std::iter::empty()).unwrap();
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn retired_budget_field_is_rejected() {
        let err = Preferences::from_fields([("budget", "mid-range")]).unwrap_err();
        assert_eq!(err, PreferencesError::UnknownField("budget".to_string()));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Preferences::from_fields([("fragranceFree", "yes")]),
            Err(PreferencesError::InvalidValue { .. })
        ));
        assert!(matches!(
            Preferences::from_fields([("age", "7")]),
            Err(PreferencesError::InvalidValue { .. })
        ));
        assert!(matches!(
            Preferences::from_fields([("valueFocus", "cheap")]),
            Err(PreferencesError::InvalidValue { .. })
        ));
        assert_eq!(
            Preferences::from_fields([("prefsVersion", "1")]),
            Err(PreferencesError::UnsupportedVersion("1".to_string()))
        );
    }
}
