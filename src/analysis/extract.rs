//! Pulls the analysis object out of free-form model output.
//!
//! The object is taken greedily from the first `{` to the last `}`. Prose that
//! contains unrelated braces around the real object, or more than one object,
//! defeats this heuristic and surfaces as a malformed-JSON failure.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::analysis::types::ParsedAnalysis;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionFailure {
    #[error("no JSON object found in model output")]
    NoJsonFound,
    #[error("model output contained malformed JSON: {0}")]
    MalformedJson(String),
}

impl ExtractionFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionFailure::NoJsonFound => "no_json_found",
            ExtractionFailure::MalformedJson(_) => "malformed_json",
        }
    }
}

fn candidate_span(text: &str) -> Option<(usize, usize)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some((start, end))
}

pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, ExtractionFailure> {
    let (start, end) = candidate_span(text).ok_or(ExtractionFailure::NoJsonFound)?;
    let candidate = &text[start..=end];
    let value: Value = serde_json::from_str(candidate)
        .map_err(|err| ExtractionFailure::MalformedJson(err.to_string()))?;
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(ExtractionFailure::MalformedJson(
            "top-level value is not an object".to_string(),
        )),
    }
}

pub fn extract(text: &str) -> Result<ParsedAnalysis, ExtractionFailure> {
    extract_json_object(text).map(ParsedAnalysis::from_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recovers_object_wrapped_in_prose_and_fences() {
        let original = json!({
            "skinType": { "type": "Oily", "confidence": 0.8 },
            "nested": { "list": [1, 2, { "deep": "}{" }] },
            "text": "braces inside strings { are fine }"
        });
        for (prefix, suffix) in [
            ("", ""),
            ("Here is your analysis:\n```json\n", "\n```\nLet me know!"),
            ("Sure thing. ", " Hope this helps."),
        ] {
            let text = format!("{prefix}{original}{suffix}");
            assert_eq!(Value::Object(extract_json_object(&text).unwrap()), original);
        }
    }

    #[test]
    fn missing_or_inverted_braces_are_no_json() {
        assert_eq!(
            extract_json_object("I cannot analyze this photo."),
            Err(ExtractionFailure::NoJsonFound)
        );
        assert_eq!(
            extract_json_object("} closing before { opening"),
            Err(ExtractionFailure::NoJsonFound)
        );
        assert_eq!(
            extract_json_object("only an opening {"),
            Err(ExtractionFailure::NoJsonFound)
        );
        assert_eq!(extract_json_object(""), Err(ExtractionFailure::NoJsonFound));
    }

    #[test]
    fn truncated_object_is_malformed() {
        let text = r#"Result: {"skinType": {"type": "Dry", "confidence": 0.4}, "concerns": [ } trailing"#;
        assert!(matches!(
            extract_json_object(text),
            Err(ExtractionFailure::MalformedJson(_))
        ));
    }

    #[test]
    fn unrelated_braces_in_prose_break_the_heuristic() {
        let text = r#"Use {curly} notes. {"skinType": {"type": "Dry", "confidence": 0.4}}"#;
        assert!(matches!(
            extract_json_object(text),
            Err(ExtractionFailure::MalformedJson(_))
        ));
    }

    #[test]
    fn top_level_array_is_malformed() {
        assert!(matches!(
            extract_json_object(r#"[{"a": 1}, {"b": 2}]"#),
            Err(ExtractionFailure::MalformedJson(_))
        ));
    }

    #[test]
    fn valid_json_outside_the_typed_model_still_extracts() {
        let text = r#"{"skinType": {"type": "Dry", "confidence": "high"}, "concerns": [{"name": "x", "severity": "Extreme", "confidence": 0.2}], "timestamp": 1700000000}"#;
        let parsed = extract(text).unwrap();
        assert!(parsed.skin_type.is_none());
        assert_eq!(parsed.extra["skinType"]["confidence"], "high");
        assert_eq!(parsed.concerns.unwrap().len(), 1);
        assert_eq!(parsed.timestamp, Some(json!(1700000000)));
    }

    #[test]
    fn missing_lists_count_as_empty() {
        let parsed = extract(r#"ok {"skinType": {"type": "Normal", "confidence": 0.9}}"#).unwrap();
        assert!(parsed.products.is_none());
        assert_eq!(parsed.product_count(), 0);
        assert_eq!(parsed.am_steps(), 0);
        assert!(parsed.timestamp.is_none());
    }
}
