use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::analysis::preferences::Preferences;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
    Jpeg,
    Png,
    Webp,
}

impl ImageMime {
    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.trim().to_lowercase();
        let format = lowered.strip_prefix("image/").unwrap_or(&lowered);
        match format {
            "jpeg" | "jpg" => Some(ImageMime::Jpeg),
            "png" => Some(ImageMime::Png),
            "webp" => Some(ImageMime::Webp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Webp => "image/webp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
    pub preferences: Preferences,
}

impl AnalysisRequest {
    pub fn new(image_bytes: Vec<u8>, mime_type: impl Into<String>, preferences: Preferences) -> Self {
        Self {
            image_bytes,
            mime_type: mime_type.into(),
            preferences,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub instruction_text: String,
    pub image_data_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
    Other(String),
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Mild => "Mild",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
            Severity::Other(label) => label,
        }
    }
}

impl From<String> for Severity {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Mild" => Severity::Mild,
            "Moderate" => Severity::Moderate,
            "Severe" => Severity::Severe,
            _ => Severity::Other(label),
        }
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProductCategory {
    Cleanser,
    Toner,
    Essence,
    Serum,
    Moisturizer,
    Sunscreen,
    SpotTreatment,
    Mask,
    Other(String),
}

impl ProductCategory {
    pub fn as_str(&self) -> &str {
        match self {
            ProductCategory::Cleanser => "Cleanser",
            ProductCategory::Toner => "Toner",
            ProductCategory::Essence => "Essence",
            ProductCategory::Serum => "Serum",
            ProductCategory::Moisturizer => "Moisturizer",
            ProductCategory::Sunscreen => "Sunscreen",
            ProductCategory::SpotTreatment => "Spot treatment",
            ProductCategory::Mask => "Mask",
            ProductCategory::Other(label) => label,
        }
    }
}

impl From<String> for ProductCategory {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Cleanser" => ProductCategory::Cleanser,
            "Toner" => ProductCategory::Toner,
            "Essence" => ProductCategory::Essence,
            "Serum" => ProductCategory::Serum,
            "Moisturizer" => ProductCategory::Moisturizer,
            "Sunscreen" => ProductCategory::Sunscreen,
            "Spot treatment" => ProductCategory::SpotTreatment,
            "Mask" => ProductCategory::Mask,
            _ => ProductCategory::Other(label),
        }
    }
}

impl From<ProductCategory> for String {
    fn from(category: ProductCategory) -> Self {
        category.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinTypeResult {
    #[serde(rename = "type")]
    pub skin_type: String,
    pub confidence: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinConcern {
    pub name: String,
    pub severity: Severity,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientRecommendation {
    pub ingredient: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cautions: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecommendation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub category: ProductCategory,
    #[serde(default)]
    pub why: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub how_to_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cautions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutinePlan {
    #[serde(rename = "AM", default)]
    pub am: Vec<String>,
    #[serde(rename = "PM", default)]
    pub pm: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientConflict {
    #[serde(default)]
    pub ingredients: Vec<String>,
    pub warning: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Any JSON object is accepted. Each known key is read into its typed field
// when it fits; a value that does not fit stays in `extra` under its own key
// and is written back unchanged, as are keys outside the schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedAnalysis {
    pub skin_type: Option<SkinTypeResult>,
    pub concerns: Option<Vec<SkinConcern>>,
    pub ingredients: Option<Vec<IngredientRecommendation>>,
    pub products: Option<Vec<ProductRecommendation>>,
    pub routine: Option<RoutinePlan>,
    pub conflicts: Option<Vec<IngredientConflict>>,
    pub disclaimers: Option<Vec<String>>,
    pub timestamp: Option<Value>,
    pub extra: Map<String, Value>,
}

fn take_typed<T: DeserializeOwned>(
    object: &mut Map<String, Value>,
    key: &str,
    untyped: &mut Map<String, Value>,
) -> Option<T> {
    let value = object.remove(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(typed) => Some(typed),
        Err(err) => {
            debug!("Keeping \"{key}\" untyped: {err}");
            untyped.insert(key.to_string(), value);
            None
        }
    }
}

fn put_typed<T: Serialize>(
    object: &mut Map<String, Value>,
    key: &str,
    typed: &Option<T>,
) -> Result<(), serde_json::Error> {
    if let Some(typed) = typed {
        if !object.contains_key(key) {
            object.insert(key.to_string(), serde_json::to_value(typed)?);
        }
    }
    Ok(())
}

impl ParsedAnalysis {
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        let mut untyped = Map::new();
        let skin_type = take_typed(&mut object, "skinType", &mut untyped);
        let concerns = take_typed(&mut object, "concerns", &mut untyped);
        let ingredients = take_typed(&mut object, "ingredients", &mut untyped);
        let products = take_typed(&mut object, "products", &mut untyped);
        let routine = take_typed(&mut object, "routine", &mut untyped);
        let conflicts = take_typed(&mut object, "conflicts", &mut untyped);
        let disclaimers = take_typed(&mut object, "disclaimers", &mut untyped);
        let timestamp = object.remove("timestamp");
        object.extend(untyped);

        Self {
            skin_type,
            concerns,
            ingredients,
            products,
            routine,
            conflicts,
            disclaimers,
            timestamp,
            extra: object,
        }
    }

    pub fn to_object(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut object = self.extra.clone();
        put_typed(&mut object, "skinType", &self.skin_type)?;
        put_typed(&mut object, "concerns", &self.concerns)?;
        put_typed(&mut object, "ingredients", &self.ingredients)?;
        put_typed(&mut object, "products", &self.products)?;
        put_typed(&mut object, "routine", &self.routine)?;
        put_typed(&mut object, "conflicts", &self.conflicts)?;
        put_typed(&mut object, "disclaimers", &self.disclaimers)?;
        put_typed(&mut object, "timestamp", &self.timestamp)?;
        Ok(object)
    }

    fn untyped_array(&self, key: &str, nested: Option<&str>) -> Option<&Vec<Value>> {
        let value = self.extra.get(key)?;
        match nested {
            Some(nested) => value.get(nested)?.as_array(),
            None => value.as_array(),
        }
    }

    fn routine_len(&self, key: &str, typed: impl Fn(&RoutinePlan) -> usize) -> usize {
        match &self.routine {
            Some(routine) => typed(routine),
            None => self.untyped_array("routine", Some(key)).map_or(0, Vec::len),
        }
    }

    pub fn am_steps(&self) -> usize {
        self.routine_len("AM", |routine| routine.am.len())
    }

    pub fn pm_steps(&self) -> usize {
        self.routine_len("PM", |routine| routine.pm.len())
    }

    pub fn weekly_len(&self) -> usize {
        self.routine_len("weekly", |routine| {
            routine.weekly.as_ref().map_or(0, Vec::len)
        })
    }

    pub fn weekly_text(&self) -> String {
        match &self.routine {
            Some(routine) => routine.weekly.as_deref().unwrap_or(&[]).join(" "),
            None => self
                .untyped_array("routine", Some("weekly"))
                .map(|entries| {
                    entries
                        .iter()
                        .map(|entry| match entry {
                            Value::String(text) => text.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default(),
        }
    }

    pub fn product_count(&self) -> usize {
        match &self.products {
            Some(products) => products.len(),
            None => self.untyped_array("products", None).map_or(0, Vec::len),
        }
    }

    pub fn has_timestamp(&self) -> bool {
        match &self.timestamp {
            None | Some(Value::Null) => false,
            Some(Value::String(text)) => !text.trim().is_empty(),
            Some(_) => true,
        }
    }

    pub fn retrieval_summary(&self) -> String {
        let skin_type = self
            .skin_type
            .as_ref()
            .map_or("Unknown", |result| result.skin_type.as_str());
        let concerns = self
            .concerns
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .take(4)
            .map(|concern| format!("{}({})", concern.name, concern.severity.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("SkinType: {}. Concerns: {}", skin_type, concerns)
    }

    pub fn out_of_range_confidences(&self) -> Vec<(String, f64)> {
        let mut found = Vec::new();
        if let Some(result) = &self.skin_type {
            if !(0.0..=1.0).contains(&result.confidence) {
                found.push(("skinType".to_string(), result.confidence));
            }
        }
        for concern in self.concerns.as_deref().unwrap_or(&[]) {
            if !(0.0..=1.0).contains(&concern.confidence) {
                found.push((format!("concerns[{}]", concern.name), concern.confidence));
            }
        }
        found
    }
}

impl Serialize for ParsedAnalysis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_object()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ParsedAnalysis {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(Self::from_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mime_parsing_accepts_aliases() {
        assert_eq!(ImageMime::parse("image/jpg"), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::parse("IMAGE/PNG"), Some(ImageMime::Png));
        assert_eq!(ImageMime::parse("webp"), Some(ImageMime::Webp));
        assert_eq!(ImageMime::parse("image/gif"), None);
        assert_eq!(ImageMime::parse("image/heic"), None);
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let value = json!({
            "skinType": { "type": "Oily", "confidence": 0.7 },
            "concerns": [],
            "ingredients": [],
            "products": [{ "name": "Gel", "category": "Spot treatment", "why": "spots", "price": "$$" }],
            "routine": { "AM": ["a"], "PM": ["b"], "notes": "patch test first" },
            "conflicts": [],
            "disclaimers": [],
            "timestamp": "2026-01-01T00:00:00Z",
            "notes": { "lighting": "dim" }
        });
        let parsed: ParsedAnalysis = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(
            parsed.products.as_ref().unwrap()[0].category,
            ProductCategory::SpotTreatment
        );
        assert_eq!(serde_json::to_value(&parsed).unwrap(), value);
    }

    #[test]
    fn off_list_labels_are_kept_as_written() {
        let value = json!({
            "skinType": { "type": "Dry", "confidence": 0.5 },
            "concerns": [{ "name": "Flaking", "severity": "Extreme", "confidence": 0.4 }],
            "products": [
                { "name": "AHA toner", "category": "Exfoliant", "why": "texture" },
                { "name": "Caffeine gel", "category": "Eye cream", "why": "puffiness" }
            ],
            "timestamp": 1700000000
        });
        let parsed: ParsedAnalysis = serde_json::from_value(value.clone()).unwrap();
        let products = parsed.products.as_ref().unwrap();
        assert_eq!(products[0].category, ProductCategory::Other("Exfoliant".to_string()));
        assert_eq!(
            parsed.concerns.as_ref().unwrap()[0].severity,
            Severity::Other("Extreme".to_string())
        );
        assert!(parsed.has_timestamp());
        assert_eq!(serde_json::to_value(&parsed).unwrap(), value);
    }

    #[test]
    fn mistyped_fields_stay_untyped_and_still_count() {
        let value = json!({
            "skinType": "Oily",
            "products": [{ "name": "Serum" }, "Sunscreen SPF 50", { "category": 3 }],
            "routine": { "AM": ["Cleanse", { "step": "Serum" }, "SPF"], "PM": "Cleanse then moisturize" }
        });
        let parsed: ParsedAnalysis = serde_json::from_value(value.clone()).unwrap();
        assert!(parsed.skin_type.is_none());
        assert!(parsed.products.is_none());
        assert!(parsed.routine.is_none());
        assert_eq!(parsed.product_count(), 3);
        assert_eq!(parsed.am_steps(), 3);
        assert_eq!(parsed.pm_steps(), 0);
        assert_eq!(serde_json::to_value(&parsed).unwrap(), value);
        assert_eq!(parsed.retrieval_summary(), "SkinType: Unknown. Concerns: ");
    }

    #[test]
    fn blank_or_null_timestamps_count_as_missing() {
        for timestamp in [json!(""), json!("   "), Value::Null] {
            let parsed: ParsedAnalysis =
                serde_json::from_value(json!({ "timestamp": timestamp })).unwrap();
            assert!(!parsed.has_timestamp());
        }
        let parsed: ParsedAnalysis = serde_json::from_value(json!({})).unwrap();
        assert!(!parsed.has_timestamp());
    }

    #[test]
    fn summary_lists_at_most_four_concerns() {
        let value = json!({
            "skinType": { "type": "Combination", "confidence": 0.6 },
            "concerns": [
                { "name": "A", "severity": "Mild", "confidence": 0.5 },
                { "name": "B", "severity": "Moderate", "confidence": 0.5 },
                { "name": "C", "severity": "Severe", "confidence": 0.5 },
                { "name": "D", "severity": "Mild", "confidence": 0.5 },
                { "name": "E", "severity": "Mild", "confidence": 0.5 }
            ]
        });
        let parsed: ParsedAnalysis = serde_json::from_value(value).unwrap();
        assert_eq!(
            parsed.retrieval_summary(),
            "SkinType: Combination. Concerns: A(Mild), B(Moderate), C(Severe), D(Mild)"
        );
    }

    #[test]
    fn reports_confidences_outside_unit_range() {
        let value = json!({
            "skinType": { "type": "Dry", "confidence": 1.4 },
            "concerns": [{ "name": "Dehydration", "severity": "Mild", "confidence": -0.1 }]
        });
        let parsed: ParsedAnalysis = serde_json::from_value(value).unwrap();
        let found = parsed.out_of_range_confidences();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], ("skinType".to_string(), 1.4));
    }
}
