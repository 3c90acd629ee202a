use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::preferences::Preferences;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisLogMetadata {
    pub model: String,
    pub vision_model: String,
    pub embedding_model: String,
    pub prompt_version: String,
    pub temperature: f32,
    pub processing_time_ms: u64,
    pub preferences: Preferences,
    pub retry_count: u8,
    pub repair_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisLogEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub analysis: serde_json::Value,
    pub retrieved_context: Vec<String>,
    pub embedding: Vec<f32>,
    pub metadata: AnalysisLogMetadata,
}
