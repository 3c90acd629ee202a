pub mod pinecone;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use pinecone::PineconeIndex;

#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("vector index request failed: {0}")]
    Request(String),
    #[error("vector index returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse vector index response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisVectorMetadata {
    pub kind: String,
    pub summary: String,
    pub created_at: String,
}

impl AnalysisVectorMetadata {
    pub fn analysis(summary: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            kind: "analysis".to_string(),
            summary: summary.into(),
            created_at: created_at.into(),
        }
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<String>, VectorIndexError>;

    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        metadata: &AnalysisVectorMetadata,
    ) -> Result<(), VectorIndexError>;

    async fn health(&self) -> bool;
}
