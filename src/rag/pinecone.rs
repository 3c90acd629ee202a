use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::rag::{AnalysisVectorMetadata, VectorIndex, VectorIndexError};
use crate::utils::http::{get_http_client, truncate_for_log};

const API_VERSION: &str = "2024-07";

#[derive(Debug, Clone)]
pub struct PineconeIndex {
    api_key: String,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Debug, Deserialize, Default)]
struct QueryMatch {
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a AnalysisVectorMetadata,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn summaries(response: QueryResponse) -> Vec<String> {
    response
        .matches
        .into_iter()
        .filter_map(|hit| {
            hit.metadata?
                .get("summary")
                .and_then(|v| v.as_str())
                .filter(|summary| !summary.trim().is_empty())
                .map(|summary| summary.to_string())
        })
        .collect()
}

impl PineconeIndex {
    pub fn new(api_key: impl Into<String>, index_host: &str, timeout: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: normalize_host(index_host),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.pinecone_enabled() {
            return None;
        }
        Some(Self::new(
            config.pinecone_api_key.trim(),
            &config.pinecone_index_host,
            Duration::from_millis(config.pinecone_timeout_ms),
        ))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        get_http_client()
            .request(method, format!("{}/{}", self.base_url, path))
            .timeout(self.timeout)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, VectorIndexError> {
        let response = request
            .send()
            .await
            .map_err(|err| VectorIndexError::Request(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorIndexError::Status {
                status,
                body: truncate_for_log(&body, 500),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<String>, VectorIndexError> {
        let payload = QueryRequest {
            vector,
            top_k: top_k.max(1),
            include_metadata: true,
        };
        let response = self
            .send(self.request(reqwest::Method::POST, "query").json(&payload))
            .await?;
        let parsed = response
            .json::<QueryResponse>()
            .await
            .map_err(|err| VectorIndexError::Decode(err.to_string()))?;
        let found = summaries(parsed);
        debug!("Pinecone query returned {} summaries", found.len());
        Ok(found)
    }

    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        metadata: &AnalysisVectorMetadata,
    ) -> Result<(), VectorIndexError> {
        let payload = UpsertRequest {
            vectors: vec![UpsertVector {
                id,
                values: vector,
                metadata,
            }],
        };
        self.send(self.request(reqwest::Method::POST, "vectors/upsert").json(&payload))
            .await?;
        debug!("Pinecone upsert stored {}", id);
        Ok(())
    }

    async fn health(&self) -> bool {
        match self
            .send(self.request(reqwest::Method::GET, "describe_index_stats"))
            .await
        {
            Ok(_) => true,
            Err(err) => {
                warn!("Pinecone index health check failed: {}", err);
                false
            }
        }
    }
}
