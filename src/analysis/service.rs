use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::error::AnalysisError;
use crate::analysis::image::{normalize, ImageLimits};
use crate::analysis::orchestrator::{AnalysisOutcome, CompletionSettings, RetryOrchestrator};
use crate::analysis::prompt::build_prompt;
use crate::analysis::types::{AnalysisRequest, ParsedAnalysis, Prompt};
use crate::analysis::validate::RichnessRules;
use crate::config::{Config, PROMPT_VERSION};
use crate::db::{AnalysisLogEntry, AnalysisLogMetadata, AnalysisLogSink};
use crate::llm::CompletionClient;
use crate::rag::{AnalysisVectorMetadata, VectorIndex};

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub image_limits: ImageLimits,
    pub richness: RichnessRules,
    pub completion: CompletionSettings,
    pub enable_embeddings: bool,
    pub top_k: usize,
    pub vision_model: String,
    pub embedding_model: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            image_limits: ImageLimits::default(),
            richness: RichnessRules::default(),
            completion: CompletionSettings::default(),
            enable_embeddings: true,
            top_k: 3,
            vision_model: String::new(),
            embedding_model: String::new(),
        }
    }
}

impl AnalysisSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            image_limits: config.image_limits(),
            richness: config.richness_rules(),
            completion: config.completion_settings(),
            enable_embeddings: config.enable_embeddings,
            top_k: config.pinecone_top_k,
            vision_model: config.openai_vision_model.clone(),
            embedding_model: config.openai_embedding_model.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub analysis: ParsedAnalysis,
    pub outcome_path: &'static str,
    pub retry_count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceHealth {
    pub vector_index: bool,
    pub analysis_log: bool,
}

// Optional collaborators only ever downgrade to a warning.
pub struct SkinAnalysisService {
    client: Arc<dyn CompletionClient>,
    index: Option<Arc<dyn VectorIndex>>,
    log_sink: Option<Arc<dyn AnalysisLogSink>>,
    settings: AnalysisSettings,
}

impl SkinAnalysisService {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        index: Option<Arc<dyn VectorIndex>>,
        log_sink: Option<Arc<dyn AnalysisLogSink>>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            client,
            index,
            log_sink,
            settings,
        }
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
        let started = Instant::now();
        let AnalysisRequest {
            image_bytes,
            mime_type,
            preferences,
        } = request;

        let limits = self.settings.image_limits;
        let normalized =
            tokio::task::spawn_blocking(move || normalize(&image_bytes, &mime_type, &limits))
                .await
                .map_err(|err| AnalysisError::Internal(format!("image task failed: {err}")))??;
        let image_data_uri = normalized.to_data_uri();

        let embedding = if self.settings.enable_embeddings {
            self.embed_image(&image_data_uri).await
        } else {
            Vec::new()
        };
        let retrieved_context = self.retrieve_context(&embedding).await;

        let prompt = Prompt {
            instruction_text: build_prompt(
                &preferences,
                &retrieved_context,
                self.settings.richness.weekly_schema,
            ),
            image_data_uri,
        };
        let outcome = RetryOrchestrator::new(
            self.client.as_ref(),
            self.settings.richness,
            self.settings.completion,
        )
        .run(&prompt)
        .await?;

        let processing_time_ms = started.elapsed().as_millis() as u64;
        let AnalysisOutcome {
            analysis, path, ..
        } = &outcome;
        info!(
            "Skin analysis completed in {}ms (path={}, retries={}, context={})",
            processing_time_ms,
            path.as_str(),
            outcome.retry_count(),
            retrieved_context.len()
        );

        if let Some(sink) = &self.log_sink {
            let entry = AnalysisLogEntry {
                id: Uuid::new_v4().to_string(),
                created_at: Utc::now(),
                analysis: serde_json::to_value(analysis)
                    .map_err(|err| AnalysisError::Internal(err.to_string()))?,
                retrieved_context: retrieved_context.clone(),
                embedding: embedding.clone(),
                metadata: AnalysisLogMetadata {
                    model: self.client.model_name().to_string(),
                    vision_model: self.settings.vision_model.clone(),
                    embedding_model: self.settings.embedding_model.clone(),
                    prompt_version: PROMPT_VERSION.to_string(),
                    temperature: self.settings.completion.first.temperature,
                    processing_time_ms,
                    preferences: preferences.clone(),
                    retry_count: outcome.retry_count(),
                    repair_path: path.as_str().to_string(),
                },
            };
            if let Err(err) = sink.record(entry).await {
                warn!("Failed to save analysis log: {err:#}");
            }
        }

        if !embedding.is_empty() {
            self.spawn_upsert(embedding, analysis.retrieval_summary());
        }

        Ok(AnalysisReport {
            outcome_path: outcome.path.as_str(),
            retry_count: outcome.retry_count(),
            analysis: outcome.analysis,
        })
    }

    pub async fn health(&self) -> ServiceHealth {
        let vector_index = match &self.index {
            Some(index) => index.health().await,
            None => false,
        };
        let analysis_log = match &self.log_sink {
            Some(sink) => sink.health().await,
            None => false,
        };
        ServiceHealth {
            vector_index,
            analysis_log,
        }
    }

    // Describe-then-embed. Any failure yields an empty vector.
    async fn embed_image(&self, image_data_uri: &str) -> Vec<f32> {
        let description = match self.client.describe_image(image_data_uri).await {
            Ok(description) => description,
            Err(err) => {
                warn!("Image description failed, continuing without embedding: {err}");
                return Vec::new();
            }
        };
        debug!("Image description: {} chars", description.len());
        match self.client.embed(&description).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!("Embedding failed, continuing without it: {err}");
                Vec::new()
            }
        }
    }

    async fn retrieve_context(&self, embedding: &[f32]) -> Vec<String> {
        let Some(index) = &self.index else {
            return Vec::new();
        };
        if embedding.is_empty() {
            return Vec::new();
        }
        match index.query(embedding, self.settings.top_k).await {
            Ok(context) => context,
            Err(err) => {
                warn!("Vector index query failed: {err}");
                Vec::new()
            }
        }
    }

    fn spawn_upsert(&self, embedding: Vec<f32>, summary: String) {
        let Some(index) = self.index.clone() else {
            return;
        };
        tokio::spawn(async move {
            let id = Uuid::new_v4().to_string();
            let metadata = AnalysisVectorMetadata::analysis(
                summary,
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            );
            if let Err(err) = index.upsert(&id, &embedding, &metadata).await {
                warn!("Vector index upsert failed: {err}");
            }
        });
    }
}
