use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::llm::client::{CompletionClient, CompletionError, CompletionRequest};

// An exhausted queue answers with `Unavailable`.
#[derive(Default)]
pub struct ScriptedCompletionClient {
    completions: Mutex<VecDeque<Result<String, CompletionError>>>,
    embeddings: Mutex<VecDeque<Result<Vec<f32>, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    embedded_texts: Mutex<Vec<String>>,
    descriptions: Mutex<usize>,
}

impl ScriptedCompletionClient {
    pub fn new<I>(completions: I) -> Self
    where
        I: IntoIterator<Item = Result<String, CompletionError>>,
    {
        Self {
            completions: Mutex::new(completions.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|text| Ok(text.into())))
    }

    pub fn push_embedding(&self, result: Result<Vec<f32>, CompletionError>) {
        self.embeddings.lock().push_back(result);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn embedded_texts(&self) -> Vec<String> {
        self.embedded_texts.lock().clone()
    }

    pub fn description_count(&self) -> usize {
        *self.descriptions.lock()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        debug!(
            "Scripted completion: follow_up={}, temperature={}",
            request.follow_up.is_some(),
            request.options.temperature
        );
        self.requests.lock().push(request.clone());
        self.completions.lock().pop_front().unwrap_or_else(|| {
            Err(CompletionError::Unavailable(
                "no scripted completion left".to_string(),
            ))
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CompletionError> {
        self.embedded_texts.lock().push(text.to_string());
        self.embeddings
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![0.0; 8]))
    }

    async fn describe_image(&self, _image_data_uri: &str) -> Result<String, CompletionError> {
        *self.descriptions.lock() += 1;
        Ok("Shiny T-zone with visible pores on the nose.".to_string())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
