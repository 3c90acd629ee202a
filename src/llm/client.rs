use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub instruction: String,
    pub image_data_uri: String,
    pub follow_up: Option<String>,
    pub options: CompletionOptions,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion provider is not configured: {0}")]
    NotConfigured(String),
    #[error("completion provider unavailable: {0}")]
    Unavailable(String),
    #[error("completion provider rate limited the request")]
    RateLimited,
    #[error("completion provider timed out")]
    Timeout,
    #[error("completion provider returned status {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("completion provider returned an empty response")]
    EmptyResponse,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CompletionError>;

    // Region-aware, diagnosis-free description; this is the text that gets
    // embedded.
    async fn describe_image(&self, image_data_uri: &str) -> Result<String, CompletionError>;

    fn model_name(&self) -> &str;
}
