use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::analysis::prompt::DESCRIBE_SKIN_PROMPT;
use crate::config::Config;
use crate::llm::client::{CompletionClient, CompletionError, CompletionOptions, CompletionRequest};
use crate::utils::http::{get_http_client, truncate_for_log};
use crate::utils::timing::log_llm_timing;

const PROVIDER: &str = "openai";
const EMBEDDING_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    model: String,
    vision_model: String,
    embedding_model: String,
    request_timeout: Duration,
}

fn summarize_payload(payload: &Value) -> String {
    let model = payload
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let messages = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .map(|messages| messages.len())
        .unwrap_or(0);
    let max_tokens = payload
        .get("max_tokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    format!("model={model}, messages={messages}, max_tokens={max_tokens}")
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn map_transport_error(err: reqwest::Error) -> CompletionError {
    if err.is_timeout() {
        CompletionError::Timeout
    } else {
        CompletionError::Unavailable(err.to_string())
    }
}

fn map_status(status: StatusCode, body: &str) -> CompletionError {
    let (message, body_summary) = summarize_error_body(body);
    warn!("OpenAI API error: status={}, body={}", status, body_summary);
    if status == StatusCode::TOO_MANY_REQUESTS {
        return CompletionError::RateLimited;
    }
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        return CompletionError::Timeout;
    }
    CompletionError::Provider {
        status: status.as_u16(),
        message: message.unwrap_or(body_summary),
    }
}

fn build_messages(request: &CompletionRequest) -> Vec<Value> {
    let mut messages = vec![json!({
        "role": "user",
        "content": [
            { "type": "text", "text": request.instruction },
            { "type": "image_url", "image_url": { "url": request.image_data_uri } }
        ]
    })];
    if let Some(follow_up) = request.follow_up.as_deref() {
        messages.push(json!({
            "role": "user",
            "content": [{ "type": "text", "text": follow_up }]
        }));
    }
    messages
}

fn extract_message_content(response: &Value) -> String {
    response
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_embedding(response: &Value) -> Option<Vec<f32>> {
    let values = response.pointer("/data/0/embedding")?.as_array()?;
    values
        .iter()
        .map(|value| value.as_f64().map(|number| number as f32))
        .collect()
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        vision_model: impl Into<String>,
        embedding_model: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            vision_model: vision_model.into(),
            embedding_model: embedding_model.into(),
            request_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.openai_model.clone(),
            config.openai_vision_model.clone(),
            config.openai_embedding_model.clone(),
            Duration::from_secs(config.completion_timeout_seconds),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn require_key(&self) -> Result<&str, CompletionError> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(CompletionError::NotConfigured(
                "OPENAI_API_KEY is not defined. Add it to your .env file.".to_string(),
            ));
        }
        Ok(key)
    }

    async fn post_json(
        &self,
        path: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, CompletionError> {
        let api_key = self.require_key()?;
        let response = get_http_client()
            .post(self.endpoint(path))
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| CompletionError::Unavailable(format!("invalid response body: {err}")))
    }

    async fn chat(
        &self,
        model: &str,
        operation: &str,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError> {
        let payload = json!({
            "model": model,
            "messages": build_messages(request),
            "temperature": request.options.temperature,
            "max_tokens": request.options.max_tokens,
        });
        debug!("OpenAI request: {}", summarize_payload(&payload));

        let metadata = json!({
            "temperature": request.options.temperature,
            "max_tokens": request.options.max_tokens,
            "follow_up": request.follow_up.is_some(),
        });
        log_llm_timing(PROVIDER, model, operation, Some(metadata), || async {
            let response = self
                .post_json("chat/completions", &payload, self.request_timeout)
                .await?;
            let content = extract_message_content(&response);
            if content.trim().is_empty() {
                warn!(
                    "OpenAI response had empty content: {}",
                    truncate_for_log(&response.to_string(), 2000)
                );
            }
            Ok::<_, CompletionError>(content)
        })
        .await
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let operation = if request.follow_up.is_some() {
            "skin_analysis_repair"
        } else {
            "skin_analysis"
        };
        self.chat(&self.model, operation, request).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CompletionError> {
        let payload = json!({
            "model": self.embedding_model,
            "input": text,
        });
        log_llm_timing(PROVIDER, &self.embedding_model, "embedding", None, || async {
            let response = self
                .post_json(
                    "embeddings",
                    &payload,
                    Duration::from_secs(EMBEDDING_TIMEOUT_SECONDS),
                )
                .await?;
            extract_embedding(&response).ok_or(CompletionError::EmptyResponse)
        })
        .await
    }

    async fn describe_image(&self, image_data_uri: &str) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            instruction: DESCRIBE_SKIN_PROMPT.to_string(),
            image_data_uri: image_data_uri.to_string(),
            follow_up: None,
            options: CompletionOptions {
                temperature: 0.2,
                max_tokens: 500,
            },
        };
        let description = self
            .chat(&self.vision_model, "describe_skin", &request)
            .await?;
        if description.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(description)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(follow_up: Option<&str>) -> CompletionRequest {
        CompletionRequest {
            instruction: "analyze".to_string(),
            image_data_uri: "data:image/jpeg;base64,AAAA".to_string(),
            follow_up: follow_up.map(|text| text.to_string()),
            options: CompletionOptions {
                temperature: 0.4,
                max_tokens: 1600,
            },
        }
    }

    #[test]
    fn follow_up_becomes_second_user_turn() {
        let messages = build_messages(&request(Some("fix it")));
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0].pointer("/content/1/image_url/url").and_then(|v| v.as_str()),
            Some("data:image/jpeg;base64,AAAA")
        );
        assert_eq!(
            messages[1].pointer("/content/0/text").and_then(|v| v.as_str()),
            Some("fix it")
        );
        assert_eq!(build_messages(&request(None)).len(), 1);
    }

    #[test]
    fn error_body_prefers_provider_message() {
        let (message, _) = summarize_error_body(r#"{"error":{"message":"quota exceeded"}}"#);
        assert_eq!(message.as_deref(), Some("quota exceeded"));
        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn statuses_map_to_error_kinds() {
        assert_eq!(
            map_status(StatusCode::TOO_MANY_REQUESTS, ""),
            CompletionError::RateLimited
        );
        assert_eq!(
            map_status(StatusCode::GATEWAY_TIMEOUT, ""),
            CompletionError::Timeout
        );
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, r#"{"message":"bad image"}"#),
            CompletionError::Provider { status: 400, ref message } if message == "bad image"
        ));
    }

    #[test]
    fn parses_embedding_and_content() {
        let response = json!({ "data": [{ "embedding": [0.5, -1.0, 2.25] }] });
        assert_eq!(extract_embedding(&response), Some(vec![0.5, -1.0, 2.25]));
        assert_eq!(extract_embedding(&json!({ "data": [] })), None);

        let chat = json!({ "choices": [{ "message": { "content": "{\"a\":1}" } }] });
        assert_eq!(extract_message_content(&chat), "{\"a\":1}");
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = OpenAiClient::new(
            "",
            "http://127.0.0.1:9",
            "gpt-4o-mini",
            "gpt-4o-mini",
            "text-embedding-3-large",
            Duration::from_secs(1),
        );
        let err = client.complete(&request(None)).await.unwrap_err();
        assert!(matches!(err, CompletionError::NotConfigured(_)));
    }
}
