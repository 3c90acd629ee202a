use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::analysis::AnalysisError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T, message: Option<&str>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: message.map(|text| text.to_string()),
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }
}

pub fn status_for(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::MissingImage
        | AnalysisError::MalformedUpload(_)
        | AnalysisError::InvalidImage(_)
        | AnalysisError::InvalidPreferences(_) => StatusCode::BAD_REQUEST,
        AnalysisError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AnalysisError::UnparseableResponse | AnalysisError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        AnalysisError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AnalysisError::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if self.is_client_error() {
            warn!("Rejected analysis request ({}): {}", self.kind(), self);
        } else {
            error!("Error analyzing skin ({}): {}", self.kind(), self);
        }
        (status, Json(ApiResponse::failure(self.user_message()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::image::ImageError;
    use crate::llm::CompletionError;
    use serde_json::json;

    #[test]
    fn errors_map_to_http_statuses() {
        assert_eq!(status_for(&AnalysisError::MissingImage), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&AnalysisError::from(ImageError::TooLarge {
                size: 11,
                max_mb: 10
            })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AnalysisError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&AnalysisError::UnparseableResponse),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&AnalysisError::from(CompletionError::RateLimited)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for(&AnalysisError::Timeout), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn envelope_omits_empty_fields() {
        let value = serde_json::to_value(ApiResponse::failure("No image file provided")).unwrap();
        assert_eq!(
            value,
            json!({ "success": false, "error": "No image file provided" })
        );

        let value = serde_json::to_value(ApiResponse::ok(json!({ "a": 1 }), Some("done"))).unwrap();
        assert_eq!(
            value,
            json!({ "success": true, "data": { "a": 1 }, "message": "done" })
        );
    }
}
