use std::net::SocketAddr;

use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::analysis::preferences::Preferences;
use crate::analysis::{AnalysisError, AnalysisRequest, ParsedAnalysis};
use crate::handlers::responses::{status_for, ApiResponse};
use crate::state::AppState;
use crate::utils::timing::{complete_request_timer, start_request_timer};

const ANALYZE_ROUTE: &str = "/api/skin/analyze";
const IMAGE_FIELD: &str = "image";
// Room for preference fields and multipart framing on top of the image.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub vector_index: bool,
    pub analysis_log: bool,
    pub timestamp: String,
}

pub fn router(state: AppState, max_image_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route(
            ANALYZE_ROUTE,
            post(analyze).layer(DefaultBodyLimit::max(
                max_image_bytes + MULTIPART_OVERHEAD_BYTES,
            )),
        )
        .with_state(state)
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "SkinLens API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /api/health",
            "analyze": format!("POST {ANALYZE_ROUTE}"),
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let service_health = state.service.health().await;
    Json(ApiResponse::ok(
        HealthStatus {
            status: "healthy",
            vector_index: service_health.vector_index,
            analysis_log: service_health.analysis_log,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        },
        None,
    ))
}

pub async fn analyze(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ParsedAnalysis>>, AnalysisError> {
    let client_ip = addr.ip().to_string();
    let request_id = Uuid::new_v4().to_string();
    let mut timer = start_request_timer(ANALYZE_ROUTE, &client_ip, &request_id);

    let result = run_analysis(&state, &client_ip, multipart).await;
    match &result {
        Ok(report) => complete_request_timer(
            &mut timer,
            "success",
            Some(format!("retries={} path={}", report.retry_count, report.outcome_path)),
        ),
        Err(err) => complete_request_timer(
            &mut timer,
            "error",
            Some(format!("{} status={}", err.kind(), status_for(err).as_u16())),
        ),
    }

    let report = result?;
    Ok(Json(ApiResponse::ok(
        report.analysis,
        Some("Skin analysis completed"),
    )))
}

async fn run_analysis(
    state: &AppState,
    client_ip: &str,
    multipart: Multipart,
) -> Result<crate::analysis::AnalysisReport, AnalysisError> {
    if !state.rate_limiter.check(client_ip) {
        return Err(AnalysisError::RateLimited);
    }
    let request = read_upload(multipart).await?;
    state.service.analyze(request).await
}

async fn read_upload(mut multipart: Multipart) -> Result<AnalysisRequest, AnalysisError> {
    let mut image = None;
    let mut fields = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AnalysisError::MalformedUpload(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == IMAGE_FIELD {
            let mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AnalysisError::MalformedUpload(err.body_text()))?;
            debug!("Received image upload: {} bytes, {}", bytes.len(), mime_type);
            image = Some((bytes.to_vec(), mime_type));
        } else {
            let value = field
                .text()
                .await
                .map_err(|err| AnalysisError::MalformedUpload(err.body_text()))?;
            fields.push((name, value));
        }
    }

    build_request(image, &fields)
}

fn build_request(
    image: Option<(Vec<u8>, String)>,
    fields: &[(String, String)],
) -> Result<AnalysisRequest, AnalysisError> {
    let (bytes, mime_type) = image
        .filter(|(bytes, _)| !bytes.is_empty())
        .ok_or(AnalysisError::MissingImage)?;
    let preferences = Preferences::from_fields(
        fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str())),
    )?;
    Ok(AnalysisRequest::new(bytes, mime_type, preferences))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn missing_or_empty_image_is_rejected() {
        assert!(matches!(
            build_request(None, &[]),
            Err(AnalysisError::MissingImage)
        ));
        assert!(matches!(
            build_request(Some((Vec::new(), "image/png".to_string())), &[]),
            Err(AnalysisError::MissingImage)
        ));
    }

    #[test]
    fn preference_fields_are_parsed() {
        let request = build_request(
            Some((vec![1, 2, 3], "image/png".to_string())),
            &fields(&[
                ("goals", "fade dark spots"),
                ("fragranceFree", "true"),
                ("age", "34"),
            ]),
        )
        .unwrap();
        assert_eq!(request.mime_type, "image/png");
        assert_eq!(request.preferences.goals, "fade dark spots");
        assert!(request.preferences.fragrance_free);
        assert_eq!(request.preferences.age, Some(34));
    }

    #[test]
    fn retired_budget_field_fails_fast() {
        let err = build_request(
            Some((vec![1], "image/png".to_string())),
            &fields(&[("budget", "low")]),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidPreferences(_)));
    }

    #[test]
    fn health_payload_uses_documented_keys() {
        let status = HealthStatus {
            status: "healthy",
            vector_index: false,
            analysis_log: true,
            timestamp: "2026-01-01T00:00:00.000Z".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "status": "healthy",
                "vectorIndex": false,
                "analysisLog": true,
                "timestamp": "2026-01-01T00:00:00.000Z"
            })
        );
    }

    #[tokio::test]
    async fn root_lists_endpoints() {
        let Json(body) = root().await;
        assert_eq!(body["endpoints"]["analyze"], "POST /api/skin/analyze");
    }
}
