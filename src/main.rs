use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use dotenvy::dotenv;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

mod analysis;
mod config;
mod db;
mod handlers;
mod llm;
mod rag;
mod state;
mod utils;

use analysis::{AnalysisSettings, SkinAnalysisService};
use config::CONFIG;
use db::{AnalysisLogSink, Database};
use handlers::access::{spawn_sweep_task, RateLimiter};
use llm::OpenAiClient;
use rag::{PineconeIndex, VectorIndex};
use state::AppState;
use utils::logging::init_logging;

fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    let origin = origin.trim();
    if origin == "*" {
        return Ok(layer.allow_origin(Any));
    }
    let value = HeaderValue::from_str(origin)
        .with_context(|| format!("Invalid CORS_ORIGIN value: {origin}"))?;
    Ok(layer.allow_origin(value))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => warn!("Failed to listen for SIGTERM: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging();

    info!("Starting SkinLens API v{}", env!("CARGO_PKG_VERSION"));

    if CONFIG.openai_api_key.trim().is_empty() {
        warn!("OPENAI_API_KEY is not set; analysis requests will fail until it is configured");
    }

    let log_sink: Option<Arc<dyn AnalysisLogSink>> = if CONFIG.skip_db {
        info!("SKIP_DB=true, analysis logs will not be stored");
        None
    } else {
        let db = Database::init(&CONFIG.database_url).await?;
        Some(Arc::new(db))
    };

    let index: Option<Arc<dyn VectorIndex>> = match PineconeIndex::from_config(&CONFIG) {
        Some(index) => {
            info!("Pinecone retrieval enabled");
            Some(Arc::new(index))
        }
        None => {
            info!("Pinecone retrieval disabled");
            None
        }
    };

    let service = SkinAnalysisService::new(
        Arc::new(OpenAiClient::from_config(&CONFIG)),
        index,
        log_sink,
        AnalysisSettings::from_config(&CONFIG),
    );

    let rate_limiter = Arc::new(RateLimiter::new(
        CONFIG.rate_limit_requests,
        Duration::from_secs(CONFIG.rate_limit_window_seconds),
    ));
    spawn_sweep_task(
        rate_limiter.clone(),
        Duration::from_secs(CONFIG.rate_limit_sweep_seconds),
    );

    let state = AppState::new(service, rate_limiter);
    let app = handlers::skin::router(state, CONFIG.max_image_bytes)
        .layer(cors_layer(&CONFIG.cors_origin)?)
        .layer(TraceLayer::new_for_http());

    let addr = CONFIG.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("SkinLens API listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_origin_must_be_a_valid_header() {
        assert!(cors_layer("http://localhost:5173").is_ok());
        assert!(cors_layer("*").is_ok());
        assert!(cors_layer("bad\norigin").is_err());
    }
}
