use std::env;
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;

use crate::analysis::image::ImageLimits;
use crate::analysis::orchestrator::CompletionSettings;
use crate::analysis::validate::{RichnessRules, WeeklySchema};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub bind_addr: String,
    pub port: u16,
    pub cors_origin: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_vision_model: String,
    pub openai_embedding_model: String,
    pub completion_timeout_seconds: u64,
    pub max_image_bytes: usize,
    pub max_image_dimension: u32,
    pub jpeg_quality: u8,
    pub richness_min_am: usize,
    pub richness_min_pm: usize,
    pub richness_min_products: usize,
    pub richness_min_weekly: usize,
    pub richness_weekly_schema: WeeklySchema,
    pub enable_embeddings: bool,
    pub use_pinecone: bool,
    pub pinecone_api_key: String,
    pub pinecone_index_host: String,
    pub pinecone_top_k: usize,
    pub pinecone_timeout_ms: u64,
    pub skip_db: bool,
    pub database_url: String,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_sweep_seconds: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

pub const PROMPT_VERSION: &str = "skin-v3.2";

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_weekly_schema(value: &str) -> WeeklySchema {
    match value.trim().to_lowercase().as_str() {
        "" | "minimal" => WeeklySchema::Minimal,
        "labeled" | "labelled" => WeeklySchema::Labeled,
        other => {
            warn!(
                "Unknown RICHNESS_WEEKLY_SCHEMA value '{}'; defaulting to minimal.",
                other
            );
            WeeklySchema::Minimal
        }
    }
}

// `USE_PINECONE=false` is a kill switch; any other value leaves the index
// enabled as long as credentials are present.
fn pinecone_switch() -> bool {
    env::var("USE_PINECONE")
        .map(|value| !value.trim().eq_ignore_ascii_case("false"))
        .unwrap_or(true)
}

impl Config {
    pub fn load() -> Result<Self> {
        let richness_weekly_schema = parse_weekly_schema(&env_string("RICHNESS_WEEKLY_SCHEMA", ""));
        let port = env_string("PORT", "3000");
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("Invalid PORT value: {port}"))?;

        let jpeg_quality = env_u64("JPEG_QUALITY", 85).clamp(1, 100) as u8;
        let max_image_dimension = env_u64("MAX_IMAGE_DIMENSION", 2048).max(1) as u32;

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            bind_addr: env_string("BIND_ADDR", "0.0.0.0"),
            port,
            cors_origin: env_string("CORS_ORIGIN", "http://localhost:5173"),
            openai_api_key: env_string("OPENAI_API_KEY", ""),
            openai_base_url: env_string("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: env_string("OPENAI_MODEL", "gpt-4o-mini"),
            openai_vision_model: env_string("OPENAI_VISION_MODEL", "gpt-4o-mini"),
            openai_embedding_model: env_string("OPENAI_EMBEDDING_MODEL", "text-embedding-3-large"),
            completion_timeout_seconds: env_u64("COMPLETION_TIMEOUT_SECONDS", 90).max(1),
            max_image_bytes: env_usize("MAX_IMAGE_BYTES", 10 * 1024 * 1024),
            max_image_dimension,
            jpeg_quality,
            richness_min_am: env_usize("RICHNESS_MIN_AM", 4),
            richness_min_pm: env_usize("RICHNESS_MIN_PM", 5),
            richness_min_products: env_usize("RICHNESS_MIN_PRODUCTS", 4),
            richness_min_weekly: env_usize(
                "RICHNESS_MIN_WEEKLY",
                richness_weekly_schema.default_min_weekly(),
            ),
            richness_weekly_schema,
            enable_embeddings: env_bool("ENABLE_EMBEDDINGS", true),
            use_pinecone: pinecone_switch(),
            pinecone_api_key: env_string("PINECONE_API_KEY", ""),
            pinecone_index_host: env_string("PINECONE_INDEX_HOST", ""),
            pinecone_top_k: env_usize("PINECONE_TOP_K", 3).max(1),
            pinecone_timeout_ms: env_u64("PINECONE_TIMEOUT_MS", 8000),
            skip_db: env_bool("SKIP_DB", false),
            database_url: env_string("DATABASE_URL", "sqlite://skin_analysis.db?mode=rwc"),
            rate_limit_requests: env_u64("RATE_LIMIT_REQUESTS", 10).max(1) as u32,
            rate_limit_window_seconds: env_u64("RATE_LIMIT_WINDOW_SECONDS", 60).max(1),
            rate_limit_sweep_seconds: env_u64("RATE_LIMIT_SWEEP_SECONDS", 300).max(10),
        })
    }

    pub fn image_limits(&self) -> ImageLimits {
        ImageLimits {
            max_bytes: self.max_image_bytes,
            max_dimension: self.max_image_dimension,
            jpeg_quality: self.jpeg_quality,
        }
    }

    pub fn richness_rules(&self) -> RichnessRules {
        RichnessRules {
            min_am: self.richness_min_am,
            min_pm: self.richness_min_pm,
            min_weekly: self.richness_min_weekly,
            min_products: self.richness_min_products,
            weekly_schema: self.richness_weekly_schema,
        }
    }

    pub fn completion_settings(&self) -> CompletionSettings {
        CompletionSettings {
            call_timeout: Duration::from_secs(self.completion_timeout_seconds),
            ..CompletionSettings::default()
        }
    }

    pub fn pinecone_enabled(&self) -> bool {
        self.use_pinecone
            && !self.pinecone_api_key.trim().is_empty()
            && !self.pinecone_index_host.trim().is_empty()
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr.trim(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_schema_parsing_accepts_both_spellings() {
        assert_eq!(parse_weekly_schema("labeled"), WeeklySchema::Labeled);
        assert_eq!(parse_weekly_schema(" Labelled "), WeeklySchema::Labeled);
        assert_eq!(parse_weekly_schema(""), WeeklySchema::Minimal);
        assert_eq!(parse_weekly_schema("fancy"), WeeklySchema::Minimal);
    }
}
