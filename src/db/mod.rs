pub mod database;
pub mod models;

use async_trait::async_trait;

pub use database::Database;
pub use models::{AnalysisLogEntry, AnalysisLogMetadata};

#[async_trait]
pub trait AnalysisLogSink: Send + Sync {
    async fn record(&self, entry: AnalysisLogEntry) -> anyhow::Result<()>;

    async fn health(&self) -> bool;
}
