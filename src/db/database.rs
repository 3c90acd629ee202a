use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

use crate::db::models::AnalysisLogEntry;
use crate::db::AnalysisLogSink;

const QUEUE_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    sender: mpsc::Sender<AnalysisLogEntry>,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        Self::init_with_connections(database_url, 5).await
    }

    pub async fn init_with_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("failed to open database {database_url}"))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS skin_analysis_logs (\
                id TEXT PRIMARY KEY,\
                created_at TEXT NOT NULL,\
                analysis_json TEXT NOT NULL,\
                retrieved_context_json TEXT NOT NULL,\
                embedding_json TEXT NOT NULL,\
                metadata_json TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_skin_analysis_logs_created_at ON skin_analysis_logs(created_at);",
        )
        .execute(&pool)
        .await?;

        info!("Database tables created successfully");

        Ok(Self::with_queue(pool, QUEUE_CAPACITY))
    }

    fn with_queue(pool: SqlitePool, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        let writer_pool = pool.clone();
        tokio::spawn(async move {
            db_writer(writer_pool, receiver).await;
        });

        info!("Database writer task started");

        Database { pool, sender }
    }

    // Never waits on the writer: a full queue drops the entry.
    pub fn queue_log(&self, entry: AnalysisLogEntry) -> Result<()> {
        match self.sender.try_send(entry) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(entry)) => {
                warn!("Analysis log queue is full, dropping {}", entry.id);
                anyhow::bail!("analysis log queue is full")
            }
            Err(TrySendError::Closed(entry)) => {
                anyhow::bail!("analysis log writer stopped, dropping {}", entry.id)
            }
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

}

#[async_trait]
impl AnalysisLogSink for Database {
    async fn record(&self, entry: AnalysisLogEntry) -> Result<()> {
        self.queue_log(entry)
    }

    async fn health(&self) -> bool {
        match self.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!("Database health check failed: {err}");
                false
            }
        }
    }
}

async fn insert_log(pool: &SqlitePool, entry: &AnalysisLogEntry) -> Result<()> {
    let analysis_json = serde_json::to_string(&entry.analysis)?;
    let retrieved_context_json = serde_json::to_string(&entry.retrieved_context)?;
    let embedding_json = serde_json::to_string(&entry.embedding)?;
    let metadata_json = serde_json::to_string(&entry.metadata)?;

    sqlx::query(
        "INSERT INTO skin_analysis_logs \
         (id, created_at, analysis_json, retrieved_context_json, embedding_json, metadata_json) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(entry.created_at)
    .bind(analysis_json)
    .bind(retrieved_context_json)
    .bind(embedding_json)
    .bind(metadata_json)
    .execute(pool)
    .await?;
    Ok(())
}

async fn db_writer(pool: SqlitePool, mut receiver: mpsc::Receiver<AnalysisLogEntry>) {
    while let Some(entry) = receiver.recv().await {
        if let Err(err) = insert_log(&pool, &entry).await {
            warn!("Error in db_writer for {}: {err}", entry.id);
        }
    }

    let _ = pool.close().await;
    info!("Database writer task stopped");
}
