use crate::config::AppConfig;
use crate::db::executor::{self, QueryExecutionError, QueryTable};
use crate::db::schema::{describe_schema, SchemaDescription};
use crate::db::{self, DataSourceError, DuckDbConnectionManager};
use crate::history::embedder::FastEmbedder;
use crate::history::store::HistoryStore;
use crate::history::{HistoryStoreError, RecordMeta, SimilarQuery};
use crate::llm::{TranslationError, Translator};
use chrono::Utc;
use r2d2::Pool;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Any failure surfaced by [`Assistant::answer`], tagged by the component that
/// produced it.
#[derive(Debug)]
pub enum AssistantError {
    DataSource(DataSourceError),
    Translation(TranslationError),
    Execution(QueryExecutionError),
    History(HistoryStoreError),
}

impl fmt::Display for AssistantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssistantError::DataSource(e) => e.fmt(f),
            AssistantError::Translation(e) => e.fmt(f),
            AssistantError::Execution(e) => e.fmt(f),
            AssistantError::History(e) => e.fmt(f),
        }
    }
}

impl Error for AssistantError {}

impl From<DataSourceError> for AssistantError {
    fn from(e: DataSourceError) -> Self {
        AssistantError::DataSource(e)
    }
}

impl From<TranslationError> for AssistantError {
    fn from(e: TranslationError) -> Self {
        AssistantError::Translation(e)
    }
}

impl From<QueryExecutionError> for AssistantError {
    fn from(e: QueryExecutionError) -> Self {
        AssistantError::Execution(e)
    }
}

impl From<HistoryStoreError> for AssistantError {
    fn from(e: HistoryStoreError) -> Self {
        AssistantError::History(e)
    }
}

/// The result of answering one question: the materialized rows plus the
/// similar past questions found before execution.
#[derive(Debug, Serialize)]
pub struct QueryAnswer {
    pub table: QueryTable,
    pub similar: Vec<SimilarQuery>,
}

/// Sequences the pipeline: similarity lookup, translation, execution, history
/// update. One `answer` call runs to completion before the next; there is no
/// internal concurrency.
pub struct Assistant {
    pool: Pool<DuckDbConnectionManager>,
    schema: SchemaDescription,
    schema_text: String,
    translator: Translator,
    history: HistoryStore,
    recall_limit: usize,
}

impl Assistant {
    /// Opens the database and introspects its schema once. Schema failure is
    /// fatal here; the description is cached for the lifetime of the session.
    pub async fn connect(
        config: &AppConfig,
        translator: Translator,
        history: HistoryStore,
    ) -> Result<Self, AssistantError> {
        let pool = db::open_pool(&config.database.path, config.database.pool_size)?;

        let schema_pool = pool.clone();
        let schema = tokio::task::spawn_blocking(move || {
            let conn = schema_pool
                .get()
                .map_err(|e| DataSourceError::ConnectionError(e.to_string()))?;
            describe_schema(&conn)
        })
        .await
        .map_err(|e| DataSourceError::ConnectionError(e.to_string()))??;

        let schema_text = schema.render();
        info!(tables = schema.tables.len(), "schema cached for session");

        Ok(Self {
            pool,
            schema,
            schema_text,
            translator,
            history,
            recall_limit: config.history.recall_limit,
        })
    }

    /// Production wiring: the configured LLM backend plus a fastembed-backed
    /// history index at the configured locations.
    pub async fn from_config(config: &AppConfig) -> Result<Self, AssistantError> {
        let translator = Translator::from_config(&config.llm)?;

        // Model load may download weights on first run
        let cache_dir = PathBuf::from(&config.history.model_cache_dir);
        let embedder = tokio::task::spawn_blocking(move || FastEmbedder::new(&cache_dir))
            .await
            .map_err(|e| HistoryStoreError::EmbeddingError(e.to_string()))??;

        let history =
            HistoryStore::open(Path::new(&config.history.index_dir), Arc::new(embedder)).await?;

        Self::connect(config, translator, history).await
    }

    pub fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    /// Answers one natural-language question.
    ///
    /// A similarity-lookup failure degrades to an empty similar-list; any
    /// failure after that surfaces as its component's error kind and the
    /// similar-list already obtained is discarded with it.
    pub async fn answer(&self, question: &str) -> Result<QueryAnswer, AssistantError> {
        let similar = match self.history.find_similar(question, self.recall_limit).await {
            Ok(similar) => similar,
            Err(e) => {
                warn!("similarity lookup failed, continuing without history: {}", e);
                Vec::new()
            }
        };

        let sql = self.translator.translate(question, &self.schema_text).await?;
        info!(%sql, "generated SQL");

        let pool = self.pool.clone();
        let exec_sql = sql.clone();
        let table = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| QueryExecutionError::Failed {
                sql: exec_sql.clone(),
                message: e.to_string(),
            })?;
            executor::execute(&conn, &exec_sql)
        })
        .await
        .map_err(|e| QueryExecutionError::Failed {
            sql: sql.clone(),
            message: e.to_string(),
        })??;

        self.history
            .record(
                question,
                &sql,
                RecordMeta {
                    row_count: table.row_count() as i64,
                    execution_time: Utc::now().to_rfc3339(),
                },
            )
            .await?;

        Ok(QueryAnswer { table, similar })
    }

    /// Recent history entries, for callers that want to show past activity.
    pub async fn history(&self, limit: usize) -> Result<Vec<crate::history::HistoryRecord>, AssistantError> {
        Ok(self.history.recent(limit).await?)
    }
}
