pub mod embedder;
pub mod store;

use serde::Serialize;
use std::error::Error;
use std::fmt;

/// Failure reading or writing the persistent query-history index.
#[derive(Debug)]
pub enum HistoryStoreError {
    IndexError(String),
    EmbeddingError(String),
}

impl fmt::Display for HistoryStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryStoreError::IndexError(msg) => write!(f, "history index error: {}", msg),
            HistoryStoreError::EmbeddingError(msg) => write!(f, "embedding error: {}", msg),
        }
    }
}

impl Error for HistoryStoreError {}

/// Execution metadata stored alongside a recorded question.
#[derive(Debug, Clone)]
pub struct RecordMeta {
    pub row_count: i64,
    /// ISO-8601 completion time of the execution
    pub execution_time: String,
}

/// One entry of the append-only history log. Never mutated or deleted.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub id: String,
    pub natural_query: String,
    pub sql_query: String,
    pub timestamp: String,
    pub row_count: i64,
    pub execution_time: String,
}

/// Read-only projection of a [`HistoryRecord`] handed back to the caller from
/// similarity lookups. Never persisted separately.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarQuery {
    pub natural_query: String,
    pub sql_query: String,
    pub timestamp: String,
}
