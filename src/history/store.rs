use crate::history::embedder::Embedder;
use crate::history::{HistoryRecord, HistoryStoreError, RecordMeta, SimilarQuery};
use arrow_array::types::Float32Type;
use arrow_array::{
    ArrayRef, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const TABLE_NAME: &str = "query_history";

// LanceDB scans default to a small limit; full-log reads need an explicit one.
const SCAN_LIMIT: usize = 1_000_000;

/// Persistent, append-only index of past questions and their generated SQL.
///
/// Questions are embedded on write; lookups run a nearest-neighbor scan over
/// the stored vectors. The index survives process restarts.
pub struct HistoryStore {
    table: Table,
    embedder: Arc<dyn Embedder>,
}

impl HistoryStore {
    /// Opens the index at `index_dir`, creating it if it does not exist yet.
    /// Repeated startups against the same directory attach to the existing
    /// index.
    pub async fn open(
        index_dir: &Path,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, HistoryStoreError> {
        let uri = index_dir.to_str().ok_or_else(|| {
            HistoryStoreError::IndexError(format!("non-utf8 index path: {:?}", index_dir))
        })?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| HistoryStoreError::IndexError(e.to_string()))?;

        let table = Self::open_or_create_table(&connection, embedder.dim()).await?;

        info!(index = %index_dir.display(), "query history index ready");
        Ok(Self { table, embedder })
    }

    async fn open_or_create_table(
        connection: &Connection,
        dim: usize,
    ) -> Result<Table, HistoryStoreError> {
        if let Ok(table) = connection.open_table(TABLE_NAME).execute().await {
            return Ok(table);
        }

        let schema = Self::arrow_schema(dim);
        let batches = RecordBatchIterator::new(vec![].into_iter().map(Ok), schema.clone());
        connection
            .create_table(TABLE_NAME, Box::new(batches))
            .execute()
            .await
            .map_err(|e| HistoryStoreError::IndexError(e.to_string()))
    }

    fn arrow_schema(dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("natural_query", DataType::Utf8, false),
            Field::new("sql_query", DataType::Utf8, false),
            Field::new("timestamp", DataType::Utf8, false),
            Field::new("row_count", DataType::Int64, false),
            Field::new("execution_time", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dim as i32,
                ),
                true,
            ),
        ]))
    }

    /// Appends one record. The embedding and its metadata land in a single
    /// batch write, so a failure leaves no partial entry behind.
    pub async fn record(
        &self,
        natural_query: &str,
        sql_query: &str,
        meta: RecordMeta,
    ) -> Result<(), HistoryStoreError> {
        let embedding = self.embedder.embed(natural_query)?;

        let now = Utc::now();
        // Timestamps alone can collide within one clock tick
        let id = format!("{}-{}", now.timestamp_millis(), Uuid::new_v4());
        let timestamp = now.to_rfc3339();

        let dim = self.embedder.dim();
        let embedding_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            vec![Some(
                embedding.into_iter().map(Some).collect::<Vec<Option<f32>>>(),
            )],
            dim as i32,
        );

        let schema = Self::arrow_schema(dim);
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![id.clone()])) as ArrayRef,
                Arc::new(StringArray::from(vec![natural_query.to_string()])) as ArrayRef,
                Arc::new(StringArray::from(vec![sql_query.to_string()])) as ArrayRef,
                Arc::new(StringArray::from(vec![timestamp])) as ArrayRef,
                Arc::new(Int64Array::from(vec![meta.row_count])) as ArrayRef,
                Arc::new(StringArray::from(vec![meta.execution_time])) as ArrayRef,
                Arc::new(embedding_array) as ArrayRef,
            ],
        )
        .map_err(|e| HistoryStoreError::IndexError(e.to_string()))?;

        let batches = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| HistoryStoreError::IndexError(e.to_string()))?;

        debug!(%id, "history record appended");
        Ok(())
    }

    /// Returns up to `limit` past queries semantically closest to
    /// `natural_query`, closest first; ties broken by recency, most recent
    /// first. An empty index yields an empty list.
    pub async fn find_similar(
        &self,
        natural_query: &str,
        limit: usize,
    ) -> Result<Vec<SimilarQuery>, HistoryStoreError> {
        let embedding = self.embedder.embed(natural_query)?;

        self.table
            .checkout_latest()
            .await
            .map_err(|e| HistoryStoreError::IndexError(e.to_string()))?;

        let batches = self
            .table
            .query()
            .nearest_to(embedding.as_slice())
            .map_err(|e| HistoryStoreError::IndexError(e.to_string()))?
            .limit(limit)
            .execute()
            .await
            .map_err(|e| HistoryStoreError::IndexError(e.to_string()))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| HistoryStoreError::IndexError(e.to_string()))?;

        let mut hits: Vec<(f32, SimilarQuery)> = Vec::new();
        for batch in &batches {
            let natural_queries = string_column(batch, "natural_query")?;
            let sql_queries = string_column(batch, "sql_query")?;
            let timestamps = string_column(batch, "timestamp")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            for i in 0..batch.num_rows() {
                let distance = distances.map(|d| d.value(i)).unwrap_or(f32::INFINITY);
                hits.push((
                    distance,
                    SimilarQuery {
                        natural_query: natural_queries.value(i).to_string(),
                        sql_query: sql_queries.value(i).to_string(),
                        timestamp: timestamps.value(i).to_string(),
                    },
                ));
            }
        }

        hits.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.1.timestamp.cmp(&a.1.timestamp))
        });
        hits.truncate(limit);

        Ok(hits.into_iter().map(|(_, q)| q).collect())
    }

    /// Full records, most recent first. The append-only log is never pruned,
    /// so callers pass a limit.
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryStoreError> {
        self.table
            .checkout_latest()
            .await
            .map_err(|e| HistoryStoreError::IndexError(e.to_string()))?;

        let batches = self
            .table
            .query()
            .limit(SCAN_LIMIT)
            .execute()
            .await
            .map_err(|e| HistoryStoreError::IndexError(e.to_string()))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| HistoryStoreError::IndexError(e.to_string()))?;

        let mut records = Vec::new();
        for batch in &batches {
            let ids = string_column(batch, "id")?;
            let natural_queries = string_column(batch, "natural_query")?;
            let sql_queries = string_column(batch, "sql_query")?;
            let timestamps = string_column(batch, "timestamp")?;
            let execution_times = string_column(batch, "execution_time")?;
            let row_counts = batch
                .column_by_name("row_count")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| {
                    HistoryStoreError::IndexError("missing column row_count".to_string())
                })?;

            for i in 0..batch.num_rows() {
                records.push(HistoryRecord {
                    id: ids.value(i).to_string(),
                    natural_query: natural_queries.value(i).to_string(),
                    sql_query: sql_queries.value(i).to_string(),
                    timestamp: timestamps.value(i).to_string(),
                    row_count: row_counts.value(i),
                    execution_time: execution_times.value(i).to_string(),
                });
            }
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a StringArray, HistoryStoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| HistoryStoreError::IndexError(format!("missing column {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Deterministic bag-of-bytes embedding; identical text maps to an
    /// identical vector.
    struct StubEmbedder;

    impl Embedder for StubEmbedder {
        fn dim(&self) -> usize {
            8
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, HistoryStoreError> {
            let mut v = vec![0.0f32; 8];
            for (i, b) in text.bytes().enumerate() {
                v[i % 8] += f32::from(b) / 255.0;
            }
            Ok(v)
        }
    }

    async fn open_store(dir: &TempDir) -> HistoryStore {
        HistoryStore::open(&dir.path().join("index"), Arc::new(StubEmbedder))
            .await
            .unwrap()
    }

    fn meta(row_count: i64) -> RecordMeta {
        RecordMeta {
            row_count,
            execution_time: Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn empty_index_returns_no_neighbors() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let similar = store.find_similar("top customers", 3).await.unwrap();
        assert!(similar.is_empty());
    }

    #[tokio::test]
    async fn exact_match_is_top_neighbor() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.record("Q1", "SELECT 1", meta(1)).await.unwrap();
        store
            .record("something else entirely", "SELECT 2", meta(1))
            .await
            .unwrap();

        let similar = store.find_similar("Q1", 1).await.unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].natural_query, "Q1");
        assert_eq!(similar[0].sql_query, "SELECT 1");
    }

    #[tokio::test]
    async fn repeated_questions_append_independent_records() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.record("How many?", "SELECT COUNT(*)", meta(1)).await.unwrap();
        store.record("How many?", "SELECT COUNT(*)", meta(1)).await.unwrap();

        let similar = store.find_similar("How many?", 5).await.unwrap();
        assert_eq!(similar.len(), 2);

        let records = store.recent(10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].id, records[1].id);
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir).await;
            store.record("persisted?", "SELECT 42", meta(1)).await.unwrap();
        }

        let store = open_store(&dir).await;
        let similar = store.find_similar("persisted?", 1).await.unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].sql_query, "SELECT 42");
    }

    #[tokio::test]
    async fn recent_reports_stored_metadata() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.record("Q", "SELECT 1", meta(7)).await.unwrap();

        let records = store.recent(1).await.unwrap();
        assert_eq!(records[0].row_count, 7);
        assert_eq!(records[0].natural_query, "Q");
    }
}
