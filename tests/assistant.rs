use async_trait::async_trait;
use nl_recall::assistant::{Assistant, AssistantError};
use nl_recall::config::{AppConfig, DatabaseConfig, HistoryConfig, LlmConfig};
use nl_recall::db::executor::QueryExecutionError;
use nl_recall::history::embedder::Embedder;
use nl_recall::history::store::HistoryStore;
use nl_recall::history::HistoryStoreError;
use nl_recall::llm::{SqlGenerator, TranslationError, Translator};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

/// Generator that always answers with the same SQL.
struct FixedSql(&'static str);

#[async_trait]
impl SqlGenerator for FixedSql {
    async fn generate_sql(&self, _question: &str, _schema: &str) -> Result<String, TranslationError> {
        Ok(self.0.to_string())
    }
}

/// Deterministic embedding so identical questions map to identical vectors.
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

fn test_config(dir: &TempDir) -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            path: dir
                .path()
                .join("test.duckdb")
                .to_str()
                .unwrap()
                .to_string(),
            pool_size: 1,
        },
        llm: LlmConfig {
            backend: "openai".to_string(),
            model: "unused".to_string(),
            api_key: None,
            api_url: None,
        },
        history: HistoryConfig {
            index_dir: dir.path().join("index").to_str().unwrap().to_string(),
            model_cache_dir: dir.path().join("models").to_str().unwrap().to_string(),
            recall_limit: 3,
        },
    }
}

fn seed_customers(config: &AppConfig) {
    let conn = duckdb::Connection::open(&config.database.path).unwrap();
    conn.execute_batch(
        "CREATE TABLE Customers (CustomerId INTEGER, Name VARCHAR);
         INSERT INTO Customers VALUES (1, 'Ada'), (2, 'Grace'), (3, 'Edsger');",
    )
    .unwrap();
}

async fn test_assistant(config: &AppConfig, sql: &'static str) -> Assistant {
    let translator = Translator::with_generator(Box::new(FixedSql(sql)));
    let history = HistoryStore::open(
        std::path::Path::new(&config.history.index_dir),
        Arc::new(StubEmbedder),
    )
    .await
    .unwrap();

    Assistant::connect(config, translator, history).await.unwrap()
}

#[tokio::test]
async fn answers_question_and_persists_history() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    seed_customers(&config);

    let assistant = test_assistant(&config, "SELECT COUNT(*) FROM Customers").await;

    let answer = assistant.answer("How many customers?").await.unwrap();
    assert_eq!(answer.table.row_count(), 1);
    assert_eq!(answer.table.rows[0][0], Value::from(3));
    // first-ever question: nothing to recall yet
    assert!(answer.similar.is_empty());

    let records = assistant.history(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].natural_query, "How many customers?");
    assert_eq!(records[0].sql_query, "SELECT COUNT(*) FROM Customers");
    assert_eq!(records[0].row_count, 1);
}

#[tokio::test]
async fn repeated_questions_accumulate_and_recall_each_other() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    seed_customers(&config);

    let assistant = test_assistant(&config, "SELECT COUNT(*) FROM Customers").await;

    assistant.answer("How many customers?").await.unwrap();
    let second = assistant.answer("How many customers?").await.unwrap();

    // the second call sees the first call's record as a neighbor
    assert_eq!(second.similar.len(), 1);
    assert_eq!(second.similar[0].natural_query, "How many customers?");

    // no deduplication: two independent records
    let records = assistant.history(10).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].id, records[1].id);
}

#[tokio::test]
async fn caches_schema_at_startup() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    seed_customers(&config);

    let assistant = test_assistant(&config, "SELECT 1").await;

    let rendered = assistant.schema().render();
    assert!(rendered.contains("Table Customers:"));
    assert!(rendered.contains("  - CustomerId (INTEGER)"));
    assert!(rendered.contains("  - Name (VARCHAR)"));
}

#[tokio::test]
async fn execution_failure_surfaces_and_records_nothing() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    seed_customers(&config);

    let assistant = test_assistant(&config, "SELECT * FROM nonexistent_table").await;

    match assistant.answer("broken").await {
        Err(AssistantError::Execution(QueryExecutionError::Failed { sql, .. })) => {
            assert_eq!(sql, "SELECT * FROM nonexistent_table");
        }
        other => panic!("expected execution failure, got {:?}", other.map(|_| ())),
    }

    let records = assistant.history(10).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn mutating_sql_from_model_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    seed_customers(&config);

    let assistant = test_assistant(&config, "DROP TABLE Customers").await;

    match assistant.answer("please break things").await {
        Err(AssistantError::Execution(QueryExecutionError::Rejected { .. })) => {}
        other => panic!("expected rejection, got {:?}", other.map(|_| ())),
    }

    // the table is untouched; release the pool's file lock before reopening
    drop(assistant);
    let conn = duckdb::Connection::open(&config.database.path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM Customers", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 3);
}
