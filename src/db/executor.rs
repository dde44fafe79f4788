use chrono::DateTime;
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::Connection;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use tracing::debug;

/// SQL execution failure, carrying the offending statement.
#[derive(Debug)]
pub enum QueryExecutionError {
    /// The statement was not a read-only query and was never sent to the store.
    Rejected { sql: String },
    /// The store reported an error while preparing or running the statement.
    Failed { sql: String, message: String },
}

impl fmt::Display for QueryExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryExecutionError::Rejected { sql } => {
                write!(f, "refusing to run non-read-only statement: {}", sql)
            }
            QueryExecutionError::Failed { sql, message } => {
                write!(f, "query execution failed: {} (sql: {})", message, sql)
            }
        }
    }
}

impl Error for QueryExecutionError {}

/// Materialized result set: ordered column names plus rows of scalar values,
/// in the order the store returned them.
#[derive(Debug, Clone, Serialize)]
pub struct QueryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// Statements allowed through the read-only gate, by leading keyword.
// Generated SQL is untrusted; DDL/DML never reaches the store.
const READ_ONLY_KEYWORDS: &[&str] = &[
    "SELECT",
    "WITH",
    "FROM", // DuckDB's FROM-first syntax
    "SHOW",
    "DESCRIBE",
    "EXPLAIN",
    "PRAGMA",
    "SUMMARIZE",
];

fn is_read_only(sql: &str) -> bool {
    let first_word = sql
        .split_whitespace()
        .next()
        .map(|w| w.trim_start_matches('(').to_uppercase())
        .unwrap_or_default();
    READ_ONLY_KEYWORDS.iter().any(|kw| first_word == *kw)
}

/// Runs `sql` verbatim and materializes all returned rows.
///
/// Column names and order are preserved as returned by the store. Any
/// preparation or execution error is surfaced with the original SQL attached;
/// there is no retry and no rewriting.
pub fn execute(conn: &Connection, sql: &str) -> Result<QueryTable, QueryExecutionError> {
    if !is_read_only(sql) {
        return Err(QueryExecutionError::Rejected {
            sql: sql.to_string(),
        });
    }

    let failed = |message: String| QueryExecutionError::Failed {
        sql: sql.to_string(),
        message,
    };

    let mut stmt = conn.prepare(sql).map_err(|e| failed(e.to_string()))?;

    let column_count = stmt.column_count();
    let columns: Vec<String> = (0..column_count)
        .map(|i| {
            stmt.column_name(i)
                .map(|n| n.to_string())
                .unwrap_or_else(|_| format!("column_{}", i))
        })
        .collect();

    let mut rows = stmt.query([]).map_err(|e| failed(e.to_string()))?;

    let mut table = QueryTable {
        columns,
        rows: Vec::new(),
    };

    while let Some(row) = rows.next().map_err(|e| failed(e.to_string()))? {
        let mut cells = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let cell = row
                .get_ref(i)
                .map(cell_to_value)
                .map_err(|e| failed(e.to_string()))?;
            cells.push(cell);
        }
        table.rows.push(cells);
    }

    debug!(rows = table.row_count(), "query materialized");
    Ok(table)
}

fn timestamp_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value * 1_000_000,
        TimeUnit::Millisecond => value * 1_000,
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn cell_to_value(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::from(b),
        ValueRef::TinyInt(i) => Value::from(i),
        ValueRef::SmallInt(i) => Value::from(i),
        ValueRef::Int(i) => Value::from(i),
        ValueRef::BigInt(i) => Value::from(i),
        ValueRef::HugeInt(i) => match i64::try_from(i) {
            Ok(v) => Value::from(v),
            Err(_) => Value::from(i.to_string()),
        },
        ValueRef::UTinyInt(u) => Value::from(u),
        ValueRef::USmallInt(u) => Value::from(u),
        ValueRef::UInt(u) => Value::from(u),
        ValueRef::UBigInt(u) => Value::from(u),
        ValueRef::Float(f) => Value::from(f),
        ValueRef::Double(f) => Value::from(f),
        ValueRef::Decimal(d) => Value::from(d.to_string()),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(String::from_utf8_lossy(b).into_owned()),
        ValueRef::Timestamp(unit, v) => {
            match DateTime::from_timestamp_micros(timestamp_micros(unit, v)) {
                Some(dt) => Value::from(dt.to_rfc3339()),
                None => Value::Null,
            }
        }
        ValueRef::Date32(days) => match DateTime::from_timestamp(i64::from(days) * 86_400, 0) {
            Some(dt) => Value::from(dt.date_naive().to_string()),
            None => Value::Null,
        },
        other => Value::from(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn select_one_column() {
        let conn = test_conn();
        let table = execute(&conn, "SELECT 1 AS x").unwrap();
        assert_eq!(table.columns, vec!["x"]);
        assert_eq!(table.rows, vec![vec![Value::from(1)]]);
    }

    #[test]
    fn preserves_column_order_and_types() {
        let conn = test_conn();
        let table = execute(
            &conn,
            "SELECT true AS flag, 2.5 AS ratio, 'hi' AS label, NULL AS missing",
        )
        .unwrap();
        assert_eq!(table.columns, vec!["flag", "ratio", "label", "missing"]);
        assert_eq!(table.rows[0][0], Value::from(true));
        assert_eq!(table.rows[0][2], Value::from("hi"));
        assert_eq!(table.rows[0][3], Value::Null);
    }

    #[test]
    fn unknown_table_fails_with_original_sql() {
        let conn = test_conn();
        let err = execute(&conn, "SELECT * FROM nonexistent_table").unwrap_err();
        match err {
            QueryExecutionError::Failed { sql, .. } => {
                assert_eq!(sql, "SELECT * FROM nonexistent_table")
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn rejects_mutating_statements() {
        let conn = test_conn();
        for sql in [
            "DROP TABLE t",
            "INSERT INTO t VALUES (1)",
            "DELETE FROM t",
            "create table t (a INTEGER)",
        ] {
            match execute(&conn, sql) {
                Err(QueryExecutionError::Rejected { .. }) => {}
                other => panic!("expected rejection for {:?}, got {:?}", sql, other),
            }
        }
    }

    #[test]
    fn allows_cte_queries() {
        let conn = test_conn();
        let table = execute(&conn, "WITH t AS (SELECT 7 AS n) SELECT n FROM t").unwrap();
        assert_eq!(table.rows[0][0], Value::from(7));
    }

    #[test]
    fn renders_timestamps_as_rfc3339() {
        let conn = test_conn();
        let table = execute(&conn, "SELECT TIMESTAMP '2024-01-15 10:30:00' AS ts").unwrap();
        let rendered = table.rows[0][0].as_str().unwrap();
        assert!(rendered.starts_with("2024-01-15T10:30:00"), "{}", rendered);
    }
}
