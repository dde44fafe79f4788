use crate::db::DataSourceError;
use duckdb::Connection;
use tracing::debug;

/// One column of a table: declared name and declared type.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// Table/column metadata for the whole database, captured once per session.
/// Tables appear in declaration order, columns in their natural order.
#[derive(Debug, Clone)]
pub struct SchemaDescription {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescription {
    /// Deterministic flattened rendering, injected into translation prompts:
    ///
    /// ```text
    /// Table Customers:
    ///   - CustomerId (INTEGER)
    ///   - FirstName (VARCHAR)
    /// ```
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for table in &self.tables {
            lines.push(format!("Table {}:", table.name));
            for column in &table.columns {
                lines.push(format!("  - {} ({})", column.name, column.data_type));
            }
        }
        lines.join("\n")
    }
}

/// Reads table and column metadata from the database.
///
/// Tables come from `sqlite_master` (internal tables filtered out), columns from
/// `PRAGMA table_info`. Any failure is fatal to the caller; the result is meant
/// to be cached for the lifetime of the session.
pub fn describe_schema(conn: &Connection) -> Result<SchemaDescription, DataSourceError> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type='table' \
             AND name NOT LIKE 'sqlite_%' AND name NOT LIKE 'duck_%' AND name NOT LIKE 'pg_%'",
        )
        .map_err(|e| DataSourceError::MetadataError(e.to_string()))?;

    let table_names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| DataSourceError::MetadataError(e.to_string()))?
        .filter_map(Result::ok)
        .collect();

    debug!("Introspecting {} tables", table_names.len());

    let mut tables = Vec::with_capacity(table_names.len());
    for table_name in table_names {
        let mut col_stmt = conn
            .prepare(&format!("PRAGMA table_info(\"{}\")", table_name))
            .map_err(|e| DataSourceError::MetadataError(e.to_string()))?;

        let columns: Vec<ColumnSchema> = col_stmt
            .query_map([], |row| {
                Ok(ColumnSchema {
                    name: row.get::<_, String>(1)?,
                    data_type: row.get::<_, String>(2)?,
                })
            })
            .map_err(|e| DataSourceError::MetadataError(e.to_string()))?
            .filter_map(Result::ok)
            .collect();

        tables.push(TableSchema {
            name: table_name,
            columns,
        });
    }

    Ok(SchemaDescription { tables })
}
