pub mod executor;
pub mod schema;

use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use std::error::Error;
use std::fmt;

/// Failure opening the database or reading its metadata. Fatal at startup.
#[derive(Debug)]
pub enum DataSourceError {
    ConnectionError(String),
    MetadataError(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::ConnectionError(msg) => {
                write!(f, "database connection error: {}", msg)
            }
            DataSourceError::MetadataError(msg) => {
                write!(f, "schema metadata error: {}", msg)
            }
        }
    }
}

impl Error for DataSourceError {}

pub struct DuckDbConnectionManager {
    path: String,
}

impl DuckDbConnectionManager {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl ManageConnection for DuckDbConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Connection::open(&self.path)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Opens an r2d2 pool over the DuckDB file at `path`.
pub fn open_pool(path: &str, pool_size: usize) -> Result<Pool<DuckDbConnectionManager>, DataSourceError> {
    let manager = DuckDbConnectionManager::new(path);
    Pool::builder()
        .max_size(pool_size as u32)
        .build(manager)
        .map_err(|e| DataSourceError::ConnectionError(e.to_string()))
}
