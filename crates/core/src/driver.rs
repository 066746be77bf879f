use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Database engines a session can connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseKind {
    Sqlite,
    MySql,
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => f.write_str("SQLite"),
            Self::MySql => f.write_str("MySQL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown database kind `{0}`, expected sqlite or mysql")]
pub struct UnknownDatabaseKind(String);

impl FromStr for DatabaseKind {
    type Err = UnknownDatabaseKind;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "mysql" => Ok(Self::MySql),
            other => Err(UnknownDatabaseKind(other.to_string())),
        }
    }
}

/// A single result cell. SQLite values map onto this unchanged; the MySQL
/// adapter decodes its byte-typed wire values into `Text` before they reach
/// the model.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Blob(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("file {path} is not found or is unaccessible")]
    FileNotFound { path: String },
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("query failed: {0}")]
    Query(String),
}

/// Entry point for one database engine; resolved by kind at connect time.
#[async_trait]
pub trait Driver: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    /// Validates the engine-specific connection string and opens a
    /// connection.
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>, DriverError>;
}

/// An open database connection. A session owns exactly zero or one.
#[async_trait]
pub trait Connection: Send {
    /// Runs a query and hands back its forward-only cursor. Opening a new
    /// cursor invalidates any prior one on the same connection.
    async fn start_query(&mut self, sql: &str) -> Result<Box<dyn Cursor>, DriverError>;

    async fn commit(&mut self) -> Result<(), DriverError>;

    async fn rollback(&mut self) -> Result<(), DriverError>;

    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// Forward-only handle over a query's pending rows.
#[async_trait]
pub trait Cursor: Send {
    /// Column names from cursor metadata, when the engine exposes them.
    fn headers(&self) -> Option<Vec<String>>;

    async fn next_row(&mut self) -> Result<Option<Row>, DriverError>;

    /// Pulls up to `limit` rows. A short batch means the cursor is likely
    /// exhausted.
    async fn fetch_batch(&mut self, limit: usize) -> Result<Vec<Row>, DriverError> {
        let mut batch = Vec::new();
        while batch.len() < limit {
            match self.next_row().await? {
                Some(row) => batch.push(row),
                None => break,
            }
        }
        Ok(batch)
    }
}
