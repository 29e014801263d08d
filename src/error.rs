//! Error types for the query core

use thiserror::Error;

/// Result type alias for query core operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Main error type for the query core
#[derive(Error, Debug)]
pub enum QueryError {
    /// Invalid operator configuration, detected before any row is processed
    #[error("Configuration error: {0}")]
    Config(String),

    /// An upstream collaborator violated a contract (e.g. a null reached aggregation)
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Memory limit hit or allocation failure while building results
    #[error("Resources exhausted: {0}")]
    ResourcesExhausted(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::collections::TryReserveError> for QueryError {
    fn from(e: std::collections::TryReserveError) -> Self {
        QueryError::ResourcesExhausted(e.to_string())
    }
}
