//! Errors surfaced to callers of the query layer.

use thiserror::Error;

/// Failure of the underlying query executor.
///
/// Cache-layer failures never appear here; they are absorbed by the engine.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("invalid query descriptor: {0}")]
    InvalidDescriptor(String),
}

pub type QueryResult<T> = Result<T, QueryError>;
