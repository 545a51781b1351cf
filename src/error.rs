//! Crate-wide error taxonomy.
//!
//! The variants are behavioral classes, not just labels: [`StrataError::EmbeddingUnavailable`]
//! degrades retrieval to lexical-only, [`StrataError::StoreCorruption`] triggers an index
//! rebuild from the append log, and [`StrataError::InvalidConfiguration`] is fatal at
//! construction time only. Capacity is never an error — bounded stores resolve it by eviction.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrataError {
    /// The external embedder failed or no embedding is present where one is required.
    /// Callers degrade to lexical-only retrieval; indexing is retried later.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A derived index disagrees with (or cannot be read against) its source of truth.
    /// The cold index is rebuildable from the append log; warm/hot loss is acceptable.
    #[error("store corruption: {0}")]
    StoreCorruption(String),

    /// Rejected configuration — raised only during construction/validation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A referenced memory or session does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StrataError>;
