//! Error taxonomy for the retrieval core.
//!
//! Store backends and the retriever return typed errors so callers can
//! distinguish programmer errors (dimension mismatches, unknown metrics),
//! data errors (invalid vectors), and lifecycle errors (uninitialized store)
//! from backend-specific failures, which travel as [`StoreError::Backend`].

use thiserror::Error;

/// Errors from pure vector operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Similarity was requested between vectors of different length.
    /// Never silently truncated or padded.
    #[error("vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// An unsupported similarity metric name was supplied.
    #[error("unknown similarity metric: '{0}'. Use cosine, euclidean, or dot")]
    UnknownMetric(String),
}

/// Errors from [`DocumentStore`](crate::store::DocumentStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A store operation was called before `initialize` completed.
    #[error("document store used before initialize()")]
    NotInitialized,

    /// A write supplied a vector that is empty or contains non-finite values.
    /// No partial write occurs.
    #[error("invalid vector: must be non-empty with all components finite")]
    InvalidVector,

    /// A vector search supplied an invalid query vector.
    #[error("invalid query vector: must be non-empty with all components finite")]
    InvalidQueryVector,

    #[error(transparent)]
    Vector(#[from] VectorError),

    /// Backend-specific failure (database, network, serialization).
    #[error("store backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    /// Wrap a backend-specific error.
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        Self::Backend(err.into())
    }
}

/// Errors from the hybrid retriever.
///
/// Per-term embedding failures are not errors: the term is dropped and
/// retrieval continues. Only a total failure, where every term was dropped
/// and nothing was searched, surfaces here.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// Every search term failed to embed; no store query was issued.
    #[error("all {terms} search terms failed to embed")]
    AllTermsFailed {
        terms: usize,
        #[source]
        last: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
