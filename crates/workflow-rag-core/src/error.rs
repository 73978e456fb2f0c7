//! Typed errors shared by the collection store and the pipeline executor.

use thiserror::Error;

/// Failures raised by a [`VectorBackend`](crate::store::VectorBackend) or
/// the [`CollectionStore`](crate::collections::CollectionStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),

    /// The stored vector width of a collection disagrees with the width
    /// produced by the current embedding provider.
    #[error("embedding dimension mismatch for collection '{collection}': stored {stored}, got {got}")]
    DimensionMismatch {
        collection: String,
        stored: usize,
        got: usize,
    },

    #[error("invalid collection name '{0}'")]
    InvalidName(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True for the error the store recovers from by rebuilding.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, StoreError::DimensionMismatch { .. })
    }
}

/// Failures that abort a pipeline run.
///
/// Retrieval failures never appear here: the knowledge-base node degrades
/// to an empty context instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("generation failed ({model}): {message}")]
    Generation { model: String, message: String },
}
