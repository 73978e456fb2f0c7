//! Errors raised by the knowledge-base service.

use thiserror::Error;
use workflow_rag_core::error::StoreError;

use crate::extract::ExtractError;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("{0}")]
    MalformedRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("file storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Extraction(#[from] ExtractError),
}

impl KnowledgeError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        KnowledgeError::MalformedRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        KnowledgeError::NotFound(msg.into())
    }
}
