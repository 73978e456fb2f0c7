//! Vector backend abstraction.
//!
//! The [`VectorBackend`] trait defines the raw storage operations behind
//! the [`CollectionStore`](crate::collections::CollectionStore): named
//! collections of records, each record carrying a document text, JSON
//! metadata, and an embedding vector. Backends know nothing about
//! embedding providers; they only enforce that every vector in a
//! collection has the width the collection was created with.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::CollectionInfo;

/// A stored record without its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub document: String,
    pub metadata: serde_json::Value,
}

/// A record ready to be written, together with its embedding.
#[derive(Debug, Clone)]
pub struct EmbeddedRecord {
    pub record: Record,
    pub embedding: Vec<f32>,
}

/// A similarity-search result.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub record: Record,
    /// Cosine similarity between the query vector and the record vector.
    pub score: f32,
}

/// Abstract storage backend for vector collections.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_or_create_collection`](VectorBackend::get_or_create_collection) | Fetch a collection, creating it with `dims` if absent |
/// | [`get_collection`](VectorBackend::get_collection) | Fetch a collection without creating it |
/// | [`list_collections`](VectorBackend::list_collections) | Every collection with its record count |
/// | [`delete_collection`](VectorBackend::delete_collection) | Drop a collection and all its records |
/// | [`upsert`](VectorBackend::upsert) | Insert or replace records by id |
/// | [`query`](VectorBackend::query) | Top-K cosine similarity search |
/// | [`records`](VectorBackend::records) | All records of a collection |
/// | [`delete`](VectorBackend::delete) | Remove records by id |
/// | [`reset`](VectorBackend::reset) | Drop every collection |
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Fetch `name`, creating it bound to `dims` if it does not exist.
    ///
    /// Returns [`StoreError::DimensionMismatch`] when the collection exists
    /// with a different width.
    async fn get_or_create_collection(
        &self,
        name: &str,
        dims: usize,
    ) -> Result<CollectionInfo, StoreError>;

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError>;

    /// Returns [`StoreError::CollectionNotFound`] if `name` does not exist.
    async fn delete_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Insert or replace records. All writes of one call land together or
    /// not at all.
    async fn upsert(&self, collection: &str, records: &[EmbeddedRecord]) -> Result<(), StoreError>;

    /// Up to `top_k` records ranked by descending similarity to `vector`.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryHit>, StoreError>;

    async fn records(&self, collection: &str) -> Result<Vec<Record>, StoreError>;

    /// Remove records by id. Unknown ids are ignored.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<(), StoreError>;

    async fn reset(&self) -> Result<(), StoreError>;
}
