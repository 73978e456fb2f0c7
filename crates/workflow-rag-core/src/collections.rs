//! Collection store: embedding-aware collection lifecycle on top of a
//! [`VectorBackend`].
//!
//! The store binds every collection to the width of the configured
//! [`EmbeddingProvider`]. When a collection was created under a different
//! width (the provider or its model changed), [`CollectionStore::get_or_create`]
//! treats it as irrecoverable schema drift: the collection is dropped and
//! recreated empty. The rebuild is reported through
//! [`CollectionHandle::rebuilt`] so callers can surface the data loss.
//!
//! A knowledge base owns a primary collection and its `__files` shadow.
//! [`CollectionStore::open_knowledge_base`] resolves the pair as a unit:
//! if either side is stale, both are rebuilt, so the file listing never
//! outlives the chunks it describes.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::chunk::is_chunk_of;
use crate::embedding::{embed_batched, EmbeddingProvider};
use crate::error::StoreError;
use crate::models::{
    files_collection, is_files_collection, validate_collection_name, CollectionInfo,
    DocumentChunk, FileEntry, FileRecord,
};
use crate::store::{EmbeddedRecord, Record, VectorBackend};

/// Texts per embedding call when the caller does not configure one.
const DEFAULT_EMBED_BATCH: usize = 64;

/// Result of [`CollectionStore::get_or_create`].
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    pub info: CollectionInfo,
    /// True if an existing collection was dropped and recreated because
    /// its stored width disagreed with the embedding provider.
    pub rebuilt: bool,
}

/// Result of [`CollectionStore::open_knowledge_base`].
#[derive(Debug, Clone)]
pub struct KnowledgeBaseHandle {
    pub primary: CollectionInfo,
    pub files: CollectionInfo,
    /// Collections dropped and recreated by this call, primary first.
    pub rebuilt: Vec<String>,
}

/// Embedding-aware collection operations shared by ingestion, retrieval,
/// and lifecycle management.
#[derive(Clone)]
pub struct CollectionStore {
    backend: Arc<dyn VectorBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl CollectionStore {
    pub fn new(backend: Arc<dyn VectorBackend>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            backend,
            embedder,
            batch_size: DEFAULT_EMBED_BATCH,
        }
    }

    /// Sets how many texts are sent to the embedding provider per call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn backend(&self) -> &Arc<dyn VectorBackend> {
        &self.backend
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Fetch or create `name`, rebuilding it on a dimension mismatch.
    pub async fn get_or_create(&self, name: &str) -> Result<CollectionHandle, StoreError> {
        let dims = self.embedder.dims();
        match self.backend.get_or_create_collection(name, dims).await {
            Ok(info) => Ok(CollectionHandle {
                info,
                rebuilt: false,
            }),
            Err(err) if err.is_dimension_mismatch() => {
                warn!(
                    collection = name,
                    error = %err,
                    "Rebuilding collection after embedding dimension mismatch; previous records are discarded"
                );
                self.backend.delete_collection(name).await?;
                let info = self.backend.get_or_create_collection(name, dims).await?;
                Ok(CollectionHandle {
                    info,
                    rebuilt: true,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Fetch or create both collections of the knowledge base `name`.
    ///
    /// When either collection was created under a different width than
    /// the embedding provider's, both are dropped and recreated empty.
    pub async fn open_knowledge_base(&self, name: &str) -> Result<KnowledgeBaseHandle, StoreError> {
        validate_collection_name(name)?;
        let dims = self.embedder.dims();
        let shadow = files_collection(name);

        let mut stale = false;
        for collection in [name, shadow.as_str()] {
            if let Some(info) = self.backend.get_collection(collection).await? {
                stale |= info.dims != dims;
            }
        }

        let mut rebuilt = Vec::new();
        if stale {
            warn!(
                collection = name,
                dims,
                "Rebuilding knowledge base after embedding dimension mismatch; previous records are discarded"
            );
            for collection in [name, shadow.as_str()] {
                match self.backend.delete_collection(collection).await {
                    Ok(()) => rebuilt.push(collection.to_string()),
                    Err(StoreError::CollectionNotFound(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }

        let primary = self.get_or_create(name).await?;
        let files = self.get_or_create(&shadow).await?;
        for (handle, collection) in [(&primary, name), (&files, shadow.as_str())] {
            if handle.rebuilt && !rebuilt.iter().any(|c| c == collection) {
                rebuilt.push(collection.to_string());
            }
        }

        Ok(KnowledgeBaseHandle {
            primary: primary.info,
            files: files.info,
            rebuilt,
        })
    }

    /// Embed and write chunks into `collection` in a single backend call.
    pub async fn add(&self, collection: &str, chunks: &[DocumentChunk]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed(&texts).await?;

        let records: Vec<EmbeddedRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, embedding)| EmbeddedRecord {
                record: Record {
                    id: chunk.id.clone(),
                    document: chunk.text.clone(),
                    metadata: json!({
                        "source": chunk.metadata.source,
                        "chunk": chunk.metadata.chunk,
                    }),
                },
                embedding,
            })
            .collect();

        self.backend.upsert(collection, &records).await?;
        debug!(collection, chunks = records.len(), "Added chunks");
        Ok(())
    }

    /// Write the file record for `record.filename` into the shadow
    /// collection of `name`, replacing any earlier record for that filename.
    pub async fn put_file_record(&self, name: &str, record: &FileRecord) -> Result<(), StoreError> {
        let vectors = self.embed(std::slice::from_ref(&record.filename)).await?;
        let embedding = vectors
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Embedding("empty embedding response".to_string()))?;

        let row = EmbeddedRecord {
            record: Record {
                id: record.filename.clone(),
                document: record.filename.clone(),
                metadata: record.to_metadata(),
            },
            embedding,
        };
        self.backend.upsert(&files_collection(name), &[row]).await
    }

    /// Up to `top_k` chunk texts from `collection`, most similar first.
    pub async fn query(
        &self,
        collection: &str,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<String>, StoreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let vectors = self.embed(&[text.to_string()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Embedding("empty embedding response".to_string()))?;

        let hits = self.backend.query(collection, &vector, top_k).await?;
        Ok(hits.into_iter().map(|h| h.record.document).collect())
    }

    pub async fn delete(&self, collection: &str, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.backend.delete(collection, ids).await
    }

    /// Remove every chunk of `filename` from `collection`.
    ///
    /// A chunk matches when its id starts with `<filename>_` and, if it
    /// carries a `source`, that source equals `filename`. Returns the ids
    /// that were removed.
    pub async fn delete_by_prefix(
        &self,
        collection: &str,
        filename: &str,
    ) -> Result<Vec<String>, StoreError> {
        let ids: Vec<String> = self
            .backend
            .records(collection)
            .await?
            .into_iter()
            .filter(|r| is_chunk_of(&r.id, filename))
            .filter(|r| {
                r.metadata
                    .get("source")
                    .and_then(|s| s.as_str())
                    .map_or(true, |s| s == filename)
            })
            .map(|r| r.id)
            .collect();

        self.delete(collection, &ids).await?;
        Ok(ids)
    }

    pub async fn drop_collection(&self, name: &str) -> Result<(), StoreError> {
        self.backend.delete_collection(name).await
    }

    /// Records of `collection`, or [`StoreError::CollectionNotFound`].
    pub async fn list_records(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.backend.records(collection).await
    }

    /// File listing of the knowledge base `name`; empty when no file has
    /// ever been indexed.
    pub async fn list_files(&self, name: &str) -> Result<Vec<FileEntry>, StoreError> {
        match self.backend.records(&files_collection(name)).await {
            Ok(records) => Ok(records
                .iter()
                .map(|r| FileEntry::from_metadata(&r.id, &r.metadata))
                .collect()),
            Err(StoreError::CollectionNotFound(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// Primary collections only; shadow file collections are hidden.
    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        Ok(self
            .backend
            .list_collections()
            .await?
            .into_iter()
            .filter(|c| !is_files_collection(&c.name))
            .collect())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        embed_batched(self.embedder.as_ref(), texts, self.batch_size)
            .await
            .map_err(|e| StoreError::Embedding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_document;
    use crate::store::memory::InMemoryBackend;
    use anyhow::Result;
    use async_trait::async_trait;

    /// Embeds each text as letter frequencies over a fixed alphabet.
    struct LetterEmbedder {
        dims: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; self.dims];
                    for b in t.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                        v[(b - b'a') as usize % self.dims] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn store_with(backend: Arc<InMemoryBackend>, dims: usize) -> CollectionStore {
        CollectionStore::new(backend, Arc::new(LetterEmbedder { dims }))
    }

    fn record(filename: &str) -> FileRecord {
        FileRecord {
            filename: filename.to_string(),
            path: format!("uploads/kb/{}", filename),
            size_bytes: 10,
            uploaded_at: "2024-01-01T00:00:00+00:00".to_string(),
            sha256: String::new(),
        }
    }

    #[tokio::test]
    async fn test_rebuild_on_dimension_change_is_reported() {
        let backend = Arc::new(InMemoryBackend::new());
        let old = store_with(backend.clone(), 8);
        old.get_or_create("kb").await.unwrap();
        old.add("kb", &chunk_document("a.txt", "1", "hello world", 1000))
            .await
            .unwrap();

        let new = store_with(backend.clone(), 16);
        let handle = new.get_or_create("kb").await.unwrap();
        assert!(handle.rebuilt);
        assert_eq!(handle.info.dims, 16);
        assert_eq!(handle.info.count, 0);

        let again = new.get_or_create("kb").await.unwrap();
        assert!(!again.rebuilt);
    }

    #[tokio::test]
    async fn test_knowledge_base_rebuilds_both_collections() {
        let backend = Arc::new(InMemoryBackend::new());
        let old = store_with(backend.clone(), 8);
        old.open_knowledge_base("kb").await.unwrap();
        old.add("kb", &chunk_document("a.txt", "1", "hello world", 1000))
            .await
            .unwrap();
        old.put_file_record("kb", &record("a.txt")).await.unwrap();

        let new = store_with(backend.clone(), 16);
        let handle = new.open_knowledge_base("kb").await.unwrap();
        assert_eq!(handle.rebuilt, vec!["kb".to_string(), "kb__files".to_string()]);
        assert_eq!(handle.primary.dims, 16);
        assert_eq!(handle.files.dims, 16);
        assert!(new.list_files("kb").await.unwrap().is_empty());
        assert!(new.list_records("kb").await.unwrap().is_empty());

        let again = new.open_knowledge_base("kb").await.unwrap();
        assert!(again.rebuilt.is_empty());
    }

    #[tokio::test]
    async fn test_stale_shadow_alone_rebuilds_the_pair() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.get_or_create_collection("kb", 4).await.unwrap();
        backend.get_or_create_collection("kb__files", 9).await.unwrap();
        let store = store_with(backend, 4);
        store.add("kb", &chunk_document("a.txt", "1", "abc", 1000)).await.unwrap();

        let handle = store.open_knowledge_base("kb").await.unwrap();
        assert_eq!(handle.rebuilt, vec!["kb".to_string(), "kb__files".to_string()]);
        assert_eq!(handle.primary.count, 0);
    }

    #[tokio::test]
    async fn test_open_knowledge_base_rejects_shadow_names() {
        let store = store_with(Arc::new(InMemoryBackend::new()), 4);
        assert!(matches!(
            store.open_knowledge_base("foo__files").await,
            Err(StoreError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_query_returns_most_similar_texts() {
        let store = store_with(Arc::new(InMemoryBackend::new()), 26);
        store.get_or_create("kb").await.unwrap();
        let mut chunks = chunk_document("a.txt", "1", "zzzz", 1000);
        chunks.extend(chunk_document("b.txt", "1", "abcabc", 1000));
        store.add("kb", &chunks).await.unwrap();

        let texts = store.query("kb", "cab", 1).await.unwrap();
        assert_eq!(texts, vec!["abcabc".to_string()]);
        assert!(store.query("kb", "cab", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_prefix_leaves_similar_filenames() {
        let store = store_with(Arc::new(InMemoryBackend::new()), 4);
        store.get_or_create("kb").await.unwrap();
        let text = "x".repeat(25);
        let mut chunks = chunk_document("a.pdf", "1", &text, 10);
        chunks.extend(chunk_document("a.pdf_old.pdf", "2", &text, 10));
        chunks.extend(chunk_document("b.pdf", "3", &text, 10));
        store.add("kb", &chunks).await.unwrap();

        let removed = store.delete_by_prefix("kb", "a.pdf").await.unwrap();
        assert_eq!(removed.len(), 3);
        assert!(removed.iter().all(|id| id.starts_with("a.pdf_1_")));

        let left = store.list_records("kb").await.unwrap();
        assert_eq!(left.len(), 6);
    }

    #[tokio::test]
    async fn test_file_records_overwrite_by_filename() {
        let store = store_with(Arc::new(InMemoryBackend::new()), 4);
        store.get_or_create("kb").await.unwrap();
        store.get_or_create(&files_collection("kb")).await.unwrap();

        let mut record = FileRecord {
            filename: "a.pdf".to_string(),
            path: "uploads/kb/a.pdf".to_string(),
            size_bytes: 10,
            uploaded_at: "2024-01-01T00:00:00+00:00".to_string(),
            sha256: String::new(),
        };
        store.put_file_record("kb", &record).await.unwrap();
        record.size_bytes = 20;
        store.put_file_record("kb", &record).await.unwrap();

        let files = store.list_files("kb").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, Some(20));
    }

    #[tokio::test]
    async fn test_list_files_of_unknown_kb_is_empty() {
        let store = store_with(Arc::new(InMemoryBackend::new()), 4);
        assert!(store.list_files("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_collections_hides_shadow_collections() {
        let store = store_with(Arc::new(InMemoryBackend::new()), 4);
        store.get_or_create("kb").await.unwrap();
        store.get_or_create(&files_collection("kb")).await.unwrap();
        let names: Vec<String> = store
            .list_collections()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["kb".to_string()]);
    }
}
