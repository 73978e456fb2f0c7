//! Knowledge-base service: uploads, listings, and deletion.
//!
//! A knowledge base `name` spans three stores that must move together:
//! the primary chunk collection `name`, the shadow file collection
//! `name__files`, and the upload directory `<uploads_dir>/name`. There is
//! no transaction across them, so write operations on one knowledge base
//! are serialised by a per-collection async mutex inside this process, and
//! a full reset excludes every other writer. Retrieval does not take these
//! locks.
//!
//! Ingestion lives in [`crate::ingest`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{OwnedMutexGuard, RwLock, RwLockReadGuard};
use tracing::{info, warn};

use workflow_rag_core::chunk::IngestionClock;
use workflow_rag_core::error::StoreError;
use workflow_rag_core::models::{files_collection, validate_collection_name, CollectionInfo, FileEntry};
use workflow_rag_core::CollectionStore;

use crate::error::KnowledgeError;
use crate::retry::RetryPolicy;
use crate::storage::{sanitize_filename, FileStorage};

/// Result of deleting one file from a knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedFile {
    pub collection_name: String,
    pub filename: String,
    pub removed_chunks: usize,
}

/// Held by a writer for the duration of one operation.
pub(crate) struct WriteGuard<'a> {
    _gate: RwLockReadGuard<'a, ()>,
    _collection: OwnedMutexGuard<()>,
}

pub struct KnowledgeBase {
    pub(crate) collections: Arc<CollectionStore>,
    pub(crate) storage: FileStorage,
    pub(crate) chunk_size: usize,
    pub(crate) clock: IngestionClock,
    reset_policy: RetryPolicy,
    reset_gate: RwLock<()>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KnowledgeBase {
    pub fn new(
        collections: Arc<CollectionStore>,
        storage: FileStorage,
        chunk_size: usize,
        reset_policy: RetryPolicy,
    ) -> Self {
        Self {
            collections,
            storage,
            chunk_size: chunk_size.max(1),
            clock: IngestionClock::new(),
            reset_policy,
            reset_gate: RwLock::new(()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn collections(&self) -> &Arc<CollectionStore> {
        &self.collections
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub(crate) async fn lock_collection(&self, name: &str) -> WriteGuard<'_> {
        let gate = self.reset_gate.read().await;
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            // Clones are only taken under this lock, so a count of one means idle.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks.entry(name.to_string()).or_default().clone()
        };
        WriteGuard {
            _gate: gate,
            _collection: mutex.lock_owned().await,
        }
    }

    /// Files indexed into `name`. Unknown knowledge bases list as empty.
    pub async fn list_files(&self, name: &str) -> Result<Vec<FileEntry>, KnowledgeError> {
        check_name(name)?;
        Ok(self.collections.list_files(name).await?)
    }

    /// Bytes of a stored upload.
    pub async fn download(&self, name: &str, file_id: &str) -> Result<Vec<u8>, KnowledgeError> {
        check_name(name)?;
        let filename = check_file_id(file_id)?;
        self.storage
            .read(name, &filename)
            .await?
            .ok_or_else(|| KnowledgeError::not_found(format!("file '{}' not found in '{}'", filename, name)))
    }

    /// Remove one file: its upload, its file record, and its chunks.
    ///
    /// Chunks of other files survive even when their filename starts with
    /// this one. A missing upload or file record is not an error.
    pub async fn delete_file(&self, name: &str, file_id: &str) -> Result<DeletedFile, KnowledgeError> {
        check_name(name)?;
        let filename = check_file_id(file_id)?;
        let _guard = self.lock_collection(name).await;

        if self.collections.backend().get_collection(name).await?.is_none() {
            return Err(KnowledgeError::not_found(format!("collection '{}' not found", name)));
        }

        if !self.storage.delete(name, &filename).await? {
            info!(collection = name, filename = %filename, "Upload already absent from disk");
        }

        if let Err(err) = self
            .collections
            .delete(&files_collection(name), std::slice::from_ref(&filename))
            .await
        {
            warn!(collection = name, filename = %filename, error = %err, "Could not remove file record");
        }

        let removed = self.collections.delete_by_prefix(name, &filename).await?;
        info!(collection = name, filename = %filename, chunks = removed.len(), "Deleted file");

        Ok(DeletedFile {
            collection_name: name.to_string(),
            filename,
            removed_chunks: removed.len(),
        })
    }

    /// Drop both collections of `name` and its upload directory.
    pub async fn delete_collection(&self, name: &str) -> Result<(), KnowledgeError> {
        check_name(name)?;
        let _guard = self.lock_collection(name).await;

        match self.collections.drop_collection(name).await {
            Ok(()) => {}
            Err(StoreError::CollectionNotFound(_)) => {
                return Err(KnowledgeError::not_found(format!("collection '{}' not found", name)));
            }
            Err(err) => return Err(err.into()),
        }

        if let Err(err) = self.collections.drop_collection(&files_collection(name)).await {
            warn!(collection = name, error = %err, "Could not drop file collection");
        }

        self.storage.remove_collection(name).await?;
        info!(collection = name, "Deleted collection");
        Ok(())
    }

    /// Primary collections with their chunk counts.
    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>, KnowledgeError> {
        Ok(self.collections.list_collections().await?)
    }

    /// Wipe the vector store and every upload.
    ///
    /// Each step runs under the configured retry policy; the last failure is
    /// returned.
    pub async fn reset_all(&self) -> Result<(), KnowledgeError> {
        let _gate = self.reset_gate.write().await;
        let backend = self.collections.backend();

        self.reset_policy
            .run("reset vector store", || backend.reset())
            .await?;
        self.reset_policy
            .run("clear upload directory", || self.storage.clear())
            .await?;

        self.locks.lock().unwrap_or_else(|p| p.into_inner()).clear();
        info!("Reset all knowledge bases");
        Ok(())
    }
}

pub(crate) fn check_name(name: &str) -> Result<(), KnowledgeError> {
    validate_collection_name(name)
        .map_err(|_| KnowledgeError::malformed(format!("invalid collection name '{}'", name)))
}

/// File ids are the stored filenames; anything that is not already a
/// single safe component is rejected.
fn check_file_id(file_id: &str) -> Result<String, KnowledgeError> {
    match sanitize_filename(file_id) {
        Some(name) if name == file_id => Ok(name),
        _ => Err(KnowledgeError::malformed(format!("invalid file id '{}'", file_id))),
    }
}
