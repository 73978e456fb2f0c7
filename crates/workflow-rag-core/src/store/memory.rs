//! In-memory [`VectorBackend`] for tests and embedding in other hosts.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Similarity
//! search is brute-force cosine over every vector in the collection.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::models::CollectionInfo;

use super::{EmbeddedRecord, QueryHit, Record, VectorBackend};

struct MemCollection {
    dims: usize,
    /// Insertion order is kept so ties in similarity rank stably.
    rows: Vec<EmbeddedRecord>,
}

impl MemCollection {
    fn info(&self, name: &str) -> CollectionInfo {
        CollectionInfo {
            name: name.to_string(),
            dims: self.dims,
            count: self.rows.len(),
        }
    }
}

/// In-memory vector backend.
#[derive(Default)]
pub struct InMemoryBackend {
    collections: RwLock<HashMap<String, MemCollection>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, MemCollection>>, StoreError> {
        self.collections
            .read()
            .map_err(|_| StoreError::Backend("collection map lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, MemCollection>>, StoreError> {
        self.collections
            .write()
            .map_err(|_| StoreError::Backend("collection map lock poisoned".to_string()))
    }
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    async fn get_or_create_collection(
        &self,
        name: &str,
        dims: usize,
    ) -> Result<CollectionInfo, StoreError> {
        let mut map = self.write()?;
        let col = map.entry(name.to_string()).or_insert_with(|| MemCollection {
            dims,
            rows: Vec::new(),
        });
        if col.dims != dims {
            return Err(StoreError::DimensionMismatch {
                collection: name.to_string(),
                stored: col.dims,
                got: dims,
            });
        }
        Ok(col.info(name))
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError> {
        Ok(self.read()?.get(name).map(|c| c.info(name)))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let map = self.read()?;
        let mut infos: Vec<CollectionInfo> = map.iter().map(|(n, c)| c.info(n)).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        match self.write()?.remove(name) {
            Some(_) => Ok(()),
            None => Err(StoreError::CollectionNotFound(name.to_string())),
        }
    }

    async fn upsert(&self, collection: &str, records: &[EmbeddedRecord]) -> Result<(), StoreError> {
        let mut map = self.write()?;
        let col = map
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        if let Some(bad) = records.iter().find(|r| r.embedding.len() != col.dims) {
            return Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                stored: col.dims,
                got: bad.embedding.len(),
            });
        }

        for rec in records {
            match col.rows.iter_mut().find(|r| r.record.id == rec.record.id) {
                Some(existing) => *existing = rec.clone(),
                None => col.rows.push(rec.clone()),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryHit>, StoreError> {
        let map = self.read()?;
        let col = map
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        if vector.len() != col.dims {
            return Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                stored: col.dims,
                got: vector.len(),
            });
        }

        let mut hits: Vec<QueryHit> = col
            .rows
            .iter()
            .map(|r| QueryHit {
                record: r.record.clone(),
                score: cosine_similarity(vector, &r.embedding),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn records(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let map = self.read()?;
        let col = map
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(col.rows.iter().map(|r| r.record.clone()).collect())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut map = self.write()?;
        let col = map
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        col.rows.retain(|r| !ids.contains(&r.record.id));
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.write()?.clear();
        Ok(())
    }
}
