//! SQLite-backed [`VectorBackend`].
//!
//! Collections and records live in the `collections` and `records` tables
//! (see [`crate::migrate`]). Embeddings are stored as little-endian `f32`
//! blobs. Similarity search loads every vector of the collection and ranks
//! by cosine similarity in Rust, which is fast enough for the
//! thousands-of-chunks scale a knowledge base reaches.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use workflow_rag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use workflow_rag_core::error::StoreError;
use workflow_rag_core::models::CollectionInfo;
use workflow_rag_core::store::{EmbeddedRecord, QueryHit, Record, VectorBackend};

/// Persistent vector backend over a shared SQLite pool.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn stored_dims(&self, name: &str) -> Result<Option<usize>, StoreError> {
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(dims.map(|d| d as usize))
    }

    async fn require_dims(&self, name: &str) -> Result<usize, StoreError> {
        self.stored_dims(name)
            .await?
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    async fn count(&self, name: &str) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count as usize)
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn parse_metadata(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
}

#[async_trait]
impl VectorBackend for SqliteBackend {
    async fn get_or_create_collection(
        &self,
        name: &str,
        dims: usize,
    ) -> Result<CollectionInfo, StoreError> {
        sqlx::query("INSERT OR IGNORE INTO collections (name, dims, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(dims as i64)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        let stored = self.require_dims(name).await?;
        if stored != dims {
            return Err(StoreError::DimensionMismatch {
                collection: name.to_string(),
                stored,
                got: dims,
            });
        }

        Ok(CollectionInfo {
            name: name.to_string(),
            dims,
            count: self.count(name).await?,
        })
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError> {
        match self.stored_dims(name).await? {
            Some(dims) => Ok(Some(CollectionInfo {
                name: name.to_string(),
                dims,
                count: self.count(name).await?,
            })),
            None => Ok(None),
        }
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT c.name, c.dims, COUNT(r.id) AS count
            FROM collections c
            LEFT JOIN records r ON r.collection = c.name
            GROUP BY c.name, c.dims
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .iter()
            .map(|row| CollectionInfo {
                name: row.get("name"),
                dims: row.get::<i64, _>("dims") as usize,
                count: row.get::<i64, _>("count") as usize,
            })
            .collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        let removed = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(backend)?
            .rows_affected();
        if removed == 0 {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[EmbeddedRecord]) -> Result<(), StoreError> {
        let dims = self.require_dims(collection).await?;
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dims) {
            return Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                stored: dims,
                got: bad.embedding.len(),
            });
        }

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut seq: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM records WHERE collection = ?")
                .bind(collection)
                .fetch_one(&mut *tx)
                .await
                .map_err(backend)?;

        for rec in records {
            seq += 1;
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, document, metadata_json, embedding, seq)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(collection)
            .bind(&rec.record.id)
            .bind(&rec.record.document)
            .bind(rec.record.metadata.to_string())
            .bind(vec_to_blob(&rec.embedding))
            .bind(seq)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryHit>, StoreError> {
        let dims = self.require_dims(collection).await?;
        if vector.len() != dims {
            return Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                stored: dims,
                got: vector.len(),
            });
        }

        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM records WHERE collection = ? ORDER BY seq",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut hits: Vec<QueryHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let metadata: String = row.get("metadata_json");
                QueryHit {
                    record: Record {
                        id: row.get("id"),
                        document: row.get("document"),
                        metadata: parse_metadata(&metadata),
                    },
                    score: cosine_similarity(vector, &blob_to_vec(&blob)),
                }
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
        self.require_dims(collection).await?;
        let rows = sqlx::query(
            "SELECT id, document, metadata_json FROM records WHERE collection = ? ORDER BY seq",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .iter()
            .map(|row| {
                let metadata: String = row.get("metadata_json");
                Record {
                    id: row.get("id"),
                    document: row.get("document"),
                    metadata: parse_metadata(&metadata),
                }
            })
            .collect())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<(), StoreError> {
        self.require_dims(collection).await?;
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for id in ids {
            sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("DELETE FROM records")
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        sqlx::query("DELETE FROM collections")
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }
}
