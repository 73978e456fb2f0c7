//! Document ingestion into a knowledge base.
//!
//! Each uploaded file is saved to disk, its text extracted and split into
//! fixed-size chunks, the chunks embedded into the primary collection, and
//! a file record written to the shadow collection. Files are processed
//! one at a time; a file that cannot be read is reported and the rest
//! continue.
//!
//! Re-uploading a filename overwrites the stored bytes and the file record
//! but leaves the chunks of the earlier upload in place. Their ids carry an
//! older stamp, so they still answer retrieval queries until the file or
//! the collection is deleted.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use workflow_rag_core::chunk::chunk_document;
use workflow_rag_core::models::FileRecord;

use crate::error::KnowledgeError;
use crate::extract::extract_text;
use crate::knowledge::{check_name, KnowledgeBase};
use crate::storage::sanitize_filename;

/// A file as received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Indexed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub filename: String,
    pub chunks: usize,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FileOutcome {
    fn indexed(filename: &str, chunks: usize) -> Self {
        Self {
            filename: filename.to_string(),
            chunks,
            status: FileStatus::Indexed,
            detail: None,
        }
    }

    fn skipped(filename: &str, detail: &str) -> Self {
        Self {
            filename: filename.to_string(),
            chunks: 0,
            status: FileStatus::Skipped,
            detail: Some(detail.to_string()),
        }
    }

    fn failed(filename: &str, detail: String) -> Self {
        Self {
            filename: filename.to_string(),
            chunks: 0,
            status: FileStatus::Failed,
            detail: Some(detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub message: String,
    pub collection_name: String,
    pub files: Vec<FileOutcome>,
    pub rebuilt_collections: Vec<String>,
}

impl IngestReport {
    pub fn indexed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Indexed)
            .count()
    }

    pub fn total_chunks(&self) -> usize {
        self.files.iter().map(|f| f.chunks).sum()
    }
}

impl KnowledgeBase {
    /// Ingest `files` into the knowledge base `collection`, creating it if
    /// needed.
    pub async fn ingest(
        &self,
        collection: &str,
        files: Vec<Upload>,
    ) -> Result<IngestReport, KnowledgeError> {
        check_name(collection)?;
        if files.is_empty() {
            return Err(KnowledgeError::malformed("no files provided"));
        }
        let _guard = self.lock_collection(collection).await;

        let rebuilt_collections = self.collections.open_knowledge_base(collection).await?.rebuilt;

        let mut outcomes = Vec::with_capacity(files.len());
        for upload in files {
            let outcome = self.ingest_one(collection, upload).await;
            match outcome.status {
                FileStatus::Indexed => {}
                FileStatus::Skipped | FileStatus::Failed => warn!(
                    collection,
                    filename = %outcome.filename,
                    status = ?outcome.status,
                    detail = outcome.detail.as_deref().unwrap_or_default(),
                    "File not indexed"
                ),
            }
            outcomes.push(outcome);
        }

        let mut report = IngestReport {
            message: String::new(),
            collection_name: collection.to_string(),
            files: outcomes,
            rebuilt_collections,
        };
        report.message = format!(
            "Indexed {} of {} file(s) into '{}'",
            report.indexed_count(),
            report.files.len(),
            collection
        );
        info!(
            collection,
            files = report.files.len(),
            indexed = report.indexed_count(),
            chunks = report.total_chunks(),
            "Ingestion finished"
        );
        Ok(report)
    }

    async fn ingest_one(&self, collection: &str, upload: Upload) -> FileOutcome {
        let Some(filename) = sanitize_filename(&upload.filename) else {
            return FileOutcome::failed(&upload.filename, "invalid filename".to_string());
        };

        let path = match self.storage.save(collection, &filename, &upload.bytes).await {
            Ok(path) => path,
            Err(err) => return FileOutcome::failed(&filename, format!("could not store file: {}", err)),
        };

        let size_bytes = upload.bytes.len() as u64;
        let sha256 = format!("{:x}", Sha256::digest(&upload.bytes));

        let name = filename.clone();
        let extracted =
            tokio::task::spawn_blocking(move || extract_text(&name, &upload.bytes)).await;
        let text = match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => return FileOutcome::failed(&filename, err.to_string()),
            Err(err) => return FileOutcome::failed(&filename, format!("extraction aborted: {}", err)),
        };
        if text.is_empty() {
            return FileOutcome::skipped(&filename, "no extractable text");
        }

        let (stamp, uploaded_at) = self.clock.next();
        let chunks = chunk_document(&filename, &stamp, &text, self.chunk_size);
        if let Err(err) = self.collections.add(collection, &chunks).await {
            return FileOutcome::failed(&filename, err.to_string());
        }

        let record = FileRecord {
            filename: filename.clone(),
            path: path.display().to_string(),
            size_bytes,
            uploaded_at: uploaded_at.to_rfc3339(),
            sha256,
        };
        if let Err(err) = self.collections.put_file_record(collection, &record).await {
            return FileOutcome::failed(&filename, err.to_string());
        }

        info!(collection, filename = %filename, chunks = chunks.len(), "Indexed file");
        FileOutcome::indexed(&filename, chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::storage::FileStorage;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use workflow_rag_core::embedding::EmbeddingProvider;
    use workflow_rag_core::store::memory::InMemoryBackend;
    use workflow_rag_core::CollectionStore;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| vec![1.0, t.chars().count() as f32])
                .collect())
        }
    }

    fn kb_in(tmp: &TempDir, chunk_size: usize) -> KnowledgeBase {
        let store = CollectionStore::new(Arc::new(InMemoryBackend::new()), Arc::new(LengthEmbedder));
        KnowledgeBase::new(
            Arc::new(store),
            FileStorage::new(tmp.path().join("uploads")),
            chunk_size,
            RetryPolicy::new(1, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn test_ingest_text_file_into_three_chunks() {
        let tmp = TempDir::new().unwrap();
        let kb = kb_in(&tmp, 1000);
        let text = "q".repeat(2500);

        let report = kb
            .ingest("kb", vec![Upload::new("notes.txt", text.clone())])
            .await
            .unwrap();

        assert_eq!(report.collection_name, "kb");
        assert_eq!(report.files, vec![FileOutcome::indexed("notes.txt", 3)]);
        assert!(report.rebuilt_collections.is_empty());

        let mut records = kb.collections.list_records("kb").await.unwrap();
        records.sort_by_key(|r| r.metadata["chunk"].as_u64());
        let lens: Vec<usize> = records.iter().map(|r| r.document.len()).collect();
        assert_eq!(lens, vec![1000, 1000, 500]);
        assert!(records.iter().all(|r| r.id.starts_with("notes.txt_")));

        let files = kb.list_files("kb").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, Some(2500));
        assert_eq!(
            kb.download("kb", "notes.txt").await.unwrap(),
            text.into_bytes()
        );
    }

    #[tokio::test]
    async fn test_reupload_orphans_earlier_chunks() {
        let tmp = TempDir::new().unwrap();
        let kb = kb_in(&tmp, 10);

        kb.ingest("kb", vec![Upload::new("a.txt", "x".repeat(20))])
            .await
            .unwrap();
        kb.ingest("kb", vec![Upload::new("a.txt", "y".repeat(10))])
            .await
            .unwrap();

        let records = kb.collections.list_records("kb").await.unwrap();
        assert_eq!(records.len(), 3);

        let files = kb.list_files("kb").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, Some(10));

        let deleted = kb.delete_file("kb", "a.txt").await.unwrap();
        assert_eq!(deleted.removed_chunks, 3);
    }

    #[tokio::test]
    async fn test_empty_and_unreadable_files_are_reported() {
        let tmp = TempDir::new().unwrap();
        let kb = kb_in(&tmp, 100);

        let report = kb
            .ingest(
                "kb",
                vec![
                    Upload::new("blank.txt", "   \n"),
                    Upload::new("broken.docx", b"not a zip archive".to_vec()),
                    Upload::new("../", "x"),
                    Upload::new("ok.md", "# title"),
                ],
            )
            .await
            .unwrap();

        let statuses: Vec<FileStatus> = report.files.iter().map(|f| f.status).collect();
        assert_eq!(
            statuses,
            vec![
                FileStatus::Skipped,
                FileStatus::Failed,
                FileStatus::Failed,
                FileStatus::Indexed
            ]
        );
        assert_eq!(report.indexed_count(), 1);

        let files = kb.list_files("kb").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "ok.md");
    }

    #[tokio::test]
    async fn test_ingest_requires_files_and_valid_name() {
        let tmp = TempDir::new().unwrap();
        let kb = kb_in(&tmp, 100);
        assert!(matches!(
            kb.ingest("kb", Vec::new()).await,
            Err(KnowledgeError::MalformedRequest(_))
        ));
        assert!(matches!(
            kb.ingest("bad name", vec![Upload::new("a.txt", "x")]).await,
            Err(KnowledgeError::MalformedRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_shadow_collection_names_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let kb = kb_in(&tmp, 100);
        kb.ingest("foo", vec![Upload::new("a.txt", "alpha")])
            .await
            .unwrap();

        assert!(matches!(
            kb.ingest("foo__files", vec![Upload::new("doc.txt", "beta")]).await,
            Err(KnowledgeError::MalformedRequest(_))
        ));

        let files = kb.list_files("foo").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename.as_deref(), Some("a.txt"));
        let names: Vec<String> = kb
            .list_collections()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["foo".to_string()]);
    }

    #[tokio::test]
    async fn test_ingest_rebuilds_stale_file_collection_with_primary() {
        let tmp = TempDir::new().unwrap();
        let kb = kb_in(&tmp, 100);
        kb.collections
            .backend()
            .get_or_create_collection("kb__files", 7)
            .await
            .unwrap();

        let report = kb
            .ingest("kb", vec![Upload::new("a.txt", "alpha")])
            .await
            .unwrap();
        assert_eq!(report.rebuilt_collections, vec!["kb__files".to_string()]);
        assert_eq!(report.indexed_count(), 1);
        assert_eq!(kb.list_files("kb").await.unwrap().len(), 1);
    }

    #[test]
    fn test_report_serializes_status_lowercase() {
        let outcome = FileOutcome::skipped("a.txt", "no extractable text");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "skipped");
        let indexed = serde_json::to_value(FileOutcome::indexed("b.txt", 2)).unwrap();
        assert!(indexed.get("detail").is_none());
    }
}
