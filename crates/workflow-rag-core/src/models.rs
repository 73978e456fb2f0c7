//! Core data models for knowledge-base collections.
//!
//! A logical knowledge base `name` owns two collections: the primary chunk
//! collection `name` and the shadow file-tracking collection
//! `name + "__files"`.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::StoreError;

/// Suffix of the shadow collection that tracks uploaded source files.
pub const FILES_SUFFIX: &str = "__files";

/// Longest accepted knowledge-base name.
const MAX_NAME_LEN: usize = 63;

/// Returns the shadow file-tracking collection name for a knowledge base.
pub fn files_collection(name: &str) -> String {
    format!("{}{}", name, FILES_SUFFIX)
}

/// True if `name` is a shadow file-tracking collection.
pub fn is_files_collection(name: &str) -> bool {
    name.ends_with(FILES_SUFFIX)
}

/// Checks that a knowledge-base name is safe to use as a collection key and
/// as a single directory component on disk.
///
/// Accepts 1–63 characters from `[A-Za-z0-9._-]`, excluding `.` and `..`.
/// Names ending in [`FILES_SUFFIX`] are reserved for shadow collections.
pub fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name != "."
        && name != ".."
        && !is_files_collection(name)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Metadata attached to every chunk in a primary collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Filename the chunk was extracted from.
    pub source: String,
    /// Zero-based position of the chunk within its file.
    pub chunk: usize,
}

/// A fixed-size slice of a document's extracted text.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Companion record describing an uploaded file, stored in the shadow
/// collection keyed by filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub path: String,
    pub size_bytes: u64,
    /// ISO-8601 upload timestamp.
    pub uploaded_at: String,
    /// Hex SHA-256 of the uploaded bytes.
    #[serde(default)]
    pub sha256: String,
}

impl FileRecord {
    pub fn to_metadata(&self) -> serde_json::Value {
        json!({
            "filename": self.filename,
            "path": self.path,
            "size_bytes": self.size_bytes,
            "uploaded_at": self.uploaded_at,
            "sha256": self.sha256,
        })
    }
}

/// One row of a knowledge base's file listing.
///
/// Fields are optional because records written by other tools may carry
/// partial metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub id: String,
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub uploaded_at: Option<String>,
}

impl FileEntry {
    pub fn from_metadata(id: &str, metadata: &serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            filename: metadata
                .get("filename")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            size: metadata.get("size_bytes").and_then(|v| v.as_u64()),
            uploaded_at: metadata
                .get("uploaded_at")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }
}

/// Summary of a stored collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    /// Vector width fixed when the collection was created.
    pub dims: usize,
    /// Number of records currently stored.
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_collection_name() {
        assert_eq!(files_collection("kb"), "kb__files");
        assert!(is_files_collection("kb__files"));
        assert!(!is_files_collection("kb"));
    }

    #[test]
    fn test_validate_collection_name() {
        assert!(validate_collection_name("default_kb").is_ok());
        assert!(validate_collection_name("docs-2024.v1").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("..").is_err());
        assert!(validate_collection_name("a/b").is_err());
        assert!(validate_collection_name("a b").is_err());
        assert!(validate_collection_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_shadow_names_are_reserved() {
        assert!(validate_collection_name("foo__files").is_err());
        assert!(validate_collection_name(&files_collection("kb")).is_err());
        assert!(validate_collection_name("__files").is_err());
        assert!(validate_collection_name("foo__files_v2").is_ok());
        assert!(validate_collection_name("foo_files").is_ok());
    }

    #[test]
    fn test_file_entry_from_partial_metadata() {
        let entry = FileEntry::from_metadata("a.pdf", &json!({ "filename": "a.pdf" }));
        assert_eq!(entry.filename.as_deref(), Some("a.pdf"));
        assert_eq!(entry.size, None);
        assert_eq!(entry.uploaded_at, None);
    }

    #[test]
    fn test_file_record_metadata_roundtrips_into_entry() {
        let record = FileRecord {
            filename: "report.pdf".to_string(),
            path: "uploads/kb/report.pdf".to_string(),
            size_bytes: 2048,
            uploaded_at: "2024-05-01T10:00:00+00:00".to_string(),
            sha256: "abc".to_string(),
        };
        let entry = FileEntry::from_metadata(&record.filename, &record.to_metadata());
        assert_eq!(entry.size, Some(2048));
        assert_eq!(entry.uploaded_at.as_deref(), Some("2024-05-01T10:00:00+00:00"));
    }
}
