//! Local file storage for uploaded documents.
//!
//! Layout: `<uploads_dir>/<collection>/<filename>`. Collection names are
//! validated by the caller; filenames go through [`sanitize_filename`]
//! so neither can escape the root.

use std::io;
use std::path::{Path, PathBuf};

/// Reduce an uploaded filename to a single safe path component.
///
/// Client-supplied names may carry directories (`C:\docs\a.pdf`,
/// `../../a.pdf`); only the final component is kept. Returns `None` when
/// nothing usable remains.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." || name.chars().any(char::is_control) {
        return None;
    }
    Some(name.to_string())
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    pub fn file_path(&self, collection: &str, filename: &str) -> PathBuf {
        self.collection_dir(collection).join(filename)
    }

    /// Write `bytes`, replacing any earlier upload with the same name.
    pub async fn save(&self, collection: &str, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let dir = self.collection_dir(collection);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Bytes of a stored upload; `Ok(None)` if it does not exist.
    pub async fn read(&self, collection: &str, filename: &str) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.file_path(collection, filename)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove a stored upload. Returns whether a file was removed.
    pub async fn delete(&self, collection: &str, filename: &str) -> io::Result<bool> {
        match tokio::fs::remove_file(self.file_path(collection, filename)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove a collection's upload directory and everything in it.
    pub async fn remove_collection(&self, collection: &str) -> io::Result<()> {
        remove_dir_if_exists(&self.collection_dir(collection)).await
    }

    /// Delete every upload and recreate the empty root.
    pub async fn clear(&self) -> io::Result<()> {
        remove_dir_if_exists(&self.root).await?;
        tokio::fs::create_dir_all(&self.root).await
    }
}

async fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
