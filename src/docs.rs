//! Document store seam — durable storage for uploaded files.
//!
//! Uploads land under per-account prefixes (`documents/{uid}/...`) and come
//! back as durable fetch URLs, which is all the rest of the system ever
//! stores. The filesystem implementation is what local runs and tests use.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::UploadError;
use crate::model::DocumentKind;

/// Storage path for an applicant's document upload.
///
/// The filename is prefixed with the slot key so re-uploads of differently
/// named files still land in a predictable place.
pub fn document_path(uid: &str, kind: DocumentKind, filename: &str) -> String {
    format!("documents/{uid}/{}-{filename}", kind.key())
}

/// Async blob-storage interface.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `content` at `path` and return its durable fetch URL.
    /// Overwrites any previous object at the same path.
    async fn upload(&self, path: &str, content: &[u8]) -> Result<String, UploadError>;
}

/// Filesystem-backed document store.
pub struct FsDocumentStore {
    root: PathBuf,
    /// URL prefix the stored path is appended to.
    base_url: String,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            root: root.into(),
            base_url,
        }
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn upload(&self, path: &str, content: &[u8]) -> Result<String, UploadError> {
        // Reject traversal outside the root
        if Path::new(path)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::RootDir))
        {
            return Err(UploadError::Unauthorized {
                path: path.to_string(),
            });
        }

        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;

        debug!(path, bytes = content.len(), "Document stored");
        Ok(format!("{}/{path}", self.base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_per_account_and_slot() {
        assert_eq!(
            document_path("uid-1", DocumentKind::DrivingLicence, "scan.pdf"),
            "documents/uid-1/driving_licence-scan.pdf"
        );
    }

    #[tokio::test]
    async fn upload_writes_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path(), "https://files.example/");

        let url = store
            .upload("documents/uid-1/badge-scan.pdf", b"pdf bytes")
            .await
            .unwrap();
        assert_eq!(url, "https://files.example/documents/uid-1/badge-scan.pdf");

        let stored = tokio::fs::read(dir.path().join("documents/uid-1/badge-scan.pdf"))
            .await
            .unwrap();
        assert_eq!(stored, b"pdf bytes");
    }

    #[tokio::test]
    async fn upload_overwrites_previous_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path(), "https://files.example");

        store.upload("documents/uid-1/badge-a.pdf", b"v1").await.unwrap();
        store.upload("documents/uid-1/badge-a.pdf", b"v2").await.unwrap();

        let stored = tokio::fs::read(dir.path().join("documents/uid-1/badge-a.pdf"))
            .await
            .unwrap();
        assert_eq!(stored, b"v2");
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path(), "https://files.example");

        let err = store.upload("../outside.pdf", b"x").await.unwrap_err();
        assert!(matches!(err, UploadError::Unauthorized { .. }));
    }
}
