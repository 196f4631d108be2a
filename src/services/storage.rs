use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::ImageFormat;
use uuid::Uuid;

/// Read-only resolution of a job's `source_ref` into image bytes.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, source_ref: &str) -> Result<Vec<u8>, StorageError>;
}

/// Screenshot storage on the local filesystem.
///
/// Uploaded images are written under a single directory; the returned
/// source ref is the bare file name, resolved back to bytes on demand.
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the storage directory if it does not exist yet.
    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(StorageError::Io)
    }

    /// Persist image bytes for a subject and return its source ref.
    pub async fn save(
        &self,
        subject_id: Uuid,
        data: &[u8],
        format: ImageFormat,
    ) -> Result<String, StorageError> {
        let source_ref = format!("{}.{}", subject_id, format.extensions_str()[0]);
        tokio::fs::write(self.path_for(&source_ref)?, data)
            .await
            .map_err(StorageError::Io)?;
        Ok(source_ref)
    }

    pub async fn delete(&self, source_ref: &str) -> Result<(), StorageError> {
        tokio::fs::remove_file(self.path_for(source_ref)?)
            .await
            .map_err(StorageError::Io)
    }

    /// Refs are bare file names; anything path-like is rejected so a ref
    /// can never escape the storage directory.
    fn path_for(&self, source_ref: &str) -> Result<PathBuf, StorageError> {
        if source_ref.is_empty()
            || Path::new(source_ref)
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)))
            || source_ref.contains(['/', '\\'])
        {
            return Err(StorageError::InvalidRef(source_ref.to_string()));
        }
        Ok(self.root.join(source_ref))
    }
}

#[async_trait]
impl SourceResolver for LocalImageStore {
    async fn resolve(&self, source_ref: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(source_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(source_ref.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("invalid source reference: {0}")]
    InvalidRef(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_save_and_resolve_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = LocalImageStore::new(dir.path());
        assert_ok!(store.init().await);

        let subject = Uuid::new_v4();
        let source_ref = store
            .save(subject, b"png bytes", ImageFormat::Png)
            .await
            .unwrap();
        assert!(source_ref.ends_with(".png"));

        let bytes = store.resolve(&source_ref).await.unwrap();
        assert_eq!(bytes, b"png bytes");
    }

    #[tokio::test]
    async fn test_resolve_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LocalImageStore::new(dir.path());

        let result = store.resolve("nope.png").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_path_like_refs_rejected() {
        let dir = TempDir::new().unwrap();
        let store = LocalImageStore::new(dir.path());

        for bad in ["../etc/passwd", "a/b.png", "", ".."] {
            let result = store.resolve(bad).await;
            assert!(
                matches!(result, Err(StorageError::InvalidRef(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let store = LocalImageStore::new(dir.path());
        store.init().await.unwrap();

        let source_ref = store
            .save(Uuid::new_v4(), b"data", ImageFormat::Jpeg)
            .await
            .unwrap();
        store.delete(&source_ref).await.unwrap();
        assert!(matches!(
            store.resolve(&source_ref).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
