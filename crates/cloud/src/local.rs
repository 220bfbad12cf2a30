//! Filesystem-backed blob store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use lookbook_core::storage::{BlobStore, StorageError};

/// Stores each blob as a file under `root`, using the key as a relative path.
pub struct LocalBlobStore {
    root: PathBuf,
    namespace: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let namespace = root.display().to_string();
        Self { root, namespace }
    }

    /// Map a key onto a path below `root`. Only plain relative segments are
    /// accepted, so a key can never escape the root directory.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let invalid = |reason: &str| StorageError::InvalidKey {
            key: key.to_owned(),
            reason: reason.to_owned(),
        };
        if key.is_empty() {
            return Err(invalid("key is empty"));
        }
        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid("key must be a relative path without '..'"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_owned())
            } else {
                StorageError::Backend(format!("read {}: {e}", path.display()))
            }
        })
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Backend(format!("mkdir {}: {e}", parent.display())))?;
        }

        // Write then rename so readers never observe a half-written file.
        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);
        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(|e| StorageError::Backend(format!("write {}: {e}", staging.display())))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| StorageError::Backend(format!("rename {}: {e}", path.display())))?;

        tracing::debug!(key, content_type, size = bytes.len(), "Stored blob on disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn put_creates_directories_and_get_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        store
            .put("output/shirt/1.jpg", b"jpeg".to_vec(), "image/jpeg")
            .await
            .unwrap();

        assert!(dir.path().join("output/shirt/1.jpg").exists());
        assert!(!dir.path().join("output/shirt/1.jpg.partial").exists());
        assert_eq!(store.get("output/shirt/1.jpg").await.unwrap(), b"jpeg");
    }

    #[test]
    fn namespace_is_the_root_directory() {
        let store = LocalBlobStore::new("/var/lib/lookbook");
        assert_eq!(store.namespace(), "/var/lib/lookbook");
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        store.put("a.png", vec![1], "image/png").await.unwrap();
        store.put("a.png", vec![2, 2], "image/png").await.unwrap();
        assert_eq!(store.get("a.png").await.unwrap(), vec![2, 2]);
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert_matches!(
            store.get("nope.png").await,
            Err(StorageError::NotFound(k)) if k == "nope.png"
        );
    }

    #[tokio::test]
    async fn keys_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert_matches!(
            store.get("../etc/passwd").await,
            Err(StorageError::InvalidKey { .. })
        );
        assert_matches!(
            store.put("/abs.png", vec![], "image/png").await,
            Err(StorageError::InvalidKey { .. })
        );
        assert_matches!(store.get("").await, Err(StorageError::InvalidKey { .. }));
    }
}
