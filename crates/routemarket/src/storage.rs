// Object storage for uploaded GPX files and thumbnails.
//
// Objects are keyed `{folder}/{uuid}-{file_name}`; `put` returns the public URL.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use routemarket_core::error::{ErrorCode, MarketError};

/// Top-level folders uploads are sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFolder {
    Gpx,
    Images,
}

impl StorageFolder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gpx => "gpx",
            Self::Images => "images",
        }
    }
}

/// Build a collision-free object key. Path separators in the file name are replaced.
pub fn object_key(folder: StorageFolder, file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}/{}-{}", folder.as_str(), uuid::Uuid::new_v4(), safe)
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + std::fmt::Debug {
    /// Store `bytes` and return the URL they are served from.
    async fn put(
        &self,
        folder: StorageFolder,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, MarketError>;
}

fn storage_failed(message: impl Into<String>) -> MarketError {
    MarketError::provider(ErrorCode::StorageFailed, message)
}

/// Writes objects under a local directory served at `public_url`.
#[derive(Debug, Clone)]
pub struct FsObjectStorage {
    root: PathBuf,
    public_url: String,
}

impl FsObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn put(
        &self,
        folder: StorageFolder,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, MarketError> {
        let key = object_key(folder, file_name);
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_failed(format!("create {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| storage_failed(format!("write {}: {e}", path.display())))?;

        tracing::debug!(%key, content_type, size = bytes.len(), "stored upload");
        Ok(format!("{}/{}", self.public_url, key))
    }
}

/// A stored object held by [`MemoryObjectStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// In-process storage, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStorage {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    base_url: String,
}

impl MemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: Arc::default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(
        &self,
        folder: StorageFolder,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, MarketError> {
        let key = object_key(folder, file_name);
        self.objects
            .lock()
            .map_err(|_| storage_failed("memory storage poisoned"))?
            .insert(
                key.clone(),
                StoredObject {
                    content_type: content_type.to_string(),
                    bytes,
                },
            );
        Ok(format!("{}/{}", self.base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_layout() {
        let key = object_key(StorageFolder::Gpx, "loop.gpx");
        assert!(key.starts_with("gpx/"));
        assert!(key.ends_with("-loop.gpx"));
        // "gpx/" + 36-char uuid + "-" + name
        assert_eq!(key.len(), 4 + 36 + 1 + "loop.gpx".len());
        assert_ne!(key, object_key(StorageFolder::Gpx, "loop.gpx"));
        assert!(!object_key(StorageFolder::Images, "../x.png").contains("../"));
    }

    #[tokio::test]
    async fn test_memory_storage_put() {
        let storage = MemoryObjectStorage::new("https://cdn.example.com/");
        let url = storage
            .put(StorageFolder::Images, "thumb.png", "image/png", vec![1, 2, 3])
            .await
            .unwrap();
        assert!(url.starts_with("https://cdn.example.com/images/"));

        let keys = storage.keys();
        assert_eq!(keys.len(), 1);
        let object = storage.get(&keys[0]).unwrap();
        assert_eq!(object.content_type, "image/png");
        assert_eq!(object.bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fs_storage_writes_file() {
        let dir = std::env::temp_dir().join(format!("routemarket-test-{}", uuid::Uuid::new_v4()));
        let storage = FsObjectStorage::new(&dir, "http://localhost:3000/uploads");
        let url = storage
            .put(StorageFolder::Gpx, "ride.gpx", "application/gpx+xml", b"<gpx/>".to_vec())
            .await
            .unwrap();

        let key = url.trim_start_matches("http://localhost:3000/uploads/");
        let written = tokio::fs::read(dir.join(key)).await.unwrap();
        assert_eq!(written, b"<gpx/>");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
