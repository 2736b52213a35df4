use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::ObjectStorage;
use crate::assets::path::public_url;
use crate::error::{StorageError, StorageResult};

/// Stores objects at `<base_dir>/<bucket>/<key>`.
#[derive(Clone, Debug)]
pub struct LocalObjectStorage {
    base_dir: PathBuf,
    base_url: String,
}

impl LocalObjectStorage {
    pub fn new(base_dir: PathBuf, base_url: String) -> Self {
        Self { base_dir, base_url }
    }

    pub fn resolve_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        let normalized = key.trim_start_matches('/');
        if normalized.is_empty()
            || normalized.split('/').any(|segment| segment == ".." || segment == ".")
            || normalized.contains('\\')
            || bucket.is_empty()
            || bucket.contains('/')
            || bucket.contains("..")
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(bucket).join(Path::new(normalized)))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = self.resolve_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        debug!(bucket, key, content_type, size = data.len(), "writing object");
        fs::write(path, data).await?;
        Ok(())
    }

    async fn remove(&self, bucket: &str, keys: &[String]) -> StorageResult<()> {
        for key in keys {
            let path = self.resolve_path(bucket, key)?;
            match fs::remove_file(&path).await {
                Ok(()) => debug!(bucket, key = %key, "removed object"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>> {
        let bucket_root = self.base_dir.join(bucket);
        let mut pending = vec![bucket_root.clone()];
        let mut keys = Vec::new();
        while let Some(dir_path) = pending.pop() {
            let mut dir = match fs::read_dir(&dir_path).await {
                Ok(dir) => dir,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = dir.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .filter_map(|component| component.as_os_str().to_str())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        public_url(&self.base_url, bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn upload_overwrites_and_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let storage =
            LocalObjectStorage::new(temp_dir.path().to_path_buf(), "http://localhost:3000".into());

        storage
            .upload("avatars", "u1/main.jpg", b"one".to_vec(), "image/jpeg")
            .await
            .unwrap();
        storage
            .upload("avatars", "u1/main.jpg", b"two".to_vec(), "image/jpeg")
            .await
            .unwrap();
        let stored = storage.resolve_path("avatars", "u1/main.jpg").unwrap();
        assert_eq!(fs::read(&stored).await.unwrap(), b"two");

        let keys = vec!["u1/main.jpg".to_string(), "u1/missing.jpg".to_string()];
        storage.remove("avatars", &keys).await.unwrap();
        assert!(!stored.exists());
    }

    #[tokio::test]
    async fn list_is_scoped_by_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let storage =
            LocalObjectStorage::new(temp_dir.path().to_path_buf(), "http://localhost:3000".into());
        for key in ["abc/main.jpg", "abc/1_0.jpg", "abd/main.jpg"] {
            storage
                .upload("listing-images", key, b"x".to_vec(), "image/jpeg")
                .await
                .unwrap();
        }
        assert_eq!(
            storage.list("listing-images", "abc/").await.unwrap(),
            vec!["abc/1_0.jpg".to_string(), "abc/main.jpg".to_string()]
        );
        assert!(storage.list("empty-bucket", "abc/").await.unwrap().is_empty());
    }

    #[test]
    fn rejects_traversal() {
        let storage = LocalObjectStorage::new(PathBuf::from("/tmp/x"), "localhost:3000".into());
        assert!(storage.resolve_path("b", "../etc/passwd").is_err());
        assert!(storage.resolve_path("../b", "a.jpg").is_err());
        assert!(storage.resolve_path("b", "").is_err());
        assert_eq!(
            storage.public_url("b", "a/main.jpg"),
            "http://localhost:3000/storage/v1/object/public/b/a/main.jpg"
        );
    }
}
