use crate::traits::{ArtifactStore, Namespace, StorageError, StorageResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Attributes stored next to each artifact as `{name}.attrs.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Attributes {
    content_type: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Local filesystem artifact store
#[derive(Clone)]
pub struct LocalArtifactStore {
    base_path: PathBuf,
}

impl LocalArtifactStore {
    /// Create a new LocalArtifactStore rooted at `base_path`. The namespace
    /// directories are created up front.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        for namespace in [Namespace::Incoming, Namespace::Quarantine, Namespace::Analysis] {
            let dir = base_path.join(namespace.as_str());
            fs::create_dir_all(&dir).await.map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to create storage directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(LocalArtifactStore { base_path })
    }

    /// Convert a namespace and name to a filesystem path, rejecting names
    /// that could escape the base directory.
    fn artifact_path(&self, namespace: Namespace, name: &str) -> StorageResult<PathBuf> {
        if name.is_empty()
            || name.contains("..")
            || name.contains('/')
            || name.contains('\\')
            || name.starts_with('.')
        {
            return Err(StorageError::InvalidKey(format!(
                "Artifact name '{}' contains invalid characters",
                name
            )));
        }
        Ok(self.base_path.join(namespace.as_str()).join(name))
    }

    fn attrs_path(path: &Path) -> PathBuf {
        let mut os = path.as_os_str().to_os_string();
        os.push(".attrs.json");
        PathBuf::from(os)
    }

    async fn write_file(path: &Path, data: &[u8]) -> StorageResult<()> {
        let mut file = fs::File::create(path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;
        file.write_all(data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    async fn read_attrs(&self, namespace: Namespace, name: &str) -> StorageResult<Attributes> {
        let path = Self::attrs_path(&self.artifact_path(namespace, name)?);
        let raw = fs::read(&path)
            .await
            .map_err(|_| StorageError::NotFound(namespace.key(name)))?;
        serde_json::from_slice(&raw).map_err(|e| {
            StorageError::DownloadFailed(format!(
                "Corrupt attributes for {}: {}",
                namespace.key(name),
                e
            ))
        })
    }

    async fn write_attrs(
        &self,
        namespace: Namespace,
        name: &str,
        attrs: &Attributes,
    ) -> StorageResult<()> {
        let path = Self::attrs_path(&self.artifact_path(namespace, name)?);
        let raw = serde_json::to_vec(attrs).map_err(|e| {
            StorageError::UploadFailed(format!("Failed to encode attributes: {}", e))
        })?;
        Self::write_file(&path, &raw).await
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(
        &self,
        namespace: Namespace,
        name: &str,
        content_type: &str,
        data: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> StorageResult<String> {
        let path = self.artifact_path(namespace, name)?;
        let size = data.len();
        let start = std::time::Instant::now();

        Self::write_file(&path, &data).await?;
        self.write_attrs(
            namespace,
            name,
            &Attributes {
                content_type: content_type.to_string(),
                metadata,
                tags: HashMap::new(),
            },
        )
        .await?;

        let key = namespace.key(name);
        tracing::debug!(
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local artifact store write"
        );
        Ok(key)
    }

    async fn get(&self, namespace: Namespace, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.artifact_path(namespace, name)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(namespace.key(name)));
        }

        fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })
    }

    async fn metadata(
        &self,
        namespace: Namespace,
        name: &str,
    ) -> StorageResult<HashMap<String, String>> {
        Ok(self.read_attrs(namespace, name).await?.metadata)
    }

    async fn delete(&self, namespace: Namespace, name: &str) -> StorageResult<()> {
        let path = self.artifact_path(namespace, name)?;

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete {}: {}",
                    path.display(),
                    e
                )))
            }
        }
        // Attributes sidecar goes with the artifact.
        let _ = fs::remove_file(Self::attrs_path(&path)).await;
        Ok(())
    }

    async fn copy(
        &self,
        from: Namespace,
        from_name: &str,
        to: Namespace,
        to_name: &str,
    ) -> StorageResult<String> {
        let data = self.get(from, from_name).await?;
        let attrs = self.read_attrs(from, from_name).await.unwrap_or_default();

        let to_path = self.artifact_path(to, to_name)?;
        Self::write_file(&to_path, &data).await?;
        self.write_attrs(to, to_name, &attrs).await?;
        Ok(to.key(to_name))
    }

    async fn exists(&self, namespace: Namespace, name: &str) -> StorageResult<bool> {
        let path = self.artifact_path(namespace, name)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn set_tags(
        &self,
        namespace: Namespace,
        name: &str,
        tags: HashMap<String, String>,
    ) -> StorageResult<()> {
        let mut attrs = self.read_attrs(namespace, name).await?;
        attrs.tags = tags;
        self.write_attrs(namespace, name, &attrs).await
    }

    async fn tags(
        &self,
        namespace: Namespace,
        name: &str,
    ) -> StorageResult<HashMap<String, String>> {
        Ok(self.read_attrs(namespace, name).await?.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, LocalArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_roundtrip_with_metadata() {
        let (_dir, store) = store().await;
        let mut metadata = HashMap::new();
        metadata.insert("origIp".to_string(), "10.0.0.1".to_string());

        let key = store
            .put(
                Namespace::Incoming,
                "a.png",
                "image/png",
                vec![1, 2, 3],
                metadata,
            )
            .await
            .unwrap();
        assert_eq!(key, "incoming/a.png");

        assert_eq!(store.get(Namespace::Incoming, "a.png").await.unwrap(), vec![1, 2, 3]);
        let meta = store.metadata(Namespace::Incoming, "a.png").await.unwrap();
        assert_eq!(meta.get("origIp").map(String::as_str), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let (_dir, store) = store().await;
        let err = store.get(Namespace::Incoming, "nope.png").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = store().await;
        store
            .put(Namespace::Incoming, "a.png", "image/png", vec![1], HashMap::new())
            .await
            .unwrap();

        store.delete(Namespace::Incoming, "a.png").await.unwrap();
        store.delete(Namespace::Incoming, "a.png").await.unwrap();
        assert!(!store.exists(Namespace::Incoming, "a.png").await.unwrap());
    }

    #[tokio::test]
    async fn copy_carries_metadata_and_tags() {
        let (_dir, store) = store().await;
        let mut metadata = HashMap::new();
        metadata.insert("k".to_string(), "v".to_string());
        store
            .put(Namespace::Incoming, "a.png", "image/png", vec![9], metadata)
            .await
            .unwrap();

        let key = store
            .copy(Namespace::Incoming, "a.png", Namespace::Quarantine, "a.png")
            .await
            .unwrap();
        assert_eq!(key, "quarantine/a.png");
        assert_eq!(store.get(Namespace::Quarantine, "a.png").await.unwrap(), vec![9]);
        assert_eq!(
            store
                .metadata(Namespace::Quarantine, "a.png")
                .await
                .unwrap()
                .get("k")
                .map(String::as_str),
            Some("v")
        );
    }

    #[tokio::test]
    async fn tags_replace_previous_set() {
        let (_dir, store) = store().await;
        store
            .put(Namespace::Quarantine, "a.png", "image/png", vec![1], HashMap::new())
            .await
            .unwrap();

        let mut tags = HashMap::new();
        tags.insert("reason".to_string(), "virus".to_string());
        store.set_tags(Namespace::Quarantine, "a.png", tags).await.unwrap();

        let read = store.tags(Namespace::Quarantine, "a.png").await.unwrap();
        assert_eq!(read.get("reason").map(String::as_str), Some("virus"));
    }

    #[tokio::test]
    async fn traversal_names_rejected() {
        let (_dir, store) = store().await;
        for name in ["../evil", "a/../b", "/abs", ".hidden", ""] {
            let err = store.get(Namespace::Incoming, name).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey(_)), "name: {}", name);
        }
    }
}
