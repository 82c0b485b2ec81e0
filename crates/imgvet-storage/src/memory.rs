use crate::traits::{ArtifactStore, Namespace, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Debug)]
struct StoredArtifact {
    content_type: String,
    data: Vec<u8>,
    metadata: HashMap<String, String>,
    tags: HashMap<String, String>,
}

/// In-memory artifact store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<String, StoredArtifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of every stored artifact across all namespaces, for assertions.
    pub fn keys(&self) -> Vec<String> {
        self.artifacts
            .lock()
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<String, StoredArtifact>>> {
        self.artifacts
            .lock()
            .map_err(|_| StorageError::InvalidKey("artifact store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(
        &self,
        namespace: Namespace,
        name: &str,
        content_type: &str,
        data: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> StorageResult<String> {
        let key = namespace.key(name);
        self.lock()?.insert(
            key.clone(),
            StoredArtifact {
                content_type: content_type.to_string(),
                data,
                metadata,
                tags: HashMap::new(),
            },
        );
        Ok(key)
    }

    async fn get(&self, namespace: Namespace, name: &str) -> StorageResult<Vec<u8>> {
        let key = namespace.key(name);
        self.lock()?
            .get(&key)
            .map(|a| a.data.clone())
            .ok_or(StorageError::NotFound(key))
    }

    async fn metadata(
        &self,
        namespace: Namespace,
        name: &str,
    ) -> StorageResult<HashMap<String, String>> {
        let key = namespace.key(name);
        self.lock()?
            .get(&key)
            .map(|a| a.metadata.clone())
            .ok_or(StorageError::NotFound(key))
    }

    async fn delete(&self, namespace: Namespace, name: &str) -> StorageResult<()> {
        self.lock()?.remove(&namespace.key(name));
        Ok(())
    }

    async fn copy(
        &self,
        from: Namespace,
        from_name: &str,
        to: Namespace,
        to_name: &str,
    ) -> StorageResult<String> {
        let mut artifacts = self.lock()?;
        let from_key = from.key(from_name);
        let artifact = artifacts
            .get(&from_key)
            .cloned()
            .ok_or(StorageError::NotFound(from_key))?;
        let to_key = to.key(to_name);
        artifacts.insert(to_key.clone(), artifact);
        Ok(to_key)
    }

    async fn exists(&self, namespace: Namespace, name: &str) -> StorageResult<bool> {
        Ok(self.lock()?.contains_key(&namespace.key(name)))
    }

    async fn set_tags(
        &self,
        namespace: Namespace,
        name: &str,
        tags: HashMap<String, String>,
    ) -> StorageResult<()> {
        let key = namespace.key(name);
        let mut artifacts = self.lock()?;
        let artifact = artifacts
            .get_mut(&key)
            .ok_or(StorageError::NotFound(key))?;
        artifact.tags = tags;
        Ok(())
    }

    async fn tags(
        &self,
        namespace: Namespace,
        name: &str,
    ) -> StorageResult<HashMap<String, String>> {
        let key = namespace.key(name);
        self.lock()?
            .get(&key)
            .map(|a| a.tags.clone())
            .ok_or(StorageError::NotFound(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = MemoryArtifactStore::new();
        store
            .put(Namespace::Incoming, "a.png", "image/png", vec![1], HashMap::new())
            .await
            .unwrap();

        assert!(store.exists(Namespace::Incoming, "a.png").await.unwrap());
        assert!(!store.exists(Namespace::Quarantine, "a.png").await.unwrap());
    }

    #[tokio::test]
    async fn copy_then_delete_moves_artifact() {
        let store = MemoryArtifactStore::new();
        store
            .put(Namespace::Incoming, "a.png", "image/png", vec![7], HashMap::new())
            .await
            .unwrap();

        store
            .copy(Namespace::Incoming, "a.png", Namespace::Quarantine, "a.png")
            .await
            .unwrap();
        store.delete(Namespace::Incoming, "a.png").await.unwrap();

        assert!(!store.exists(Namespace::Incoming, "a.png").await.unwrap());
        assert_eq!(store.get(Namespace::Quarantine, "a.png").await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn put_records_content_type() {
        let store = MemoryArtifactStore::new();
        store
            .put(Namespace::Incoming, "a.png", "image/png", vec![1], HashMap::new())
            .await
            .unwrap();

        let artifacts = store.artifacts.lock().unwrap();
        assert_eq!(artifacts["incoming/a.png"].content_type, "image/png");
    }

    #[tokio::test]
    async fn put_replaces_existing() {
        let store = MemoryArtifactStore::new();
        store
            .put(Namespace::Analysis, "a.json", "application/json", vec![1], HashMap::new())
            .await
            .unwrap();
        store
            .put(Namespace::Analysis, "a.json", "application/json", vec![2], HashMap::new())
            .await
            .unwrap();

        assert_eq!(store.get(Namespace::Analysis, "a.json").await.unwrap(), vec![2]);
    }
}
