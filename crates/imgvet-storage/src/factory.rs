use crate::{ArtifactStore, LocalArtifactStore, MemoryArtifactStore, StorageError, StorageResult};
use imgvet_core::{Config, StorageBackend};
use std::sync::Arc;

/// Create an artifact store based on configuration
pub async fn create_artifact_store(config: &Config) -> StorageResult<Arc<dyn ArtifactStore>> {
    match config.storage_backend {
        StorageBackend::Local => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let store = LocalArtifactStore::new(base_path).await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => Ok(Arc::new(MemoryArtifactStore::new())),
    }
}
