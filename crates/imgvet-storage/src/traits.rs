//! Artifact store abstraction trait
//!
//! This module defines the ArtifactStore trait that all storage backends must
//! implement, along with the namespace layout shared by every backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid access token: {0}")]
    InvalidToken(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Lifecycle namespace an artifact lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    Incoming,
    Quarantine,
    Analysis,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Incoming => "incoming",
            Namespace::Quarantine => "quarantine",
            Namespace::Analysis => "analysis",
        }
    }

    /// Canonical `{namespace}/{name}` key for an artifact.
    pub fn key(&self, name: &str) -> String {
        format!("{}/{}", self.as_str(), name)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact store abstraction trait
///
/// All backends (local filesystem, in-memory) implement this trait so the
/// pipeline stages never couple to a concrete store. Writes within a
/// namespace are last-writer-wins; `copy` plus `delete` is how an artifact
/// moves between namespaces.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store an artifact, replacing any existing one under the same name.
    /// Returns the canonical `{namespace}/{name}` key.
    async fn put(
        &self,
        namespace: Namespace,
        name: &str,
        content_type: &str,
        data: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> StorageResult<String>;

    /// Fetch an artifact's bytes.
    async fn get(&self, namespace: Namespace, name: &str) -> StorageResult<Vec<u8>>;

    /// Fetch the metadata stored with an artifact.
    async fn metadata(&self, namespace: Namespace, name: &str)
        -> StorageResult<HashMap<String, String>>;

    /// Delete an artifact. Deleting a missing artifact is not an error, so
    /// a redelivered quarantine step can finish what a crashed worker began.
    async fn delete(&self, namespace: Namespace, name: &str) -> StorageResult<()>;

    /// Copy an artifact (bytes, metadata, and tags) to another namespace.
    /// Returns the destination key.
    async fn copy(
        &self,
        from: Namespace,
        from_name: &str,
        to: Namespace,
        to_name: &str,
    ) -> StorageResult<String>;

    /// Check whether an artifact exists.
    async fn exists(&self, namespace: Namespace, name: &str) -> StorageResult<bool>;

    /// Replace the tags on an existing artifact.
    async fn set_tags(
        &self,
        namespace: Namespace,
        name: &str,
        tags: HashMap<String, String>,
    ) -> StorageResult<()>;

    /// Fetch the tags on an artifact.
    async fn tags(&self, namespace: Namespace, name: &str)
        -> StorageResult<HashMap<String, String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_keys() {
        assert_eq!(Namespace::Incoming.key("a.png"), "incoming/a.png");
        assert_eq!(Namespace::Quarantine.key("a.png"), "quarantine/a.png");
        assert_eq!(Namespace::Analysis.key("a.json"), "analysis/a.json");
    }
}
