//! Imgvet Storage Library
//!
//! This crate provides the artifact store abstraction and its backends.
//! Artifacts move between three namespaces over their lifetime:
//!
//! - **incoming**: raw uploads awaiting the scan stage
//! - **quarantine**: artifacts pulled from the pipeline, tagged with a reason
//! - **analysis**: JSON analysis results for completed artifacts
//!
//! Keys are `{namespace}/{name}` and must not contain `..` or a leading `/`.
//! Time-limited access to an artifact goes through `signed_url`, never
//! through a raw filesystem path.

pub mod factory;
pub mod local;
pub mod memory;
pub mod signed_url;
pub mod traits;

// Re-export commonly used types
pub use factory::create_artifact_store;
pub use local::LocalArtifactStore;
pub use memory::MemoryArtifactStore;
pub use traits::{ArtifactStore, Namespace, StorageError, StorageResult};
