//! Versioned, append-only storage of trained models.

pub mod artifact;
pub mod registry;
pub mod store;

pub use artifact::{ModelArtifact, ARTIFACT_SCHEMA};
pub use registry::ModelRegistry;
pub use store::{ArtifactStore, FileArtifactStore, MemoryArtifactStore};
