//! Persistence backends for model artifacts. Versions are append-only: a
//! store refuses to overwrite a version it already holds.

use crate::artifact::ModelArtifact;
use campaign_core::{CampaignError, CampaignResult, ModelVersion};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

pub trait ArtifactStore: Send + Sync {
    fn save(&self, artifact: &ModelArtifact) -> CampaignResult<()>;

    /// Every persisted artifact, verified, in ascending version order.
    fn load_all(&self) -> CampaignResult<Vec<ModelArtifact>>;

    fn describe(&self) -> String;
}

// ─── Filesystem ─────────────────────────────────────────────────────────────

/// One `model-v000042.json` artifact plus a `model-v000042.meta.json`
/// metadata record per version.
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> CampaignResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn artifact_path(&self, version: ModelVersion) -> PathBuf {
        self.dir.join(format!("model-v{:06}.json", version.0))
    }

    fn metadata_path(&self, version: ModelVersion) -> PathBuf {
        self.dir.join(format!("model-v{:06}.meta.json", version.0))
    }

    /// Write to a unique temp file in the same directory, then rename into
    /// place so readers never observe a partial artifact.
    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> CampaignResult<()> {
        let tmp = self.dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let result = (|| {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, target)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        Ok(result?)
    }
}

impl ArtifactStore for FileArtifactStore {
    /// The metadata record goes down first and the artifact rename commits
    /// the version. A failed artifact write removes the metadata again.
    fn save(&self, artifact: &ModelArtifact) -> CampaignResult<()> {
        let path = self.artifact_path(artifact.version);
        let meta_path = self.metadata_path(artifact.version);
        if path.exists() {
            if meta_path.is_file() {
                return Err(CampaignError::Artifact(format!(
                    "artifact for {} already exists at {}",
                    artifact.version,
                    path.display()
                )));
            }
            warn!(
                version = %artifact.version,
                path = %path.display(),
                "Replacing artifact left without a metadata record"
            );
            fs::remove_file(&path)?;
        }

        let metadata = serde_json::to_vec_pretty(&artifact.model.metadata)?;
        let bytes = artifact.to_json()?;
        self.write_atomic(&meta_path, &metadata)?;
        if let Err(e) = self.write_atomic(&path, &bytes) {
            let _ = fs::remove_file(&meta_path);
            return Err(e);
        }

        debug!(version = %artifact.version, path = %path.display(), "Artifact written");
        Ok(())
    }

    fn load_all(&self) -> CampaignResult<Vec<ModelArtifact>> {
        let mut artifacts = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with("model-v")
                || !name.ends_with(".json")
                || name.ends_with(".meta.json")
            {
                continue;
            }

            let artifact = ModelArtifact::from_json(&fs::read(&path)?)
                .map_err(|e| CampaignError::Artifact(format!("{}: {e}", path.display())))?;
            if self.artifact_path(artifact.version) != path {
                warn!(
                    path = %path.display(),
                    version = %artifact.version,
                    "Artifact file name does not match its version"
                );
                return Err(CampaignError::Artifact(format!(
                    "{} holds {}",
                    path.display(),
                    artifact.version
                )));
            }
            if !self.metadata_path(artifact.version).is_file() {
                warn!(
                    path = %path.display(),
                    version = %artifact.version,
                    "Skipping artifact without a metadata record"
                );
                continue;
            }
            artifacts.push(artifact);
        }
        artifacts.sort_by_key(|a| a.version);
        Ok(artifacts)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.dir.display())
    }
}

// ─── In-memory ──────────────────────────────────────────────────────────────

/// Keeps serialized artifacts in memory, so tests exercise the same
/// encoding and verification path as the file store.
#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<BTreeMap<ModelVersion, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save(&self, artifact: &ModelArtifact) -> CampaignResult<()> {
        let mut artifacts = self.artifacts.lock();
        if artifacts.contains_key(&artifact.version) {
            return Err(CampaignError::Artifact(format!(
                "artifact for {} already exists",
                artifact.version
            )));
        }
        artifacts.insert(artifact.version, artifact.to_json()?);
        Ok(())
    }

    fn load_all(&self) -> CampaignResult<Vec<ModelArtifact>> {
        self.artifacts
            .lock()
            .values()
            .map(|bytes| ModelArtifact::from_json(bytes))
            .collect()
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::model;
    use campaign_core::ModelKind;

    #[test]
    fn file_store_writes_artifact_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();
        let artifact = ModelArtifact::seal(model(ModelKind::CampaignSuccess, Some(1))).unwrap();
        store.save(&artifact).unwrap();

        assert!(dir.path().join("model-v000001.json").exists());
        assert!(dir.path().join("model-v000001.meta.json").exists());
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(".tmp-")
            })
            .count();
        assert_eq!(leftovers, 0);

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![artifact]);
    }

    #[test]
    fn file_store_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();
        let artifact = ModelArtifact::seal(model(ModelKind::CampaignSuccess, Some(2))).unwrap();
        store.save(&artifact).unwrap();
        assert!(matches!(
            store.save(&artifact).unwrap_err(),
            CampaignError::Artifact(_)
        ));
    }

    #[test]
    fn corrupted_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();
        fs::write(
            dir.path().join("model-v000007.json"),
            br#"{"schema":"something-else/v1"}"#,
        )
        .unwrap();
        fs::write(dir.path().join("model-v000007.meta.json"), b"{}").unwrap();
        let err = store.load_all().unwrap_err();
        assert!(matches!(err, CampaignError::Artifact(_)));
    }

    #[test]
    fn failed_metadata_write_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();
        let blocker = dir.path().join("model-v000001.meta.json");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("occupied"), b"x").unwrap();

        let artifact = ModelArtifact::seal(model(ModelKind::CampaignSuccess, Some(1))).unwrap();
        assert!(store.save(&artifact).is_err());
        assert!(!dir.path().join("model-v000001.json").exists());
        assert!(store.load_all().unwrap().is_empty());

        fs::remove_dir_all(&blocker).unwrap();
        store.save(&artifact).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![artifact]);
    }

    #[test]
    fn artifact_without_metadata_is_skipped_and_replaceable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();
        let orphan = ModelArtifact::seal(model(ModelKind::CampaignSuccess, Some(1))).unwrap();
        fs::write(dir.path().join("model-v000001.json"), orphan.to_json().unwrap()).unwrap();
        assert!(store.load_all().unwrap().is_empty());

        let replacement = ModelArtifact::seal(model(ModelKind::EarlySignal, Some(1))).unwrap();
        store.save(&replacement).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![replacement]);
    }

    #[test]
    fn memory_store_is_append_only() {
        let store = MemoryArtifactStore::new();
        let a = ModelArtifact::seal(model(ModelKind::EarlySignal, Some(1))).unwrap();
        store.save(&a).unwrap();
        assert!(store.save(&a).is_err());
        assert_eq!(store.load_all().unwrap().len(), 1);
    }
}
