//! Versioned model registry.
//!
//! Published models are immutable `Arc` snapshots. Readers clone the `Arc`
//! for the current model of a kind and keep using it even if a newer version
//! is published mid-request; publishing swaps the pointer under a short
//! write lock and never blocks on in-flight readers.

use crate::artifact::ModelArtifact;
use crate::store::{ArtifactStore, MemoryArtifactStore};
use campaign_core::{
    CampaignError, CampaignResult, ModelKind, ModelMetadata, ModelVersion, TrainedModel,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct ModelRegistry {
    store: Arc<dyn ArtifactStore>,
    versions: DashMap<ModelVersion, Arc<TrainedModel>>,
    current: RwLock<HashMap<ModelKind, Arc<TrainedModel>>>,
    /// Last assigned version; held for the whole publish so versions are
    /// handed out and persisted in order.
    publish_lock: Mutex<u64>,
}

impl ModelRegistry {
    /// Reload every artifact the store holds. The current model of each kind
    /// is the highest version of that kind.
    pub fn open(store: Arc<dyn ArtifactStore>) -> CampaignResult<Self> {
        let artifacts = store.load_all()?;
        let versions = DashMap::new();
        let mut current: HashMap<ModelKind, Arc<TrainedModel>> = HashMap::new();
        let mut last = 0;

        for artifact in artifacts {
            let version = artifact.version;
            let model = Arc::new(artifact.model);
            last = last.max(version.0);
            let newer = current
                .get(&model.kind())
                .and_then(|m| m.version())
                .map_or(true, |v| v < version);
            if newer {
                current.insert(model.kind(), model.clone());
            }
            versions.insert(version, model);
        }

        info!(
            store = %store.describe(),
            versions = versions.len(),
            last_version = last,
            "Model registry opened"
        );

        Ok(Self {
            store,
            versions,
            current: RwLock::new(current),
            publish_lock: Mutex::new(last),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryArtifactStore::new()),
            versions: DashMap::new(),
            current: RwLock::new(HashMap::new()),
            publish_lock: Mutex::new(0),
        }
    }

    /// Assign the next version, persist, then make it current for its kind.
    /// Nothing becomes visible unless the artifact was stored.
    pub fn publish(&self, mut model: TrainedModel) -> CampaignResult<Arc<TrainedModel>> {
        if let Some(v) = model.version() {
            return Err(CampaignError::validation(format!(
                "model is already published as {v}"
            )));
        }

        let mut last = self.publish_lock.lock();
        let version = ModelVersion(*last + 1);
        model.metadata.version = Some(version);

        let artifact = ModelArtifact::seal(model)?;
        self.store.save(&artifact)?;

        let model = Arc::new(artifact.model);
        self.versions.insert(version, model.clone());
        self.current.write().insert(model.kind(), model.clone());
        *last = version.0;

        metrics::counter!("registry.published", "kind" => model.kind().to_string()).increment(1);
        info!(
            version = %version,
            kind = %model.kind(),
            model_id = %model.metadata.model_id,
            test_accuracy = model.metadata.test_accuracy,
            "Model published"
        );
        Ok(model)
    }

    pub fn get(&self, version: ModelVersion) -> CampaignResult<Arc<TrainedModel>> {
        self.versions
            .get(&version)
            .map(|m| m.value().clone())
            .ok_or(CampaignError::ModelVersionNotFound(version.0))
    }

    pub fn current(&self, kind: ModelKind) -> Option<Arc<TrainedModel>> {
        self.current.read().get(&kind).cloned()
    }

    /// A specific version when asked for one, otherwise the current model.
    pub fn resolve(
        &self,
        kind: ModelKind,
        version: Option<ModelVersion>,
    ) -> CampaignResult<Arc<TrainedModel>> {
        let model = match version {
            Some(v) => self.get(v)?,
            None => self.current(kind).ok_or_else(|| {
                CampaignError::ModelNotTrained(format!("no {kind} model has been published"))
            })?,
        };
        model.ensure_kind(kind)?;
        Ok(model)
    }

    /// Metadata of every version, oldest first.
    pub fn list(&self) -> Vec<ModelMetadata> {
        let mut all: Vec<ModelMetadata> = self
            .versions
            .iter()
            .map(|entry| entry.value().metadata.clone())
            .collect();
        all.sort_by_key(|m| m.version);
        all
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
