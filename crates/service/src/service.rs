//! Prediction service: the library facade the surrounding application
//! calls. Owns the registry and the component engines, hands training off to
//! background jobs and keeps inference synchronous.

use crate::jobs::{JobStatus, TrainingHandle, TrainingJobs};
use campaign_budget::{
    BudgetAllocationRequest, BudgetAllocationResult, BudgetOptimizer, ChannelPerformanceProfile,
};
use campaign_classifier::SuccessClassifier;
use campaign_core::{
    AppConfig, CampaignError, CampaignRecord, CampaignResult, ModelKind, ModelMetadata,
    ModelVersion, PredictionResult,
};
use campaign_early_signal::{
    EarlyMetricsSnapshot, EarlyPrediction, EarlySignalAnalyzer, LabeledSnapshot,
};
use campaign_features::FeatureExtractor;
use campaign_model_registry::{FileArtifactStore, ModelRegistry};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct PredictionService {
    registry: Arc<ModelRegistry>,
    classifier: Arc<SuccessClassifier>,
    early: Arc<EarlySignalAnalyzer>,
    optimizer: BudgetOptimizer,
    jobs: TrainingJobs,
}

impl PredictionService {
    pub fn new(config: &AppConfig, registry: Arc<ModelRegistry>) -> CampaignResult<Self> {
        let extractor = FeatureExtractor::new(&config.features)?;
        let classifier = SuccessClassifier::new(
            extractor,
            config.training.clone(),
            config.prediction.clone(),
            config.tiers.clone(),
        );
        let early = EarlySignalAnalyzer::new(
            config.early_signal.clone(),
            config.tiers.clone(),
            config.training.clone(),
        );

        info!(
            instance_id = %config.instance_id,
            published_models = registry.len(),
            "Prediction service initialized"
        );

        Ok(Self {
            registry,
            classifier: Arc::new(classifier),
            early: Arc::new(early),
            optimizer: BudgetOptimizer::new(config.optimizer.clone()),
            jobs: TrainingJobs::new(),
        })
    }

    /// Service backed by the artifact directory named in the configuration.
    pub fn open(config: &AppConfig) -> CampaignResult<Self> {
        let store = FileArtifactStore::new(&config.registry.artifact_dir)?;
        let registry = ModelRegistry::open(Arc::new(store))?;
        Self::new(config, Arc::new(registry))
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    // ─── Training ───────────────────────────────────────────────────────────

    pub fn submit_training(
        &self,
        records: Vec<CampaignRecord>,
    ) -> CampaignResult<TrainingHandle> {
        let classifier = self.classifier.clone();
        self.jobs.submit("campaign_success", self.registry.clone(), move |cancel| {
            classifier.train(&records, cancel)
        })
    }

    /// Training from a raw JSON array. Malformed elements are skipped with a
    /// warning; the batch is rejected only when none of them decode.
    pub fn submit_training_json(&self, value: serde_json::Value) -> CampaignResult<TrainingHandle> {
        let decoded = CampaignRecord::decode_batch(value)?;
        let total = decoded.len();
        let mut records = Vec::with_capacity(total);
        for (index, outcome) in decoded.into_iter().enumerate() {
            match outcome {
                Ok(record) => records.push(record),
                Err(e) => warn!(index = index, error = %e, "Skipping malformed training record"),
            }
        }
        if total > 0 && records.is_empty() {
            return Err(CampaignError::validation(format!(
                "all {total} training records are malformed"
            )));
        }
        if records.len() < total {
            info!(
                total = total,
                skipped = total - records.len(),
                "Malformed training records dropped"
            );
        }
        self.submit_training(records)
    }

    pub fn submit_early_training(
        &self,
        samples: Vec<LabeledSnapshot>,
    ) -> CampaignResult<TrainingHandle> {
        let early = self.early.clone();
        self.jobs.submit("early_signal", self.registry.clone(), move |cancel| {
            early.train_early_model(&samples, cancel)
        })
    }

    pub fn job_status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.jobs.status(job_id)
    }

    pub fn cancel_job(&self, job_id: Uuid) -> bool {
        self.jobs.cancel(job_id)
    }

    // ─── Inference ──────────────────────────────────────────────────────────

    pub fn predict(
        &self,
        record: &CampaignRecord,
        version: Option<ModelVersion>,
    ) -> CampaignResult<PredictionResult> {
        let started = Instant::now();
        let model = self.registry.resolve(ModelKind::CampaignSuccess, version)?;
        let result = self.classifier.predict_record(record, &model)?;

        metrics::counter!("predictions.total").increment(1);
        metrics::histogram!("predictions.latency_us")
            .record(started.elapsed().as_micros() as f64);
        debug!(
            id = ?record.id,
            version = ?result.model_version,
            probability = result.success_probability,
            "Campaign prediction served"
        );
        Ok(result)
    }

    /// Score many campaigns against one model snapshot. A malformed record
    /// fails alone; only a missing model fails the whole batch.
    pub fn predict_batch(
        &self,
        records: &[CampaignRecord],
        version: Option<ModelVersion>,
    ) -> CampaignResult<Vec<CampaignResult<PredictionResult>>> {
        let model = self.registry.resolve(ModelKind::CampaignSuccess, version)?;
        let results: Vec<_> = records
            .iter()
            .map(|r| self.classifier.predict_record(r, &model))
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        metrics::counter!("predictions.total").increment((results.len() - failed) as u64);
        info!(
            batch = records.len(),
            failed = failed,
            version = ?model.version(),
            "Batch prediction served"
        );
        Ok(results)
    }

    /// Batch scoring from a raw JSON array: elements that fail to decode are
    /// reported in place alongside the scored ones.
    pub fn predict_batch_json(
        &self,
        value: serde_json::Value,
        version: Option<ModelVersion>,
    ) -> CampaignResult<Vec<CampaignResult<PredictionResult>>> {
        let decoded = CampaignRecord::decode_batch(value)?;
        let model = self.registry.resolve(ModelKind::CampaignSuccess, version)?;
        let results: Vec<_> = decoded
            .into_iter()
            .map(|r| r.and_then(|record| self.classifier.predict_record(&record, &model)))
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        metrics::counter!("predictions.total").increment((results.len() - failed) as u64);
        info!(
            batch = results.len(),
            failed = failed,
            version = ?model.version(),
            "Batch prediction served"
        );
        Ok(results)
    }

    /// Uses the requested early-signal model, the current one when none is
    /// requested, and the rule-only estimator when none is published.
    pub fn analyze_early(
        &self,
        snapshot: &EarlyMetricsSnapshot,
        version: Option<ModelVersion>,
    ) -> CampaignResult<EarlyPrediction> {
        let model = match version {
            Some(v) => Some(self.registry.resolve(ModelKind::EarlySignal, Some(v))?),
            None => self.registry.current(ModelKind::EarlySignal),
        };
        self.early.analyze(snapshot, model.as_deref())
    }

    pub fn optimize(
        &self,
        request: &BudgetAllocationRequest,
        profiles: &[ChannelPerformanceProfile],
    ) -> CampaignResult<BudgetAllocationResult> {
        self.optimizer.optimize(request, profiles)
    }

    pub fn models(&self) -> Vec<ModelMetadata> {
        self.registry.list()
    }
}
