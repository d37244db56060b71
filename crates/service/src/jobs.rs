//! Background training jobs.
//!
//! Training runs on Tokio's blocking pool. Each job publishes its status
//! through a `watch` channel so callers can poll or await completion, and
//! carries a [`CancelToken`] that the training loop checks cooperatively.

use campaign_core::{
    CampaignError, CampaignResult, CancelToken, ErrorKind, ModelMetadata, ModelVersion,
    TrainedModel,
};
use campaign_model_registry::ModelRegistry;
use dashmap::DashMap;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed {
        version: ModelVersion,
        metadata: ModelMetadata,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed { .. } | JobStatus::Failed { .. } | JobStatus::Cancelled
        )
    }

    fn label(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed { .. } => "completed",
            JobStatus::Failed { .. } => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// Returned immediately on submission.
#[derive(Debug)]
pub struct TrainingHandle {
    job_id: Uuid,
    status: watch::Receiver<JobStatus>,
    cancel: CancelToken,
}

impl TrainingHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Request cancellation. A job that has already started publishing
    /// still completes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for a terminal status.
    pub async fn wait(mut self) -> JobStatus {
        loop {
            let status = self.status.borrow_and_update().clone();
            if status.is_terminal() {
                return status;
            }
            if self.status.changed().await.is_err() {
                return self.status.borrow().clone();
            }
        }
    }
}

/// Finished jobs kept for status lookups before the oldest are dropped.
pub const DEFAULT_FINISHED_RETENTION: usize = 256;

struct JobEntry {
    seq: u64,
    status: watch::Receiver<JobStatus>,
    cancel: CancelToken,
}

#[derive(Clone)]
pub struct TrainingJobs {
    jobs: Arc<DashMap<Uuid, JobEntry>>,
    next_seq: Arc<AtomicU64>,
    finished_retention: usize,
}

impl Default for TrainingJobs {
    fn default() -> Self {
        Self::with_retention(DEFAULT_FINISHED_RETENTION)
    }
}

impl TrainingJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `finished_retention` terminal jobs. Queued and running
    /// jobs are never evicted.
    pub fn with_retention(finished_retention: usize) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
            finished_retention,
        }
    }

    /// Drop the oldest terminal jobs beyond the retention limit.
    fn evict_finished(&self) {
        let mut finished: Vec<(u64, Uuid)> = self
            .jobs
            .iter()
            .filter(|e| e.status.borrow().is_terminal())
            .map(|e| (e.seq, *e.key()))
            .collect();
        if finished.len() <= self.finished_retention {
            return;
        }
        finished.sort_unstable();
        let excess = finished.len() - self.finished_retention;
        for (_, job_id) in finished.into_iter().take(excess) {
            self.jobs.remove(&job_id);
        }
        debug!(evicted = excess, "Finished training jobs evicted");
    }

    /// Run `train` on the blocking pool and publish its model to `registry`.
    /// Must be called from within a Tokio runtime.
    pub fn submit<F>(
        &self,
        label: &'static str,
        registry: Arc<ModelRegistry>,
        train: F,
    ) -> CampaignResult<TrainingHandle>
    where
        F: FnOnce(&CancelToken) -> CampaignResult<TrainedModel> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            CampaignError::Internal(anyhow::anyhow!("training needs a Tokio runtime: {e}"))
        })?;

        self.evict_finished();

        let job_id = Uuid::new_v4();
        let cancel = CancelToken::new();
        let (tx, rx) = watch::channel(JobStatus::Queued);
        self.jobs.insert(
            job_id,
            JobEntry {
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                status: rx.clone(),
                cancel: cancel.clone(),
            },
        );
        metrics::counter!("training.jobs", "job" => label, "state" => "submitted").increment(1);
        info!(job_id = %job_id, job = label, "Training job submitted");

        let token = cancel.clone();
        runtime.spawn_blocking(move || {
            if token.is_cancelled() {
                tx.send_replace(JobStatus::Cancelled);
                return;
            }
            tx.send_replace(JobStatus::Running);

            let started = std::time::Instant::now();
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| train(&token)))
                .unwrap_or_else(|payload| {
                    Err(CampaignError::Internal(anyhow::anyhow!(
                        "training panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                })
                .and_then(|model| {
                    // Last chance to back out; past this point the model goes live.
                    token.check()?;
                    registry.publish(model)
                });

            let status = match outcome {
                Ok(model) => JobStatus::Completed {
                    version: model.version().unwrap_or(ModelVersion(0)),
                    metadata: model.metadata.clone(),
                },
                Err(CampaignError::Cancelled) => JobStatus::Cancelled,
                Err(e) => JobStatus::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                },
            };

            match &status {
                JobStatus::Failed { message, .. } => {
                    warn!(
                        job_id = %job_id,
                        job = label,
                        error = %message,
                        "Training job failed"
                    )
                }
                other => info!(
                    job_id = %job_id,
                    job = label,
                    state = other.label(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Training job finished"
                ),
            }
            metrics::counter!("training.jobs", "job" => label, "state" => status.label())
                .increment(1);
            tx.send_replace(status);
        });

        Ok(TrainingHandle {
            job_id,
            status: rx,
            cancel,
        })
    }

    pub fn status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.jobs.get(&job_id).map(|e| e.status.borrow().clone())
    }

    /// Returns `false` for an unknown job.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.jobs.get(&job_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_classifier::{ModelTrainer, TrainingSet};
    use campaign_core::config::TrainingConfig;
    use campaign_core::ModelKind;
    use std::time::Duration;

    fn trained_model() -> TrainedModel {
        let mut set = TrainingSet::new(vec!["x".into()]);
        for i in 0..40 {
            let label = i % 2 == 0;
            set.push(vec![if label { 0.9 } else { 0.1 }], label).unwrap();
        }
        ModelTrainer::new(TrainingConfig::default())
            .train(&set, ModelKind::EarlySignal, None, &CancelToken::new())
            .unwrap()
    }

    fn wait_for_cancel(token: &CancelToken) {
        while !token.is_cancelled() {
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[tokio::test]
    async fn completed_job_publishes() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let jobs = TrainingJobs::new();
        let handle = jobs
            .submit("test", registry.clone(), |_| Ok(trained_model()))
            .unwrap();
        let id = handle.job_id();

        let status = handle.wait().await;
        assert!(matches!(status, JobStatus::Completed { version: ModelVersion(1), .. }));
        assert_eq!(jobs.status(id), Some(status));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_during_training_never_publishes() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let jobs = TrainingJobs::new();
        let handle = jobs
            .submit("test", registry.clone(), |token| {
                wait_for_cancel(token);
                token.check()?;
                Ok(trained_model())
            })
            .unwrap();

        assert!(jobs.cancel(handle.job_id()));
        assert_eq!(handle.wait().await, JobStatus::Cancelled);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn cancel_after_training_is_caught_before_publish() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let jobs = TrainingJobs::new();
        let handle = jobs
            .submit("test", registry.clone(), |token| {
                wait_for_cancel(token);
                Ok(trained_model())
            })
            .unwrap();

        handle.cancel();
        assert_eq!(handle.wait().await, JobStatus::Cancelled);
        assert!(registry.current(ModelKind::EarlySignal).is_none());
    }

    #[tokio::test]
    async fn failure_reports_kind() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let jobs = TrainingJobs::new();
        let handle = jobs
            .submit("test", registry.clone(), |_| {
                Err(CampaignError::InsufficientData("3 samples".into()))
            })
            .unwrap();
        match handle.wait().await {
            JobStatus::Failed { kind, message } => {
                assert_eq!(kind, ErrorKind::InsufficientData);
                assert!(message.contains("3 samples"));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn panicking_training_reports_internal_failure() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let jobs = TrainingJobs::new();
        let handle = jobs
            .submit("test", registry.clone(), |_| -> CampaignResult<TrainedModel> {
                panic!("weights exploded")
            })
            .unwrap();
        let id = handle.job_id();
        match handle.wait().await {
            JobStatus::Failed { kind, message } => {
                assert_eq!(kind, ErrorKind::Internal);
                assert!(message.contains("weights exploded"));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert!(jobs.status(id).is_some_and(|s| s.is_terminal()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn oldest_finished_jobs_are_evicted() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let jobs = TrainingJobs::with_retention(2);
        let mut ids = Vec::new();
        for _ in 0..4 {
            let handle = jobs
                .submit("test", registry.clone(), |_| {
                    Err(CampaignError::InsufficientData("none".into()))
                })
                .unwrap();
            ids.push(handle.job_id());
            handle.wait().await;
        }

        let last = jobs
            .submit("test", registry.clone(), |_| Ok(trained_model()))
            .unwrap();
        assert_eq!(jobs.status(ids[0]), None);
        assert_eq!(jobs.status(ids[1]), None);
        assert!(jobs.status(ids[2]).is_some());
        assert!(jobs.status(ids[3]).is_some());
        assert!(jobs.status(last.job_id()).is_some());
        last.wait().await;
    }

    #[test]
    fn submit_outside_runtime_is_an_error() {
        let jobs = TrainingJobs::new();
        let registry = Arc::new(ModelRegistry::in_memory());
        assert!(jobs.submit("test", registry, |_| Ok(trained_model())).is_err());
        assert_eq!(jobs.status(Uuid::new_v4()), None);
    }
}
