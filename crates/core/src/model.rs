//! Trained model artifacts shared by the classifier, the early-signal
//! analyzer and the registry.
//!
//! A [`TrainedModel`] is produced unversioned by a training run; the registry
//! stamps a [`ModelVersion`] on publish and hands out `Arc` snapshots from
//! then on, so a published model is never mutated.

use crate::error::{CampaignError, CampaignResult};
use crate::types::EncodingVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelVersion(pub u64);

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// What a model scores. Each kind has its own "current" pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Pre-launch success probability from campaign configuration.
    CampaignSuccess,
    /// In-flight success probability from early telemetry.
    EarlySignal,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::CampaignSuccess => write!(f, "campaign_success"),
            ModelKind::EarlySignal => write!(f, "early_signal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Assigned by the registry on publish.
    pub version: Option<ModelVersion>,
    pub model_id: Uuid,
    pub kind: ModelKind,
    /// Campaign feature encoding; `None` for early-signal models.
    pub encoding_version: Option<EncodingVersion>,
    pub trained_at: DateTime<Utc>,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub test_brier_score: f64,
    pub cv_mean_accuracy: f64,
    pub cv_std_accuracy: f64,
    pub cv_folds: usize,
    pub feature_importances: BTreeMap<String, f64>,
    pub training_sample_count: usize,
    /// Share of positive outcomes in the training partition.
    pub base_rate: f64,
}

/// Logistic-regression parameters. Opaque to callers outside the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub intercept: f64,
    /// Per-feature mean over the training partition.
    pub feature_means: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub metadata: ModelMetadata,
    pub parameters: ModelParameters,
}

impl TrainedModel {
    pub fn version(&self) -> Option<ModelVersion> {
        self.metadata.version
    }

    pub fn kind(&self) -> ModelKind {
        self.metadata.kind
    }

    /// Log-odds of success for a feature row laid out as `feature_names`.
    pub fn logit(&self, values: &[f64]) -> CampaignResult<f64> {
        let params = &self.parameters;
        if values.len() != params.weights.len() {
            return Err(CampaignError::validation(format!(
                "feature vector has {} values, model expects {}",
                values.len(),
                params.weights.len()
            )));
        }
        Ok(params.intercept
            + params
                .weights
                .iter()
                .zip(values)
                .map(|(w, x)| w * x)
                .sum::<f64>())
    }

    /// Success probability for a feature row, clamped to `[0, 1]`.
    pub fn probability(&self, values: &[f64]) -> CampaignResult<f64> {
        Ok(sigmoid(self.logit(values)?).clamp(0.0, 1.0))
    }

    /// Fails unless the model is of `kind`.
    pub fn ensure_kind(&self, kind: ModelKind) -> CampaignResult<()> {
        if self.metadata.kind != kind {
            return Err(CampaignError::validation(format!(
                "model {} is a {} model, expected {}",
                self.metadata
                    .version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| self.metadata.model_id.to_string()),
                self.metadata.kind,
                kind
            )));
        }
        Ok(())
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model(kind: ModelKind) -> TrainedModel {
        TrainedModel {
            metadata: ModelMetadata {
                version: None,
                model_id: Uuid::new_v4(),
                kind,
                encoding_version: None,
                trained_at: Utc::now(),
                train_accuracy: 1.0,
                test_accuracy: 1.0,
                test_brier_score: 0.0,
                cv_mean_accuracy: 1.0,
                cv_std_accuracy: 0.0,
                cv_folds: 2,
                feature_importances: BTreeMap::new(),
                training_sample_count: 2,
                base_rate: 0.5,
            },
            parameters: ModelParameters {
                feature_names: vec!["a".into(), "b".into()],
                weights: vec![2.0, -1.0],
                intercept: 0.5,
                feature_means: vec![0.5, 0.5],
            },
        }
    }

    #[test]
    fn probability_uses_logistic_link() {
        let model = tiny_model(ModelKind::CampaignSuccess);
        let logit = model.logit(&[1.0, 1.0]).unwrap();
        assert!((logit - 1.5).abs() < 1e-12);
        let p = model.probability(&[1.0, 1.0]).unwrap();
        assert!((p - sigmoid(1.5)).abs() < 1e-12);
    }

    #[test]
    fn dimension_mismatch_is_validation_error() {
        let model = tiny_model(ModelKind::CampaignSuccess);
        assert!(model.probability(&[1.0]).is_err());
    }

    #[test]
    fn kind_guard() {
        let model = tiny_model(ModelKind::EarlySignal);
        assert!(model.ensure_kind(ModelKind::EarlySignal).is_ok());
        assert!(model.ensure_kind(ModelKind::CampaignSuccess).is_err());
    }

    #[test]
    fn version_displays_with_prefix() {
        assert_eq!(ModelVersion(12).to_string(), "v12");
        assert_eq!(serde_json::to_string(&ModelVersion(12)).unwrap(), "12");
    }
}
