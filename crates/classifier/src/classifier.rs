//! Success classifier: trains a campaign-success model from labelled
//! historical campaigns and scores new campaigns against a published model.

use crate::dataset::TrainingSet;
use crate::trainer::ModelTrainer;
use campaign_core::config::{PredictionConfig, TierThresholds, TrainingConfig};
use campaign_core::model::{ModelKind, TrainedModel};
use campaign_core::types::{CampaignRecord, DrivingFactor, FeatureVector, PredictionResult, Tier};
use campaign_core::{CampaignError, CampaignResult, CancelToken};
use campaign_features::FeatureExtractor;
use tracing::{debug, info, warn};

pub struct SuccessClassifier {
    extractor: FeatureExtractor,
    trainer: ModelTrainer,
    prediction: PredictionConfig,
    tiers: TierThresholds,
}

impl SuccessClassifier {
    pub fn new(
        extractor: FeatureExtractor,
        training: TrainingConfig,
        prediction: PredictionConfig,
        tiers: TierThresholds,
    ) -> Self {
        Self {
            extractor,
            trainer: ModelTrainer::new(training),
            prediction,
            tiers,
        }
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Train a new (unpublished) campaign-success model.
    ///
    /// Unlabelled and malformed records are skipped; the batch only fails as
    /// a whole when every record is malformed.
    pub fn train(
        &self,
        records: &[CampaignRecord],
        cancel: &CancelToken,
    ) -> CampaignResult<TrainedModel> {
        let version = self.extractor.default_version();
        let mut set = TrainingSet::new(self.extractor.feature_names(version));
        let mut unlabelled = 0usize;
        let mut malformed = 0usize;

        for (i, record) in records.iter().enumerate() {
            let Some(label) = record.outcome_label else {
                unlabelled += 1;
                continue;
            };
            match self.extractor.extract(record, version) {
                Ok(fv) => set.push(fv.values, label)?,
                Err(e) => {
                    warn!(
                        index = i,
                        id = ?record.id,
                        error = %e,
                        "Skipping malformed training record"
                    );
                    malformed += 1;
                }
            }
        }

        if !records.is_empty() && malformed == records.len() {
            return Err(CampaignError::validation(format!(
                "all {malformed} training records are malformed"
            )));
        }

        info!(
            records = records.len(),
            labelled = set.len(),
            unlabelled = unlabelled,
            malformed = malformed,
            version = ?version,
            "Training campaign success model"
        );

        self.trainer
            .train(&set, ModelKind::CampaignSuccess, Some(version), cancel)
    }

    /// Extract with the model's own encoding version, then score.
    pub fn predict_record(
        &self,
        record: &CampaignRecord,
        model: &TrainedModel,
    ) -> CampaignResult<PredictionResult> {
        let version = model.metadata.encoding_version.ok_or_else(|| {
            CampaignError::validation("campaign success model has no encoding version")
        })?;
        let vector = self.extractor.extract(record, version)?;
        self.predict(&vector, model)
    }

    pub fn predict(
        &self,
        vector: &FeatureVector,
        model: &TrainedModel,
    ) -> CampaignResult<PredictionResult> {
        model.ensure_kind(ModelKind::CampaignSuccess)?;
        if model.metadata.encoding_version != Some(vector.encoding_version)
            || model.parameters.feature_names != vector.feature_names
        {
            return Err(CampaignError::validation(format!(
                "feature schema {:?} does not match model {}",
                vector.encoding_version,
                model
                    .version()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "(unpublished)".to_string())
            )));
        }

        let probability = model.probability(&vector.values)?;
        let confidence_tier =
            confidence_tier(model.metadata.cv_std_accuracy, probability, &self.prediction);
        let risk_tier = risk_tier(probability, &self.tiers);
        let top_driving_factors = driving_factors(vector, model, self.prediction.top_factors);

        debug!(
            probability = probability,
            confidence = %confidence_tier,
            risk = %risk_tier,
            "Campaign scored"
        );

        Ok(PredictionResult {
            success_probability: probability,
            confidence_tier,
            risk_tier,
            top_driving_factors,
            model_version: model.version(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Strength {
    Weak,
    Partial,
    Strong,
}

/// Couples confidence to model stability as well as decision margin: an
/// unstable model never yields HIGH, however extreme the probability.
pub fn confidence_tier(cv_std: f64, probability: f64, config: &PredictionConfig) -> Tier {
    let stability = if cv_std <= config.stable_cv_std {
        Strength::Strong
    } else if cv_std <= config.moderate_cv_std {
        Strength::Partial
    } else {
        Strength::Weak
    };

    let margin = (probability - 0.5).abs();
    let separation = if margin >= config.strong_margin {
        Strength::Strong
    } else if margin >= config.partial_margin {
        Strength::Partial
    } else {
        Strength::Weak
    };

    match stability.min(separation) {
        Strength::Strong => Tier::High,
        Strength::Partial => Tier::Medium,
        Strength::Weak => Tier::Low,
    }
}

/// Low probability means high risk. Boundaries match the early-signal
/// success categories: only `p > high_success_above` is low risk.
pub fn risk_tier(probability: f64, tiers: &TierThresholds) -> Tier {
    if probability > tiers.high_success_above {
        Tier::Low
    } else if probability >= tiers.low_success_below {
        Tier::Medium
    } else {
        Tier::High
    }
}

/// Features that pushed the log-odds furthest from the training population
/// mean, largest magnitude first.
fn driving_factors(
    vector: &FeatureVector,
    model: &TrainedModel,
    limit: usize,
) -> Vec<DrivingFactor> {
    let params = &model.parameters;
    let mut factors: Vec<DrivingFactor> = params
        .feature_names
        .iter()
        .zip(&params.weights)
        .zip(params.feature_means.iter().zip(&vector.values))
        .map(|((name, w), (mean, x))| DrivingFactor {
            feature: name.clone(),
            contribution: w * (x - mean),
        })
        .filter(|f| f.contribution.abs() > 1e-12)
        .collect();

    factors.sort_by(|a, b| {
        b.contribution
            .abs()
            .partial_cmp(&a.contribution.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    factors.truncate(limit);
    factors
}
