//! Training pipeline shared by the campaign-success and early-signal models:
//! stratified hold-out split, stratified k-fold cross-validation, final fit,
//! single held-out evaluation and feature importance.

use crate::dataset::{stratified_folds, stratified_split, take_rows, TrainingSet};
use crate::logistic::LogisticFit;
use campaign_core::config::TrainingConfig;
use campaign_core::model::{ModelKind, ModelMetadata, ModelParameters, TrainedModel};
use campaign_core::types::EncodingVersion;
use campaign_core::{CampaignError, CampaignResult, CancelToken};
use chrono::Utc;
use ndarray::Axis;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn train(
        &self,
        set: &TrainingSet,
        kind: ModelKind,
        encoding_version: Option<EncodingVersion>,
        cancel: &CancelToken,
    ) -> CampaignResult<TrainedModel> {
        self.check_sufficient(set)?;

        let started = std::time::Instant::now();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let (x, y) = set.matrix()?;

        let (train_idx, test_idx) =
            stratified_split(&set.labels, self.config.test_fraction, &mut rng);
        let minority_train = train_idx
            .iter()
            .filter(|&&i| set.labels[i])
            .count()
            .min(train_idx.iter().filter(|&&i| !set.labels[i]).count());
        let folds = self.config.cv_folds.min(minority_train);
        if folds < 2 {
            return Err(CampaignError::InsufficientData(format!(
                "minority class has {minority_train} training rows, \
                 need at least 2 for cross-validation"
            )));
        }

        // Cross-validation on the training partition only.
        let fold_sets = stratified_folds(&set.labels, &train_idx, folds, &mut rng);
        let mut fold_scores = Vec::with_capacity(folds);
        for (i, held_out) in fold_sets.iter().enumerate() {
            cancel.check()?;
            let fit_idx: Vec<usize> = fold_sets
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            let (fx, fy) = take_rows(&x, &y, &fit_idx);
            let (vx, vy) = take_rows(&x, &y, held_out);
            let fit = LogisticFit::fit(&fx, &fy, &self.config, cancel)?;
            let score = fit.accuracy(&vx, &vy);
            debug!(
                fold = i,
                accuracy = score,
                rows = held_out.len(),
                "Cross-validation fold scored"
            );
            fold_scores.push(score);
        }
        let (cv_mean, cv_std) = mean_std(&fold_scores);

        // Final fit on the full training partition, one look at the test set.
        cancel.check()?;
        let (tx, ty) = take_rows(&x, &y, &train_idx);
        let (hx, hy) = take_rows(&x, &y, &test_idx);
        let fit = LogisticFit::fit(&tx, &ty, &self.config, cancel)?;
        let train_accuracy = fit.accuracy(&tx, &ty);
        let test_accuracy = fit.accuracy(&hx, &hy);
        let test_brier_score = fit.brier_score(&hx, &hy);

        let feature_means = tx
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![0.0; set.feature_names.len()]);
        let feature_stds = tx.std_axis(Axis(0), 0.0);
        let feature_importances = importances(
            &set.feature_names,
            fit.weights.as_slice().unwrap_or(&[]),
            feature_stds.as_slice().unwrap_or(&[]),
        );
        let base_rate = ty.mean().unwrap_or(0.0);

        info!(
            kind = %kind,
            samples = set.len(),
            train_rows = train_idx.len(),
            test_rows = test_idx.len(),
            folds = folds,
            cv_mean = cv_mean,
            cv_std = cv_std,
            train_accuracy = train_accuracy,
            test_accuracy = test_accuracy,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Model training complete"
        );

        Ok(TrainedModel {
            metadata: ModelMetadata {
                version: None,
                model_id: Uuid::new_v4(),
                kind,
                encoding_version,
                trained_at: Utc::now(),
                train_accuracy,
                test_accuracy,
                test_brier_score,
                cv_mean_accuracy: cv_mean,
                cv_std_accuracy: cv_std,
                cv_folds: folds,
                feature_importances,
                training_sample_count: set.len(),
                base_rate,
            },
            parameters: ModelParameters {
                feature_names: set.feature_names.clone(),
                weights: fit.weights.to_vec(),
                intercept: fit.intercept,
                feature_means,
            },
        })
    }

    fn check_sufficient(&self, set: &TrainingSet) -> CampaignResult<()> {
        let minimum = self.config.min_samples.max(4);
        if set.len() < minimum {
            return Err(CampaignError::InsufficientData(format!(
                "{} labelled samples, need at least {minimum}",
                set.len()
            )));
        }
        if set.positives() == 0 || set.negatives() == 0 {
            return Err(CampaignError::InsufficientData(format!(
                "only one outcome class present ({} successes, {} failures)",
                set.positives(),
                set.negatives()
            )));
        }
        Ok(())
    }
}

/// Mean and population standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Standardised coefficient magnitude `|w| * sd`, normalised to sum to 1.
fn importances(names: &[String], weights: &[f64], stds: &[f64]) -> BTreeMap<String, f64> {
    let raw: Vec<f64> = weights
        .iter()
        .zip(stds)
        .map(|(w, s)| (w * s).abs())
        .collect();
    let total: f64 = raw.iter().sum();
    names
        .iter()
        .zip(raw)
        .map(|(name, r)| {
            let share = if total > 0.0 { r / total } else { 0.0 };
            (name.clone(), share)
        })
        .collect()
}
