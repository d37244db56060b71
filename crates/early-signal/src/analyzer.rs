//! Early signal analyzer: scores a campaign from its first hours of
//! telemetry, flags the problems it sees and suggests what to do next.

use crate::rules;
use crate::types::{EarlyMetricsSnapshot, EarlyPrediction, LabeledSnapshot, SuccessCategory};
use campaign_classifier::{ModelTrainer, TrainingSet};
use campaign_core::config::{EarlySignalConfig, TierThresholds, TrainingConfig};
use campaign_core::model::{ModelKind, TrainedModel};
use campaign_core::types::Tier;
use campaign_core::{CampaignError, CampaignResult, CancelToken};
use tracing::{debug, info, warn};

/// Inputs of the learned early-stage model, in vector order.
pub const EARLY_FEATURE_NAMES: [&str; 6] = [
    "ctr_score",
    "cvr_score",
    "cpa_score",
    "roas_score",
    "audience_score",
    "engagement_trend",
];

pub struct EarlySignalAnalyzer {
    config: EarlySignalConfig,
    tiers: TierThresholds,
    trainer: ModelTrainer,
}

impl EarlySignalAnalyzer {
    pub fn new(config: EarlySignalConfig, tiers: TierThresholds, training: TrainingConfig) -> Self {
        Self {
            config,
            tiers,
            trainer: ModelTrainer::new(training),
        }
    }

    pub fn config(&self) -> &EarlySignalConfig {
        &self.config
    }

    pub fn analyze(
        &self,
        snapshot: &EarlyMetricsSnapshot,
        model: Option<&TrainedModel>,
    ) -> CampaignResult<EarlyPrediction> {
        snapshot.validate()?;

        let base = match model {
            Some(model) => {
                self.check_model(model)?;
                model.probability(&self.features(snapshot))?
            }
            None => self.rule_probability(snapshot),
        };

        let outcome = rules::evaluate(snapshot, &self.config);
        let probability = (base - outcome.penalty).clamp(0.0, 1.0);
        let category = self.category(probability);
        let confidence_tier = self.confidence(snapshot.hours_elapsed, model.is_some());

        let mut warnings = outcome.warnings;
        let mut recommendations = outcome.recommendations;
        recommendations.extend(rules::closing_recommendations(
            probability,
            category,
            outcome.efficiency_concern,
            &self.config,
        ));

        // Stable sorts keep rule order within a severity.
        warnings.sort_by(|a, b| b.severity.cmp(&a.severity));
        recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));

        metrics::counter!("early_signal.analyses").increment(1);
        metrics::counter!("early_signal.warnings").increment(warnings.len() as u64);

        debug!(
            campaign_id = %snapshot.campaign_id,
            base = base,
            penalty = outcome.penalty,
            probability = probability,
            category = %category,
            warnings = warnings.len(),
            "Early signals analyzed"
        );

        Ok(EarlyPrediction {
            campaign_id: snapshot.campaign_id.clone(),
            success_probability: probability,
            confidence_tier,
            category,
            warnings,
            recommendations,
            model_version: model.and_then(|m| m.version()),
        })
    }

    /// Weighted blend of normalised component scores mapped onto the
    /// configured probability range.
    pub fn rule_probability(&self, snapshot: &EarlyMetricsSnapshot) -> f64 {
        let c = &self.config;
        let [ctr, cvr, cpa, roas, audience] = self.component_scores(snapshot);
        let score = c.weight_ctr * ctr
            + c.weight_cvr * cvr
            + c.weight_cpa * cpa
            + c.weight_roas * roas
            + c.weight_audience * audience;
        (c.baseline_probability + c.probability_spread * score).clamp(0.0, 1.0)
    }

    /// Feature row for the learned model, laid out as [`EARLY_FEATURE_NAMES`].
    pub fn features(&self, snapshot: &EarlyMetricsSnapshot) -> Vec<f64> {
        let mut row = self.component_scores(snapshot).to_vec();
        row.push(snapshot.engagement_velocity.tanh());
        row
    }

    /// Fit the learned early-stage model on finished campaigns. Invalid
    /// snapshots are skipped.
    pub fn train_early_model(
        &self,
        samples: &[LabeledSnapshot],
        cancel: &CancelToken,
    ) -> CampaignResult<TrainedModel> {
        let names = EARLY_FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        let mut set = TrainingSet::new(names);
        let mut skipped = 0usize;
        for sample in samples {
            match sample.snapshot.validate() {
                Ok(()) => set.push(self.features(&sample.snapshot), sample.succeeded)?,
                Err(e) => {
                    warn!(
                        campaign_id = %sample.snapshot.campaign_id,
                        error = %e,
                        "Skipping invalid early snapshot"
                    );
                    skipped += 1;
                }
            }
        }
        if !samples.is_empty() && skipped == samples.len() {
            return Err(CampaignError::validation(format!(
                "all {skipped} early snapshots are invalid"
            )));
        }

        info!(
            samples = samples.len(),
            usable = set.len(),
            skipped = skipped,
            "Training early signal model"
        );
        self.trainer.train(&set, ModelKind::EarlySignal, None, cancel)
    }

    fn component_scores(&self, s: &EarlyMetricsSnapshot) -> [f64; 5] {
        let c = &self.config;
        [
            unit(s.ctr / c.ctr_target),
            unit(s.conversion_rate / c.cvr_target),
            unit(1.0 - s.cpa / c.cpa_ceiling),
            unit(s.roas / c.roas_target),
            unit(s.audience_quality_score / 100.0),
        ]
    }

    fn check_model(&self, model: &TrainedModel) -> CampaignResult<()> {
        model.ensure_kind(ModelKind::EarlySignal)?;
        if model.parameters.feature_names.len() != EARLY_FEATURE_NAMES.len()
            || model
                .parameters
                .feature_names
                .iter()
                .zip(EARLY_FEATURE_NAMES)
                .any(|(a, b)| a != b)
        {
            return Err(CampaignError::validation(
                "early signal model was trained on a different feature layout",
            ));
        }
        Ok(())
    }

    fn category(&self, probability: f64) -> SuccessCategory {
        if probability < self.tiers.low_success_below {
            SuccessCategory::LowSuccess
        } else if probability > self.tiers.high_success_above {
            SuccessCategory::HighSuccess
        } else {
            SuccessCategory::MediumSuccess
        }
    }

    fn confidence(&self, hours_elapsed: f64, learned: bool) -> Tier {
        if learned && hours_elapsed >= self.config.high_confidence_hours {
            Tier::High
        } else if hours_elapsed >= self.config.medium_confidence_hours {
            Tier::Medium
        } else {
            Tier::Low
        }
    }
}

fn unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{AD_FATIGUE, HIGH_CPA, POOR_TARGETING};
    use campaign_classifier::risk_tier;

    fn analyzer() -> EarlySignalAnalyzer {
        EarlySignalAnalyzer::new(
            EarlySignalConfig::default(),
            TierThresholds::default(),
            TrainingConfig::default(),
        )
    }

    fn scenario_a() -> EarlyMetricsSnapshot {
        EarlyMetricsSnapshot {
            campaign_id: "scenario-a".into(),
            hours_elapsed: 24.0,
            ctr: 2.35,
            conversion_rate: 5.01,
            cpa: 34.37,
            roas: 3.97,
            audience_quality_score: 47.56,
            engagement_velocity: -0.12,
        }
    }

    fn scenario_b() -> EarlyMetricsSnapshot {
        EarlyMetricsSnapshot {
            campaign_id: "scenario-b".into(),
            hours_elapsed: 24.0,
            ctr: 0.83,
            conversion_rate: 2.64,
            cpa: 276.11,
            roas: 1.24,
            audience_quality_score: 22.92,
            engagement_velocity: 0.04,
        }
    }

    #[test]
    fn scenario_a_medium_success_with_fatigue() {
        let result = analyzer().analyze(&scenario_a(), None).unwrap();

        assert_eq!(result.category, SuccessCategory::MediumSuccess);
        assert!(
            (0.64..=0.65).contains(&result.success_probability),
            "probability {}",
            result.success_probability
        );
        let high: Vec<_> = result
            .warnings
            .iter()
            .filter(|w| w.severity == Tier::High)
            .collect();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].code, AD_FATIGUE);
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.priority == Tier::Low && r.code == "maintain_settings"));
        assert_eq!(result.model_version, None);
        assert_eq!(result.confidence_tier, Tier::Medium);
    }

    #[test]
    fn scenario_b_low_success_with_several_warnings() {
        let result = analyzer().analyze(&scenario_b(), None).unwrap();

        assert_eq!(result.category, SuccessCategory::LowSuccess);
        assert!(
            (0.29..=0.30).contains(&result.success_probability),
            "probability {}",
            result.success_probability
        );
        assert!(result.warnings.len() >= 3);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.code == POOR_TARGETING && w.severity == Tier::High));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.code == HIGH_CPA && w.severity == Tier::Medium));
        assert!(result.has_warning(rules::LOW_CTR));
        assert!(result.recommendations.iter().any(|r| r.code == "consider_pausing"));
        assert!(!result.recommendations.iter().any(|r| r.code == "maintain_settings"));
    }

    #[test]
    fn output_is_sorted_by_severity() {
        let result = analyzer().analyze(&scenario_b(), None).unwrap();
        assert!(result
            .warnings
            .windows(2)
            .all(|w| w[0].severity >= w[1].severity));
        assert!(result
            .recommendations
            .windows(2)
            .all(|r| r[0].priority >= r[1].priority));
        // Within MEDIUM, the CPA rule is evaluated before the ROAS rule.
        let medium: Vec<&str> = result
            .warnings
            .iter()
            .filter(|w| w.severity == Tier::Medium)
            .map(|w| w.code.as_str())
            .collect();
        assert_eq!(medium, [HIGH_CPA, rules::LOW_ROAS]);
    }

    #[test]
    fn category_boundaries_agree_with_risk_tiers() {
        let a = analyzer();
        let tiers = TierThresholds::default();
        for p in [0.0, 0.399, 0.4, 0.55, 0.7, 0.701, 1.0] {
            let expected = match risk_tier(p, &tiers) {
                Tier::High => SuccessCategory::LowSuccess,
                Tier::Medium => SuccessCategory::MediumSuccess,
                Tier::Low => SuccessCategory::HighSuccess,
            };
            assert_eq!(a.category(p), expected, "p = {p}");
        }
        assert_eq!(a.category(0.7), SuccessCategory::MediumSuccess);
    }

    #[test]
    fn confidence_grows_with_elapsed_time() {
        let a = analyzer();
        let early = EarlyMetricsSnapshot {
            hours_elapsed: 6.0,
            ..scenario_a()
        };
        assert_eq!(a.analyze(&early, None).unwrap().confidence_tier, Tier::Low);
        let later = EarlyMetricsSnapshot {
            hours_elapsed: 72.0,
            ..scenario_a()
        };
        // Without a learned model confidence stops at MEDIUM.
        assert_eq!(a.analyze(&later, None).unwrap().confidence_tier, Tier::Medium);
    }

    #[test]
    fn rejects_out_of_range_metrics() {
        let a = analyzer();
        let bad = [
            EarlyMetricsSnapshot { hours_elapsed: 0.0, ..scenario_a() },
            EarlyMetricsSnapshot { ctr: 120.0, ..scenario_a() },
            EarlyMetricsSnapshot { cpa: -1.0, ..scenario_a() },
            EarlyMetricsSnapshot { audience_quality_score: 101.0, ..scenario_a() },
            EarlyMetricsSnapshot { roas: f64::NAN, ..scenario_a() },
        ];
        for snapshot in &bad {
            let err = a.analyze(snapshot, None).unwrap_err();
            assert!(matches!(err, CampaignError::Validation(_)), "{snapshot:?}");
        }
    }

    fn labeled_history(n: usize) -> Vec<LabeledSnapshot> {
        (0..n)
            .map(|i| {
                let good = i % 2 == 0;
                let jitter = (i % 5) as f64 * 0.1;
                LabeledSnapshot {
                    snapshot: EarlyMetricsSnapshot {
                        campaign_id: format!("hist-{i}"),
                        hours_elapsed: 48.0,
                        ctr: if good { 3.0 } else { 0.8 } + jitter,
                        conversion_rate: if good { 6.0 } else { 2.0 } + jitter,
                        cpa: if good { 40.0 } else { 180.0 } + jitter,
                        roas: if good { 4.0 } else { 1.1 } + jitter,
                        audience_quality_score: if good { 70.0 } else { 25.0 } + jitter,
                        engagement_velocity: if good { 0.2 } else { -0.1 },
                    },
                    succeeded: good,
                }
            })
            .collect()
    }

    #[test]
    fn learned_model_drives_probability_and_confidence() {
        let a = analyzer();
        let model = a
            .train_early_model(&labeled_history(60), &CancelToken::new())
            .unwrap();
        assert_eq!(model.kind(), ModelKind::EarlySignal);
        assert_eq!(model.metadata.encoding_version, None);

        let strong = EarlyMetricsSnapshot {
            hours_elapsed: 48.0,
            engagement_velocity: 0.2,
            ..scenario_a()
        };
        let result = a.analyze(&strong, Some(&model)).unwrap();
        assert_eq!(result.confidence_tier, Tier::High);
        assert!(result.success_probability > 0.5);
    }

    #[test]
    fn campaign_success_model_is_rejected() {
        let a = analyzer();
        let mut model = a
            .train_early_model(&labeled_history(60), &CancelToken::new())
            .unwrap();
        model.metadata.kind = ModelKind::CampaignSuccess;
        assert!(matches!(
            a.analyze(&scenario_a(), Some(&model)).unwrap_err(),
            CampaignError::Validation(_)
        ));
    }

    #[test]
    fn snapshot_json_round_trips_with_label() {
        let json = r#"{
            "campaign_id": "c-9", "hours_elapsed": 36, "ctr": 1.5,
            "conversion_rate": 3.0, "cpa": 55.0, "roas": 2.5,
            "audience_quality_score": 60, "engagement_velocity": 0.0,
            "succeeded": true
        }"#;
        let labeled: LabeledSnapshot = serde_json::from_str(json).unwrap();
        assert!(labeled.succeeded);
        assert_eq!(labeled.snapshot.hours_elapsed, 36.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_snapshot() -> impl Strategy<Value = EarlyMetricsSnapshot> {
        (
            0.1f64..500.0,
            0.0f64..=100.0,
            0.0f64..=100.0,
            0.0f64..1_000.0,
            0.0f64..20.0,
            0.0f64..=100.0,
            -5.0f64..5.0,
        )
            .prop_map(|(hours, ctr, cvr, cpa, roas, quality, velocity)| EarlyMetricsSnapshot {
                campaign_id: "prop".into(),
                hours_elapsed: hours,
                ctr,
                conversion_rate: cvr,
                cpa,
                roas,
                audience_quality_score: quality,
                engagement_velocity: velocity,
            })
    }

    proptest! {
        #[test]
        fn probability_stays_in_unit_interval(snapshot in arb_snapshot()) {
            let analyzer = EarlySignalAnalyzer::new(
                EarlySignalConfig::default(),
                TierThresholds::default(),
                TrainingConfig::default(),
            );
            let result = analyzer.analyze(&snapshot, None).unwrap();
            prop_assert!((0.0..=1.0).contains(&result.success_probability));
        }
    }
}
