//! Threshold rules over early campaign telemetry. Each rule that fires
//! emits a warning, a matching recommendation and a probability penalty.

use crate::types::{EarlyMetricsSnapshot, Recommendation, SignalWarning, SuccessCategory};
use campaign_core::config::EarlySignalConfig;
use campaign_core::types::Tier;

pub const AD_FATIGUE: &str = "ad_fatigue";
pub const POOR_TARGETING: &str = "poor_targeting";
pub const HIGH_CPA: &str = "cpa_above_threshold";
pub const LOW_ROAS: &str = "roas_below_target";
pub const LOW_CTR: &str = "ctr_below_benchmark";

/// Fired rules in evaluation order, plus the summed penalty.
#[derive(Debug, Default)]
pub(crate) struct RuleOutcome {
    pub warnings: Vec<SignalWarning>,
    pub recommendations: Vec<Recommendation>,
    pub penalty: f64,
    /// A cost or return rule fired.
    pub efficiency_concern: bool,
}

impl RuleOutcome {
    fn fire(
        &mut self,
        severity: Tier,
        code: &str,
        message: String,
        penalty: f64,
        recommendation: (Tier, &str, &str),
    ) {
        self.warnings.push(SignalWarning {
            severity,
            code: code.to_string(),
            message,
        });
        self.recommendations.push(Recommendation {
            priority: recommendation.0,
            code: recommendation.1.to_string(),
            message: recommendation.2.to_string(),
        });
        self.penalty += penalty;
    }
}

pub(crate) fn evaluate(snapshot: &EarlyMetricsSnapshot, config: &EarlySignalConfig) -> RuleOutcome {
    let mut out = RuleOutcome::default();

    if snapshot.engagement_velocity < 0.0 {
        out.fire(
            Tier::High,
            AD_FATIGUE,
            format!(
                "Engagement is declining (velocity {:.3}); likely ad fatigue",
                snapshot.engagement_velocity
            ),
            config.fatigue_adjustment,
            (
                Tier::High,
                "rotate_creative",
                "Rotate in fresh creative to recover engagement",
            ),
        );
    }

    if snapshot.audience_quality_score < config.audience_quality_threshold {
        out.fire(
            Tier::High,
            POOR_TARGETING,
            format!(
                "Audience quality {:.1} is below {:.0}; poor targeting",
                snapshot.audience_quality_score, config.audience_quality_threshold
            ),
            config.targeting_adjustment,
            (
                Tier::High,
                "narrow_targeting",
                "Narrow audience targeting toward higher-quality segments",
            ),
        );
    }

    if snapshot.cpa > config.cpa_threshold {
        out.efficiency_concern = true;
        out.fire(
            Tier::Medium,
            HIGH_CPA,
            format!(
                "CPA ${:.2} above threshold ${:.2}",
                snapshot.cpa, config.cpa_threshold
            ),
            config.cpa_adjustment,
            (
                Tier::Medium,
                "review_bids",
                "Review bid strategy and conversion funnel to bring CPA down",
            ),
        );
    }

    if snapshot.roas < config.roas_floor {
        out.efficiency_concern = true;
        out.fire(
            Tier::Medium,
            LOW_ROAS,
            format!(
                "ROAS {:.2} below target {:.2}",
                snapshot.roas, config.roas_floor
            ),
            config.roas_adjustment,
            (
                Tier::Medium,
                "shift_budget",
                "Shift budget toward better-returning placements",
            ),
        );
    }

    if snapshot.ctr < config.ctr_floor {
        out.fire(
            Tier::Low,
            LOW_CTR,
            format!(
                "CTR {:.2}% below benchmark {:.2}%",
                snapshot.ctr, config.ctr_floor
            ),
            config.ctr_adjustment,
            (
                Tier::Low,
                "refresh_copy",
                "Refresh ad copy and calls to action",
            ),
        );
    }

    out
}

/// Recommendations that depend on the final probability rather than on a
/// single metric.
pub(crate) fn closing_recommendations(
    probability: f64,
    category: SuccessCategory,
    efficiency_concern: bool,
    config: &EarlySignalConfig,
) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    if probability >= config.satisfactory_probability && !efficiency_concern {
        recs.push(Recommendation {
            priority: Tier::Low,
            code: "maintain_settings".to_string(),
            message: "Performance is on track; maintain current settings".to_string(),
        });
    }
    if category == SuccessCategory::LowSuccess {
        recs.push(Recommendation {
            priority: Tier::High,
            code: "consider_pausing".to_string(),
            message: "Consider pausing the campaign and re-planning before spending further"
                .to_string(),
        });
    }
    recs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> EarlyMetricsSnapshot {
        EarlyMetricsSnapshot {
            campaign_id: "c-1".into(),
            hours_elapsed: 24.0,
            ctr: 3.0,
            conversion_rate: 6.0,
            cpa: 40.0,
            roas: 4.0,
            audience_quality_score: 70.0,
            engagement_velocity: 0.1,
        }
    }

    #[test]
    fn healthy_snapshot_fires_nothing() {
        let out = evaluate(&healthy(), &EarlySignalConfig::default());
        assert!(out.warnings.is_empty());
        assert!(out.recommendations.is_empty());
        assert_eq!(out.penalty, 0.0);
    }

    #[test]
    fn rules_fire_in_order_and_accumulate_penalty() {
        let snapshot = EarlyMetricsSnapshot {
            engagement_velocity: -0.2,
            audience_quality_score: 10.0,
            cpa: 150.0,
            roas: 1.0,
            ctr: 0.5,
            ..healthy()
        };
        let out = evaluate(&snapshot, &EarlySignalConfig::default());
        let codes: Vec<&str> = out.warnings.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes, [AD_FATIGUE, POOR_TARGETING, HIGH_CPA, LOW_ROAS, LOW_CTR]);
        assert!((out.penalty - 0.12).abs() < 1e-12);
        assert!(out.efficiency_concern);
    }

    #[test]
    fn thresholds_are_strict() {
        let config = EarlySignalConfig::default();
        let snapshot = EarlyMetricsSnapshot {
            cpa: config.cpa_threshold,
            audience_quality_score: config.audience_quality_threshold,
            engagement_velocity: 0.0,
            ..healthy()
        };
        assert!(evaluate(&snapshot, &config).warnings.is_empty());
    }

    #[test]
    fn affirming_recommendation_needs_no_cost_concern() {
        let config = EarlySignalConfig::default();
        let recs = closing_recommendations(0.65, SuccessCategory::MediumSuccess, false, &config);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].priority, Tier::Low);

        assert!(closing_recommendations(0.65, SuccessCategory::MediumSuccess, true, &config)
            .is_empty());

        let recs = closing_recommendations(0.2, SuccessCategory::LowSuccess, true, &config);
        assert_eq!(recs[0].code, "consider_pausing");
    }
}
