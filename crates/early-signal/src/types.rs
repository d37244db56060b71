use campaign_core::types::Tier;
use campaign_core::{CampaignError, CampaignResult, ModelVersion};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metrics observed in the first hours of a live campaign. Rates are
/// percentages (`2.35` means 2.35%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyMetricsSnapshot {
    pub campaign_id: String,
    pub hours_elapsed: f64,
    pub ctr: f64,
    pub conversion_rate: f64,
    pub cpa: f64,
    pub roas: f64,
    pub audience_quality_score: f64,
    /// Change in engagement rate; negative means interaction is decaying.
    pub engagement_velocity: f64,
}

impl EarlyMetricsSnapshot {
    pub fn validate(&self) -> CampaignResult<()> {
        let fields = [
            ("hours_elapsed", self.hours_elapsed),
            ("ctr", self.ctr),
            ("conversion_rate", self.conversion_rate),
            ("cpa", self.cpa),
            ("roas", self.roas),
            ("audience_quality_score", self.audience_quality_score),
            ("engagement_velocity", self.engagement_velocity),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(CampaignError::validation(format!(
                "{name} must be finite, got {value}"
            )));
        }
        if self.hours_elapsed <= 0.0 {
            return Err(CampaignError::validation(format!(
                "hours_elapsed must be positive, got {}",
                self.hours_elapsed
            )));
        }
        for (name, value) in [("ctr", self.ctr), ("conversion_rate", self.conversion_rate)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(CampaignError::validation(format!(
                    "{name} is a percentage in [0, 100], got {value}"
                )));
            }
        }
        for (name, value) in [("cpa", self.cpa), ("roas", self.roas)] {
            if value < 0.0 {
                return Err(CampaignError::validation(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.audience_quality_score) {
            return Err(CampaignError::validation(format!(
                "audience_quality_score must be within [0, 100], got {}",
                self.audience_quality_score
            )));
        }
        Ok(())
    }
}

/// A finished campaign's early snapshot together with how it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSnapshot {
    #[serde(flatten)]
    pub snapshot: EarlyMetricsSnapshot,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessCategory {
    LowSuccess,
    MediumSuccess,
    HighSuccess,
}

impl fmt::Display for SuccessCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuccessCategory::LowSuccess => write!(f, "LOW_SUCCESS"),
            SuccessCategory::MediumSuccess => write!(f, "MEDIUM_SUCCESS"),
            SuccessCategory::HighSuccess => write!(f, "HIGH_SUCCESS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalWarning {
    pub severity: Tier,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Tier,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyPrediction {
    pub campaign_id: String,
    pub success_probability: f64,
    pub confidence_tier: Tier,
    pub category: SuccessCategory,
    /// Most severe first.
    pub warnings: Vec<SignalWarning>,
    /// Highest priority first.
    pub recommendations: Vec<Recommendation>,
    /// `None` when the rule-only estimator produced the base probability.
    pub model_version: Option<ModelVersion>,
}

impl EarlyPrediction {
    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }
}
