use crate::types::EncodingVersion;
use serde::Deserialize;

/// Root configuration. Loaded from environment variables with the prefix
/// `CAMPAIGN_PREDICT__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub tiers: TierThresholds,
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub early_signal: EarlySignalConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Directory holding one artifact per model version.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_channel_vocabulary")]
    pub channel_vocabulary: Vec<String>,
    #[serde(default)]
    pub encoding_version: EncodingVersion,
    /// Upper edges of the budget buckets; a budget above the last edge lands
    /// in the final bucket.
    #[serde(default = "default_budget_bucket_edges")]
    pub budget_bucket_edges: Vec<f64>,
    #[serde(default = "default_duration_bucket_edges")]
    pub duration_bucket_edges: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_l2_penalty")]
    pub l2_penalty: f64,
}

/// Probability cut-offs shared by success categories and risk tiers.
#[derive(Debug, Clone, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "default_low_success_below")]
    pub low_success_below: f64,
    #[serde(default = "default_high_success_above")]
    pub high_success_above: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionConfig {
    #[serde(default = "default_stable_cv_std")]
    pub stable_cv_std: f64,
    #[serde(default = "default_moderate_cv_std")]
    pub moderate_cv_std: f64,
    #[serde(default = "default_strong_margin")]
    pub strong_margin: f64,
    #[serde(default = "default_partial_margin")]
    pub partial_margin: f64,
    #[serde(default = "default_top_factors")]
    pub top_factors: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EarlySignalConfig {
    // Rule-only estimator: component targets.
    #[serde(default = "default_ctr_target")]
    pub ctr_target: f64,
    #[serde(default = "default_cvr_target")]
    pub cvr_target: f64,
    #[serde(default = "default_cpa_ceiling")]
    pub cpa_ceiling: f64,
    #[serde(default = "default_roas_target")]
    pub roas_target: f64,

    // Rule-only estimator: component weights (sum to 1).
    #[serde(default = "default_weight_ctr")]
    pub weight_ctr: f64,
    #[serde(default = "default_weight_cvr")]
    pub weight_cvr: f64,
    #[serde(default = "default_weight_cpa")]
    pub weight_cpa: f64,
    #[serde(default = "default_weight_roas")]
    pub weight_roas: f64,
    #[serde(default = "default_weight_audience")]
    pub weight_audience: f64,

    #[serde(default = "default_baseline_probability")]
    pub baseline_probability: f64,
    #[serde(default = "default_probability_spread")]
    pub probability_spread: f64,

    // Warning thresholds.
    #[serde(default = "default_cpa_threshold")]
    pub cpa_threshold: f64,
    #[serde(default = "default_audience_quality_threshold")]
    pub audience_quality_threshold: f64,
    #[serde(default = "default_roas_floor")]
    pub roas_floor: f64,
    #[serde(default = "default_ctr_floor")]
    pub ctr_floor: f64,

    // Probability adjustments applied when a rule fires.
    #[serde(default = "default_fatigue_adjustment")]
    pub fatigue_adjustment: f64,
    #[serde(default = "default_targeting_adjustment")]
    pub targeting_adjustment: f64,
    #[serde(default = "default_cpa_adjustment")]
    pub cpa_adjustment: f64,
    #[serde(default = "default_roas_adjustment")]
    pub roas_adjustment: f64,
    #[serde(default = "default_ctr_adjustment")]
    pub ctr_adjustment: f64,

    #[serde(default = "default_satisfactory_probability")]
    pub satisfactory_probability: f64,
    #[serde(default = "default_medium_confidence_hours")]
    pub medium_confidence_hours: f64,
    #[serde(default = "default_high_confidence_hours")]
    pub high_confidence_hours: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    /// Spend ceiling contributed by each historical campaign on a channel.
    #[serde(default = "default_volume_cap_per_campaign")]
    pub volume_cap_per_campaign: f64,
    #[serde(default = "default_saturation_warning_ratio")]
    pub saturation_warning_ratio: f64,
    #[serde(default = "default_price_iterations")]
    pub price_iterations: usize,
    #[serde(default = "default_spend_iterations")]
    pub spend_iterations: usize,
}

// Default functions
fn default_instance_id() -> String {
    "predict-01".to_string()
}

fn default_artifact_dir() -> String {
    "./model-artifacts".to_string()
}

fn default_channel_vocabulary() -> Vec<String> {
    [
        "display", "email", "google", "linkedin", "meta", "snapchat", "tiktok", "youtube",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

fn default_budget_bucket_edges() -> Vec<f64> {
    vec![5_000.0, 25_000.0, 100_000.0, 500_000.0]
}

fn default_duration_bucket_edges() -> Vec<f64> {
    vec![7.0, 14.0, 30.0, 60.0]
}

fn default_min_samples() -> usize {
    30
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_cv_folds() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_learning_rate() -> f64 {
    0.5
}

fn default_epochs() -> usize {
    800
}

fn default_l2_penalty() -> f64 {
    0.001
}

fn default_low_success_below() -> f64 {
    0.4
}

fn default_high_success_above() -> f64 {
    0.7
}

fn default_stable_cv_std() -> f64 {
    0.05
}

fn default_moderate_cv_std() -> f64 {
    0.10
}

fn default_strong_margin() -> f64 {
    0.25
}

fn default_partial_margin() -> f64 {
    0.10
}

fn default_top_factors() -> usize {
    5
}

fn default_volume_cap_per_campaign() -> f64 {
    50_000.0
}

fn default_saturation_warning_ratio() -> f64 {
    0.9
}

fn default_price_iterations() -> usize {
    200
}

fn default_spend_iterations() -> usize {
    100
}

fn default_ctr_target() -> f64 {
    4.0
}

fn default_cvr_target() -> f64 {
    8.0
}

fn default_cpa_ceiling() -> f64 {
    200.0
}

fn default_roas_target() -> f64 {
    5.0
}

fn default_weight_ctr() -> f64 {
    0.20
}

fn default_weight_cvr() -> f64 {
    0.20
}

fn default_weight_cpa() -> f64 {
    0.15
}

fn default_weight_roas() -> f64 {
    0.30
}

fn default_weight_audience() -> f64 {
    0.15
}

fn default_baseline_probability() -> f64 {
    0.25
}

fn default_probability_spread() -> f64 {
    0.63
}

fn default_cpa_threshold() -> f64 {
    100.0
}

fn default_audience_quality_threshold() -> f64 {
    30.0
}

fn default_roas_floor() -> f64 {
    1.5
}

fn default_ctr_floor() -> f64 {
    1.0
}

fn default_fatigue_adjustment() -> f64 {
    0.03
}

fn default_targeting_adjustment() -> f64 {
    0.03
}

fn default_cpa_adjustment() -> f64 {
    0.03
}

fn default_roas_adjustment() -> f64 {
    0.02
}

fn default_ctr_adjustment() -> f64 {
    0.01
}

fn default_satisfactory_probability() -> f64 {
    0.6
}

fn default_medium_confidence_hours() -> f64 {
    24.0
}

fn default_high_confidence_hours() -> f64 {
    48.0
}


impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            channel_vocabulary: default_channel_vocabulary(),
            encoding_version: EncodingVersion::default(),
            budget_bucket_edges: default_budget_bucket_edges(),
            duration_bucket_edges: default_duration_bucket_edges(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            test_fraction: default_test_fraction(),
            cv_folds: default_cv_folds(),
            seed: default_seed(),
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
            l2_penalty: default_l2_penalty(),
        }
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            low_success_below: default_low_success_below(),
            high_success_above: default_high_success_above(),
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            stable_cv_std: default_stable_cv_std(),
            moderate_cv_std: default_moderate_cv_std(),
            strong_margin: default_strong_margin(),
            partial_margin: default_partial_margin(),
            top_factors: default_top_factors(),
        }
    }
}

impl Default for EarlySignalConfig {
    fn default() -> Self {
        Self {
            ctr_target: default_ctr_target(),
            cvr_target: default_cvr_target(),
            cpa_ceiling: default_cpa_ceiling(),
            roas_target: default_roas_target(),
            weight_ctr: default_weight_ctr(),
            weight_cvr: default_weight_cvr(),
            weight_cpa: default_weight_cpa(),
            weight_roas: default_weight_roas(),
            weight_audience: default_weight_audience(),
            baseline_probability: default_baseline_probability(),
            probability_spread: default_probability_spread(),
            cpa_threshold: default_cpa_threshold(),
            audience_quality_threshold: default_audience_quality_threshold(),
            roas_floor: default_roas_floor(),
            ctr_floor: default_ctr_floor(),
            fatigue_adjustment: default_fatigue_adjustment(),
            targeting_adjustment: default_targeting_adjustment(),
            cpa_adjustment: default_cpa_adjustment(),
            roas_adjustment: default_roas_adjustment(),
            ctr_adjustment: default_ctr_adjustment(),
            satisfactory_probability: default_satisfactory_probability(),
            medium_confidence_hours: default_medium_confidence_hours(),
            high_confidence_hours: default_high_confidence_hours(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            volume_cap_per_campaign: default_volume_cap_per_campaign(),
            saturation_warning_ratio: default_saturation_warning_ratio(),
            price_iterations: default_price_iterations(),
            spend_iterations: default_spend_iterations(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            registry: RegistryConfig::default(),
            features: FeatureConfig::default(),
            training: TrainingConfig::default(),
            tiers: TierThresholds::default(),
            prediction: PredictionConfig::default(),
            early_signal: EarlySignalConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file overlaid with
    /// environment variables.
    pub fn load(config_file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("CAMPAIGN_PREDICT")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("features.channel_vocabulary")
                    .with_list_parse_key("features.budget_bucket_edges")
                    .with_list_parse_key("features.duration_bucket_edges"),
            )
            .build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = AppConfig::default();
        assert!(config.tiers.low_success_below < config.tiers.high_success_above);
        assert!(config.prediction.stable_cv_std < config.prediction.moderate_cv_std);
        assert!(config.prediction.partial_margin < config.prediction.strong_margin);

        let es = &config.early_signal;
        let weights =
            es.weight_ctr + es.weight_cvr + es.weight_cpa + es.weight_roas + es.weight_audience;
        assert!((weights - 1.0).abs() < 1e-9);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "early_signal": { "cpa_threshold": 80.0 }, "training": { "cv_folds": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.early_signal.cpa_threshold, 80.0);
        assert_eq!(config.early_signal.audience_quality_threshold, 30.0);
        assert_eq!(config.training.cv_folds, 3);
        assert_eq!(config.training.min_samples, 30);
        assert_eq!(config.features.channel_vocabulary.len(), 8);
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predict.toml");
        std::fs::write(
            &path,
            "instance_id = \"predict-test\"\n\n[optimizer]\nvolume_cap_per_campaign = 20000.0\n\n[features]\nencoding_version = \"v2\"\n",
        )
        .unwrap();

        let config = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(config.instance_id, "predict-test");
        assert_eq!(config.optimizer.volume_cap_per_campaign, 20_000.0);
        assert_eq!(config.features.encoding_version, EncodingVersion::V2);
        assert_eq!(config.optimizer.saturation_warning_ratio, 0.9);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(AppConfig::load(Some("/nonexistent/campaign-predict.toml")).is_err());
    }
}
