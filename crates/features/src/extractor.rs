//! Campaign feature extraction: turns a validated [`CampaignRecord`] into a
//! fixed-layout numeric [`FeatureVector`].
//!
//! Layout (V1), for a vocabulary of `n` channels:
//!   [0]               : budget bucket (ordinal, scaled to [0, 1])
//!   [1]               : duration bucket (ordinal, scaled to [0, 1])
//!   [2]               : channel count / vocabulary size (capped at 1)
//!   [3 .. 3+n]        : channel multi-hot, vocabulary in sorted order
//!   [3+n]             : `channel:other` (any channel outside the vocabulary)
//!   next 7            : creative type one-hot
//!   next 7            : objective one-hot
//!
//! V2 appends log-scaled budget, duration and daily budget.

use campaign_core::config::FeatureConfig;
use campaign_core::types::{
    normalize_channel, CampaignRecord, CreativeType, EncodingVersion, FeatureVector, Objective,
};
use campaign_core::{CampaignError, CampaignResult};
use std::collections::BTreeSet;
use tracing::debug;

pub const OTHER_CHANNEL: &str = "other";

const LOG_BUDGET_SCALE: f64 = 10_000_000.0;
const LOG_DURATION_SCALE: f64 = 365.0;
const LOG_DAILY_BUDGET_SCALE: f64 = 1_000_000.0;

/// Pure, deterministic feature extractor. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    vocabulary: Vec<String>,
    budget_edges: Vec<f64>,
    duration_edges: Vec<f64>,
    default_version: EncodingVersion,
}

impl FeatureExtractor {
    pub fn new(config: &FeatureConfig) -> CampaignResult<Self> {
        validate_edges("budget_bucket_edges", &config.budget_bucket_edges)?;
        validate_edges("duration_bucket_edges", &config.duration_bucket_edges)?;

        let vocabulary: BTreeSet<String> = config
            .channel_vocabulary
            .iter()
            .map(|c| normalize_channel(c))
            .filter(|c| !c.is_empty() && c != OTHER_CHANNEL)
            .collect();

        debug!(
            channels = vocabulary.len(),
            version = ?config.encoding_version,
            "Feature extractor configured"
        );

        Ok(Self {
            vocabulary: vocabulary.into_iter().collect(),
            budget_edges: config.budget_bucket_edges.clone(),
            duration_edges: config.duration_bucket_edges.clone(),
            default_version: config.encoding_version,
        })
    }

    pub fn default_version(&self) -> EncodingVersion {
        self.default_version
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Feature names in vector order for `version`.
    pub fn feature_names(&self, version: EncodingVersion) -> Vec<String> {
        let mut names = vec![
            "budget_bucket".to_string(),
            "duration_bucket".to_string(),
            "channel_count".to_string(),
        ];
        names.extend(self.vocabulary.iter().map(|c| format!("channel:{c}")));
        names.push(format!("channel:{OTHER_CHANNEL}"));
        names.extend(
            CreativeType::ALL
                .iter()
                .map(|c| format!("creative:{}", c.as_str())),
        );
        names.extend(
            Objective::ALL
                .iter()
                .map(|o| format!("objective:{}", o.as_str())),
        );
        if version == EncodingVersion::V2 {
            names.push("log_budget".to_string());
            names.push("log_duration".to_string());
            names.push("log_daily_budget".to_string());
        }
        names
    }

    pub fn extract(
        &self,
        record: &CampaignRecord,
        version: EncodingVersion,
    ) -> CampaignResult<FeatureVector> {
        record.validate()?;

        let feature_names = self.feature_names(version);
        let mut values = Vec::with_capacity(feature_names.len());

        values.push(bucket_value(record.budget, &self.budget_edges));
        values.push(bucket_value(record.duration_days as f64, &self.duration_edges));
        values.push(
            (record.channels.len() as f64 / self.vocabulary.len().max(1) as f64).min(1.0),
        );

        let mut other = 0.0;
        let mut channel_hot = vec![0.0; self.vocabulary.len()];
        for channel in &record.channels {
            match self.vocabulary.binary_search(channel) {
                Ok(idx) => channel_hot[idx] = 1.0,
                Err(_) => other = 1.0,
            }
        }
        values.extend(channel_hot);
        values.push(other);

        values.extend(
            CreativeType::ALL
                .iter()
                .map(|c| if *c == record.creative_type { 1.0 } else { 0.0 }),
        );
        values.extend(
            Objective::ALL
                .iter()
                .map(|o| if *o == record.objective { 1.0 } else { 0.0 }),
        );

        if version == EncodingVersion::V2 {
            values.push(log_scaled(record.budget, LOG_BUDGET_SCALE));
            values.push(log_scaled(record.duration_days as f64, LOG_DURATION_SCALE));
            values.push(log_scaled(record.daily_budget(), LOG_DAILY_BUDGET_SCALE));
        }

        debug_assert_eq!(values.len(), feature_names.len());

        Ok(FeatureVector {
            encoding_version: version,
            feature_names,
            values,
        })
    }

    /// Extract every record independently; one bad record does not fail the
    /// others.
    pub fn extract_batch(
        &self,
        records: &[CampaignRecord],
        version: EncodingVersion,
    ) -> Vec<CampaignResult<FeatureVector>> {
        records.iter().map(|r| self.extract(r, version)).collect()
    }
}

fn validate_edges(name: &str, edges: &[f64]) -> CampaignResult<()> {
    if edges.is_empty() {
        return Err(CampaignError::Config(format!("{name} must not be empty")));
    }
    if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(CampaignError::Config(format!(
            "{name} must be finite and strictly increasing"
        )));
    }
    Ok(())
}

/// Ordinal bucket index scaled so the top bucket maps to 1.0.
fn bucket_value(value: f64, edges: &[f64]) -> f64 {
    let bucket = edges.iter().take_while(|&&edge| value > edge).count();
    bucket as f64 / edges.len() as f64
}

fn log_scaled(value: f64, scale: f64) -> f64 {
    ((1.0 + value.max(0.0)).ln() / (1.0 + scale).ln()).min(1.0)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_record() -> impl Strategy<Value = CampaignRecord> {
        (
            1.0f64..5_000_000.0,
            1u32..400,
            prop::collection::vec(
                prop::sample::select(vec!["meta", "google", "tiktok", "radio", "podcast"]),
                1..4,
            ),
            prop::sample::select(CreativeType::ALL.to_vec()),
            prop::sample::select(Objective::ALL.to_vec()),
        )
            .prop_map(|(budget, days, channels, creative, objective)| {
                CampaignRecord::new(budget, days, &channels, creative, objective).unwrap()
            })
    }

    proptest! {
        #[test]
        fn extraction_is_deterministic(record in arb_record(), v2 in any::<bool>()) {
            let version = if v2 { EncodingVersion::V2 } else { EncodingVersion::V1 };
            let ex = FeatureExtractor::new(&FeatureConfig::default()).unwrap();
            let first = ex.extract(&record, version).unwrap();
            let second = ex.extract(&record.clone(), version).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn values_stay_in_unit_interval(record in arb_record()) {
            let ex = FeatureExtractor::new(&FeatureConfig::default()).unwrap();
            let fv = ex.extract(&record, EncodingVersion::V2).unwrap();
            prop_assert!(fv.values.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }
}
