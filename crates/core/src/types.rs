use crate::error::{CampaignError, CampaignResult};
use crate::model::ModelVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ─── Campaign Records ───────────────────────────────────────────────────────

/// A campaign as supplied by the upstream application. Historical records
/// carry an `outcome_label`; records submitted for prediction do not.
///
/// Deserialization goes through [`CampaignRecordInput`], so a record that
/// decodes successfully has already passed [`CampaignRecord::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CampaignRecordInput")]
pub struct CampaignRecord {
    pub id: Option<String>,
    pub budget: f64,
    pub duration_days: u32,
    pub channels: BTreeSet<String>,
    pub creative_type: CreativeType,
    pub objective: Objective,
    pub outcome_label: Option<bool>,
}

/// Loosely-typed wire form of a campaign record; every field optional so
/// that missing data is reported by name instead of as a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignRecordInput {
    pub id: Option<String>,
    pub budget: Option<f64>,
    pub duration_days: Option<i64>,
    pub channels: Option<Vec<String>>,
    pub creative_type: Option<String>,
    pub objective: Option<String>,
    pub outcome_label: Option<bool>,
}

impl CampaignRecord {
    pub fn new(
        budget: f64,
        duration_days: u32,
        channels: &[&str],
        creative_type: CreativeType,
        objective: Objective,
    ) -> CampaignResult<Self> {
        let record = Self {
            id: None,
            budget,
            duration_days,
            channels: channels.iter().map(|c| normalize_channel(c)).collect(),
            creative_type,
            objective,
            outcome_label: None,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_outcome(mut self, succeeded: bool) -> Self {
        self.outcome_label = Some(succeeded);
        self
    }

    pub fn validate(&self) -> CampaignResult<()> {
        if !self.budget.is_finite() || self.budget <= 0.0 {
            return Err(CampaignError::validation(format!(
                "budget must be a positive amount, got {}",
                self.budget
            )));
        }
        if self.duration_days == 0 {
            return Err(CampaignError::validation(
                "duration_days must be at least 1",
            ));
        }
        if self.channels.is_empty() {
            return Err(CampaignError::validation(
                "campaign must run on at least one channel",
            ));
        }
        if self.channels.iter().any(|c| c.is_empty()) {
            return Err(CampaignError::validation("channel identifiers must not be blank"));
        }
        Ok(())
    }

    pub fn daily_budget(&self) -> f64 {
        self.budget / self.duration_days.max(1) as f64
    }

    /// Decode a JSON array of records element by element. A malformed
    /// element becomes its own `Validation` error at its index; only input
    /// that is not an array fails outright.
    pub fn decode_batch(value: serde_json::Value) -> CampaignResult<Vec<CampaignResult<Self>>> {
        let serde_json::Value::Array(items) = value else {
            return Err(CampaignError::validation(
                "expected a JSON array of campaign records",
            ));
        };
        Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value::<CampaignRecordInput>(item)
                    .map_err(|e| CampaignError::validation(format!("record {i}: {e}")))
                    .and_then(CampaignRecord::try_from)
            })
            .collect())
    }
}

impl TryFrom<CampaignRecordInput> for CampaignRecord {
    type Error = CampaignError;

    fn try_from(input: CampaignRecordInput) -> Result<Self, Self::Error> {
        let budget = input
            .budget
            .ok_or_else(|| CampaignError::validation("missing field: budget"))?;
        let duration = input
            .duration_days
            .ok_or_else(|| CampaignError::validation("missing field: duration_days"))?;
        if duration <= 0 || duration > u32::MAX as i64 {
            return Err(CampaignError::validation(format!(
                "duration_days must be at least 1, got {duration}"
            )));
        }
        let channels = input
            .channels
            .ok_or_else(|| CampaignError::validation("missing field: channels"))?;
        let creative_type = input
            .creative_type
            .ok_or_else(|| CampaignError::validation("missing field: creative_type"))?
            .parse::<CreativeType>()?;
        let objective = input
            .objective
            .ok_or_else(|| CampaignError::validation("missing field: objective"))?
            .parse::<Objective>()?;

        let record = CampaignRecord {
            id: input.id,
            budget,
            duration_days: duration as u32,
            channels: channels.iter().map(|c| normalize_channel(c)).collect(),
            creative_type,
            objective,
            outcome_label: input.outcome_label,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Channel identifiers are compared case-insensitively.
pub fn normalize_channel(channel: &str) -> String {
    channel.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CreativeType {
    Image,
    Video,
    Carousel,
    Text,
    Story,
    Collection,
    Other,
}

impl CreativeType {
    pub const ALL: [CreativeType; 7] = [
        CreativeType::Image,
        CreativeType::Video,
        CreativeType::Carousel,
        CreativeType::Text,
        CreativeType::Story,
        CreativeType::Collection,
        CreativeType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CreativeType::Image => "image",
            CreativeType::Video => "video",
            CreativeType::Carousel => "carousel",
            CreativeType::Text => "text",
            CreativeType::Story => "story",
            CreativeType::Collection => "collection",
            CreativeType::Other => "other",
        }
    }
}

impl FromStr for CreativeType {
    type Err = CampaignError;

    /// Unrecognised creative formats fall into `Other` rather than failing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "image" | "static" | "banner" => CreativeType::Image,
            "video" => CreativeType::Video,
            "carousel" => CreativeType::Carousel,
            "text" | "search" => CreativeType::Text,
            "story" | "stories" => CreativeType::Story,
            "collection" => CreativeType::Collection,
            _ => CreativeType::Other,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Awareness,
    Traffic,
    Engagement,
    Leads,
    AppInstalls,
    Conversions,
    Sales,
}

impl Objective {
    pub const ALL: [Objective; 7] = [
        Objective::Awareness,
        Objective::Traffic,
        Objective::Engagement,
        Objective::Leads,
        Objective::AppInstalls,
        Objective::Conversions,
        Objective::Sales,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::Awareness => "awareness",
            Objective::Traffic => "traffic",
            Objective::Engagement => "engagement",
            Objective::Leads => "leads",
            Objective::AppInstalls => "app_installs",
            Objective::Conversions => "conversions",
            Objective::Sales => "sales",
        }
    }
}

impl FromStr for Objective {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(&[' ', '-'][..], "_").as_str() {
            "awareness" | "brand_awareness" | "reach" => Ok(Objective::Awareness),
            "traffic" => Ok(Objective::Traffic),
            "engagement" => Ok(Objective::Engagement),
            "leads" | "lead_generation" => Ok(Objective::Leads),
            "app_installs" | "app_install" => Ok(Objective::AppInstalls),
            "conversions" | "conversion" => Ok(Objective::Conversions),
            "sales" | "catalog_sales" => Ok(Objective::Sales),
            other => Err(CampaignError::validation(format!(
                "unknown campaign objective '{other}'"
            ))),
        }
    }
}

// ─── Shared Tiers ───────────────────────────────────────────────────────────

/// Coarse LOW/MEDIUM/HIGH bucket used for confidence, risk, warning severity
/// and recommendation priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Low => write!(f, "low"),
            Tier::Medium => write!(f, "medium"),
            Tier::High => write!(f, "high"),
        }
    }
}

// ─── Feature Vectors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum EncodingVersion {
    /// Bucketed budget/duration, channel multi-hot, creative and objective one-hot.
    #[default]
    V1,
    /// V1 plus log-scaled budget, duration and daily budget.
    V2,
}

/// Numeric representation of a campaign. Feature order is fixed by the
/// encoding version and channel vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub encoding_version: EncodingVersion,
    pub feature_names: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.feature_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }
}

// ─── Prediction Output ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivingFactor {
    pub feature: String,
    /// Signed push on the log-odds relative to the training population.
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub success_probability: f64,
    pub confidence_tier: Tier,
    pub risk_tier: Tier,
    pub top_driving_factors: Vec<DrivingFactor>,
    pub model_version: Option<ModelVersion>,
}
