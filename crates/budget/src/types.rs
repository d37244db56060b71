use crate::curve::SaturationCurve;
use campaign_core::{CampaignError, CampaignResult};
use serde::{Deserialize, Serialize};

/// Historical efficiency of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPerformanceProfile {
    pub channel_id: String,
    pub avg_roas: f64,
    pub avg_cpa: f64,
    pub historical_campaign_count: u32,
    pub saturation: SaturationCurve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetGoal {
    Roas,
    Conversions,
    Revenue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAllocationRequest {
    pub total_budget: f64,
    pub goal: BudgetGoal,
    #[serde(default)]
    pub min_spend_per_channel: f64,
    /// Empty means every profiled channel.
    #[serde(default)]
    pub eligible_channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAllocation {
    pub channel_id: String,
    pub allocated_amount: f64,
    pub expected_roas: f64,
    pub expected_revenue: f64,
    pub expected_conversions: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Success,
    Infeasible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAllocationResult {
    /// Ordered by channel id.
    pub per_channel: Vec<ChannelAllocation>,
    pub expected_total_revenue: f64,
    pub expected_total_roas: f64,
    pub expected_conversions: f64,
    pub status: AllocationStatus,
    pub warnings: Vec<String>,
}

impl BudgetAllocationResult {
    pub(crate) fn infeasible(warnings: Vec<String>) -> Self {
        Self {
            per_channel: Vec::new(),
            expected_total_revenue: 0.0,
            expected_total_roas: 0.0,
            expected_conversions: 0.0,
            status: AllocationStatus::Infeasible,
            warnings,
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.status == AllocationStatus::Success
    }

    pub fn total_allocated(&self) -> f64 {
        self.per_channel.iter().map(|c| c.allocated_amount).sum()
    }

    pub fn allocation(&self, channel_id: &str) -> Option<&ChannelAllocation> {
        self.per_channel.iter().find(|c| c.channel_id == channel_id)
    }

    /// Turn an infeasible outcome into an error for callers that would
    /// rather propagate than branch on `status`.
    pub fn into_feasible(self) -> CampaignResult<Self> {
        match self.status {
            AllocationStatus::Success => Ok(self),
            AllocationStatus::Infeasible => Err(CampaignError::OptimizationInfeasible(
                self.warnings.join("; "),
            )),
        }
    }
}
