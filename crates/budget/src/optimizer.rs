//! Budget optimizer: splits a fixed budget across channels by equalising
//! marginal value on each channel's saturation curve.
//!
//! The objective is separable and concave, so the optimum sets every
//! unconstrained channel's marginal value to a common shadow price λ. We find
//! λ by bisection, invert each channel's marginal value by an inner
//! bisection, then hand the rounding residual to channels with slack.

use crate::curve::SaturationCurve;
use crate::types::{
    AllocationStatus, BudgetAllocationRequest, BudgetAllocationResult, BudgetGoal,
    ChannelAllocation, ChannelPerformanceProfile,
};
use campaign_core::config::OptimizerConfig;
use campaign_core::types::normalize_channel;
use campaign_core::{CampaignError, CampaignResult};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Tolerance for budget and spend comparisons, in currency units.
const EPSILON: f64 = 1e-6;

pub struct BudgetOptimizer {
    config: OptimizerConfig,
}

/// A channel that passed inclusion, with its spend bounds.
#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    /// Objective value per unit of effective spend.
    value: f64,
    roas: f64,
    cpa: f64,
    curve: SaturationCurve,
    lo: f64,
    hi: f64,
}

impl Candidate {
    fn marginal(&self, spend: f64) -> f64 {
        self.value * self.curve.marginal(spend)
    }
}

impl BudgetOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn optimize(
        &self,
        request: &BudgetAllocationRequest,
        profiles: &[ChannelPerformanceProfile],
    ) -> CampaignResult<BudgetAllocationResult> {
        validate_request(request)?;
        let profiles = index_profiles(profiles)?;

        let mut warnings = Vec::new();
        let candidates = self.candidates(request, &profiles, &mut warnings);
        let budget = request.total_budget;
        let min_spend = request.min_spend_per_channel;

        if candidates.is_empty() {
            warnings.push("No eligible channel can receive budget".to_string());
            return Ok(self.finish_infeasible(warnings));
        }

        let required = candidates.len() as f64 * min_spend;
        if required > budget + EPSILON {
            warnings.push(format!(
                "Minimum spend of {min_spend:.2} across {} channels requires {required:.2}, \
                 exceeding total budget {budget:.2}",
                candidates.len()
            ));
            return Ok(self.finish_infeasible(warnings));
        }

        let capacity: f64 = candidates.iter().map(|c| c.hi).sum();
        if capacity + EPSILON < budget {
            warnings.push(format!(
                "Channel volume caps absorb at most {capacity:.2} of the {budget:.2} budget"
            ));
            return Ok(self.finish_infeasible(warnings));
        }

        let spends = self.water_fill(&candidates, budget);

        let mut per_channel = Vec::with_capacity(candidates.len());
        for (c, &spend) in candidates.iter().zip(&spends) {
            let k = c.curve.saturation_spend();
            if spend >= self.config.saturation_warning_ratio * k {
                warnings.push(format!(
                    "Channel {} nearing saturation ({:.0} of {:.0} saturation spend)",
                    c.id, spend, k
                ));
            }
            let effective = c.curve.effective_spend(spend);
            let revenue = c.roas * effective;
            per_channel.push(ChannelAllocation {
                channel_id: c.id.clone(),
                allocated_amount: spend,
                expected_roas: if spend > 0.0 { revenue / spend } else { 0.0 },
                expected_revenue: revenue,
                expected_conversions: if c.cpa > 0.0 { effective / c.cpa } else { 0.0 },
            });
        }

        let expected_total_revenue: f64 = per_channel.iter().map(|c| c.expected_revenue).sum();
        let expected_conversions: f64 = per_channel.iter().map(|c| c.expected_conversions).sum();

        metrics::counter!("optimizer.runs", "status" => "success").increment(1);
        info!(
            goal = ?request.goal,
            budget = budget,
            channels = per_channel.len(),
            expected_revenue = expected_total_revenue,
            warnings = warnings.len(),
            "Budget allocated"
        );

        Ok(BudgetAllocationResult {
            per_channel,
            expected_total_revenue,
            expected_total_roas: expected_total_revenue / budget,
            expected_conversions,
            status: AllocationStatus::Success,
            warnings,
        })
    }

    /// Apply inclusion rules in channel-id order.
    fn candidates(
        &self,
        request: &BudgetAllocationRequest,
        profiles: &BTreeMap<String, &ChannelPerformanceProfile>,
        warnings: &mut Vec<String>,
    ) -> Vec<Candidate> {
        let eligible: BTreeSet<String> = if request.eligible_channels.is_empty() {
            profiles.keys().cloned().collect()
        } else {
            request
                .eligible_channels
                .iter()
                .map(|c| normalize_channel(c))
                .collect()
        };

        let mut out = Vec::new();
        for id in eligible {
            let Some(profile) = profiles.get(&id) else {
                warnings.push(format!("Channel {id} excluded: no performance profile"));
                continue;
            };
            if profile.historical_campaign_count == 0 {
                warnings.push(format!("Channel {id} excluded: no historical campaigns"));
                continue;
            }
            let cap =
                profile.historical_campaign_count as f64 * self.config.volume_cap_per_campaign;
            if cap + EPSILON < request.min_spend_per_channel {
                warnings.push(format!(
                    "Channel {id} excluded: volume cap {cap:.2} below minimum spend {:.2}",
                    request.min_spend_per_channel
                ));
                continue;
            }
            let value = match request.goal {
                // With total spend fixed, maximising revenue also maximises ROAS.
                BudgetGoal::Roas | BudgetGoal::Revenue => profile.avg_roas,
                BudgetGoal::Conversions => {
                    if profile.avg_cpa <= 0.0 {
                        warnings.push(format!(
                            "Channel {id} excluded: no CPA history for a conversions goal"
                        ));
                        continue;
                    }
                    1.0 / profile.avg_cpa
                }
            };
            out.push(Candidate {
                id,
                value,
                roas: profile.avg_roas,
                cpa: profile.avg_cpa,
                curve: profile.saturation,
                lo: request.min_spend_per_channel,
                hi: cap,
            });
        }
        out
    }

    fn water_fill(&self, candidates: &[Candidate], budget: f64) -> Vec<f64> {
        let total_at = |lambda: f64| -> f64 {
            candidates
                .iter()
                .map(|c| self.spend_at_price(c, lambda))
                .sum()
        };

        let mut lambda_lo = 0.0;
        let mut lambda_hi = candidates
            .iter()
            .map(|c| c.marginal(c.lo))
            .fold(0.0, f64::max)
            + EPSILON;

        for _ in 0..self.config.price_iterations {
            let mid = 0.5 * (lambda_lo + lambda_hi);
            if total_at(mid) >= budget {
                lambda_lo = mid;
            } else {
                lambda_hi = mid;
            }
        }

        // At λ_hi the allocation never exceeds the budget.
        let mut spends: Vec<f64> = candidates
            .iter()
            .map(|c| self.spend_at_price(c, lambda_hi))
            .collect();
        let mut residual = budget - spends.iter().sum::<f64>();
        debug!(lambda = lambda_hi, residual = residual, "Shadow price converged");

        if residual > 0.0 {
            let mut order: Vec<usize> = (0..candidates.len()).collect();
            order.sort_by(|&a, &b| {
                let (ca, cb) = (&candidates[a], &candidates[b]);
                cb.marginal(spends[b])
                    .partial_cmp(&ca.marginal(spends[a]))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| ca.id.cmp(&cb.id))
            });
            for i in order {
                if residual <= 0.0 {
                    break;
                }
                let slack = (candidates[i].hi - spends[i]).max(0.0);
                let add = slack.min(residual);
                spends[i] += add;
                residual -= add;
            }
        }
        spends
    }

    /// Largest spend within the channel's bounds whose marginal value is at
    /// least `lambda`.
    fn spend_at_price(&self, c: &Candidate, lambda: f64) -> f64 {
        if c.marginal(c.lo) < lambda {
            return c.lo;
        }
        if c.marginal(c.hi) >= lambda {
            return c.hi;
        }
        let (mut lo, mut hi) = (c.lo, c.hi);
        for _ in 0..self.config.spend_iterations {
            let mid = 0.5 * (lo + hi);
            if c.marginal(mid) >= lambda {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn finish_infeasible(&self, warnings: Vec<String>) -> BudgetAllocationResult {
        metrics::counter!("optimizer.runs", "status" => "infeasible").increment(1);
        warn!(reasons = ?warnings, "Budget allocation infeasible");
        BudgetAllocationResult::infeasible(warnings)
    }
}

fn validate_request(request: &BudgetAllocationRequest) -> CampaignResult<()> {
    if !request.total_budget.is_finite() || request.total_budget <= 0.0 {
        return Err(CampaignError::validation(format!(
            "total_budget must be positive, got {}",
            request.total_budget
        )));
    }
    if !request.min_spend_per_channel.is_finite() || request.min_spend_per_channel < 0.0 {
        return Err(CampaignError::validation(format!(
            "min_spend_per_channel must not be negative, got {}",
            request.min_spend_per_channel
        )));
    }
    Ok(())
}

/// Validate profiles and key them by normalised channel id.
fn index_profiles(
    profiles: &[ChannelPerformanceProfile],
) -> CampaignResult<BTreeMap<String, &ChannelPerformanceProfile>> {
    let mut index = BTreeMap::new();
    for p in profiles {
        let id = normalize_channel(&p.channel_id);
        if id.is_empty() {
            return Err(CampaignError::validation("profile channel_id must not be blank"));
        }
        for (name, value) in [("avg_roas", p.avg_roas), ("avg_cpa", p.avg_cpa)] {
            if !value.is_finite() || value < 0.0 {
                return Err(CampaignError::validation(format!(
                    "channel {id}: {name} must be a non-negative number, got {value}"
                )));
            }
        }
        p.saturation
            .validate()
            .map_err(|e| CampaignError::validation(format!("channel {id}: {e}")))?;
        if index.insert(id.clone(), p).is_some() {
            return Err(CampaignError::validation(format!(
                "duplicate performance profile for channel {id}"
            )));
        }
    }
    Ok(index)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_profiles() -> impl Strategy<Value = Vec<ChannelPerformanceProfile>> {
        prop::collection::vec((0.5f64..8.0, 5.0f64..200.0, 1u32..40, 10_000.0f64..500_000.0), 1..6)
            .prop_map(|rows| {
                rows.into_iter()
                    .enumerate()
                    .map(|(i, (roas, cpa, count, k))| ChannelPerformanceProfile {
                        channel_id: format!("ch{i}"),
                        avg_roas: roas,
                        avg_cpa: cpa,
                        historical_campaign_count: count,
                        saturation: SaturationCurve::Exponential { saturation_spend: k },
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn feasible_allocations_spend_exactly_the_budget(
            profiles in arb_profiles(),
            budget in 1_000.0f64..2_000_000.0,
            min_share in 0.0f64..0.3,
        ) {
            let request = BudgetAllocationRequest {
                total_budget: budget,
                goal: BudgetGoal::Roas,
                min_spend_per_channel: budget * min_share / profiles.len() as f64,
                eligible_channels: Vec::new(),
            };
            let result = BudgetOptimizer::new(OptimizerConfig::default())
                .optimize(&request, &profiles)
                .unwrap();
            if result.is_feasible() {
                prop_assert!((result.total_allocated() - budget).abs() <= 1e-6 * budget.max(1.0));
                for c in &result.per_channel {
                    prop_assert!(c.allocated_amount + 1e-6 >= request.min_spend_per_channel);
                }
            } else {
                prop_assert!(result.per_channel.is_empty());
            }
        }
    }
}
