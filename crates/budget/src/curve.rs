//! Diminishing-returns response curves.
//!
//! A curve maps spend `s` to *effective* spend `E(s)`: the share of the
//! money that still converts at the channel's historical efficiency. Both
//! shapes are concave with `E'(0) = 1`, so a channel's marginal value starts
//! at its historical ROAS (or 1/CPA) and decays as it saturates.

use campaign_core::{CampaignError, CampaignResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum SaturationCurve {
    /// `E(s) = K (1 - e^(-s/K))`.
    Exponential { saturation_spend: f64 },
    /// Linear up to `K`, then `K (s/K)^a` with `0 < a <= 1`.
    Power { saturation_spend: f64, elasticity: f64 },
}

/// Result of fitting a curve to historical `(spend, revenue)` points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveFit {
    pub curve: SaturationCurve,
    /// Revenue per unit of effective spend, i.e. the fitted ROAS.
    pub return_scale: f64,
    pub residual_sum_squares: f64,
}

const FIT_GRID_POINTS: usize = 240;

impl SaturationCurve {
    pub fn saturation_spend(&self) -> f64 {
        match *self {
            SaturationCurve::Exponential { saturation_spend }
            | SaturationCurve::Power { saturation_spend, .. } => saturation_spend,
        }
    }

    pub fn validate(&self) -> CampaignResult<()> {
        let k = self.saturation_spend();
        if !k.is_finite() || k <= 0.0 {
            return Err(CampaignError::validation(format!(
                "saturation_spend must be positive, got {k}"
            )));
        }
        if let SaturationCurve::Power { elasticity, .. } = *self {
            if !(elasticity > 0.0 && elasticity <= 1.0) {
                return Err(CampaignError::validation(format!(
                    "elasticity must be within (0, 1], got {elasticity}"
                )));
            }
        }
        Ok(())
    }

    pub fn effective_spend(&self, spend: f64) -> f64 {
        let s = spend.max(0.0);
        match *self {
            SaturationCurve::Exponential { saturation_spend: k } => k * (1.0 - (-s / k).exp()),
            SaturationCurve::Power {
                saturation_spend: k,
                elasticity: a,
            } => {
                if s <= k {
                    s
                } else {
                    k * (s / k).powf(a)
                }
            }
        }
    }

    /// `dE/ds`; non-increasing in `spend`.
    pub fn marginal(&self, spend: f64) -> f64 {
        let s = spend.max(0.0);
        match *self {
            SaturationCurve::Exponential { saturation_spend: k } => (-s / k).exp(),
            SaturationCurve::Power {
                saturation_spend: k,
                elasticity: a,
            } => {
                if s <= k {
                    1.0
                } else {
                    a * (s / k).powf(a - 1.0)
                }
            }
        }
    }

    /// Least-squares fit of `revenue ≈ r · K (1 - e^(-s/K))` over a
    /// log-spaced grid of `K`; `r` has a closed form for each candidate.
    pub fn fit_exponential(observations: &[(f64, f64)]) -> CampaignResult<CurveFit> {
        let points: Vec<(f64, f64)> = observations
            .iter()
            .copied()
            .filter(|(s, r)| s.is_finite() && r.is_finite() && *s > 0.0 && *r >= 0.0)
            .collect();
        if points.len() < 2 {
            return Err(CampaignError::InsufficientData(format!(
                "curve fit needs at least 2 positive spend observations, got {}",
                points.len()
            )));
        }

        let min_spend = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_spend = points.iter().map(|p| p.0).fold(0.0, f64::max);
        let (lo, hi) = ((min_spend / 10.0).ln(), (max_spend * 100.0).ln());

        let mut best: Option<CurveFit> = None;
        for i in 0..FIT_GRID_POINTS {
            let k = (lo + (hi - lo) * i as f64 / (FIT_GRID_POINTS - 1) as f64).exp();
            let curve = SaturationCurve::Exponential { saturation_spend: k };
            let (gy, gg) = points.iter().fold((0.0, 0.0), |(gy, gg), &(s, y)| {
                let g = curve.effective_spend(s);
                (gy + g * y, gg + g * g)
            });
            if gg <= 0.0 {
                continue;
            }
            let scale = (gy / gg).max(0.0);
            let rss: f64 = points
                .iter()
                .map(|&(s, y)| (y - scale * curve.effective_spend(s)).powi(2))
                .sum();
            if best.map_or(true, |b| rss < b.residual_sum_squares) {
                best = Some(CurveFit {
                    curve,
                    return_scale: scale,
                    residual_sum_squares: rss,
                });
            }
        }

        best.ok_or_else(|| CampaignError::InsufficientData("no usable curve candidates".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_is_concave_and_bounded() {
        let c = SaturationCurve::Exponential { saturation_spend: 100.0 };
        assert_eq!(c.effective_spend(0.0), 0.0);
        assert!((c.marginal(0.0) - 1.0).abs() < 1e-12);
        assert!(c.effective_spend(50.0) < 50.0);
        assert!(c.effective_spend(10_000.0) <= 100.0);
        assert!(c.marginal(10.0) > c.marginal(200.0));
    }

    #[test]
    fn power_is_linear_until_saturation() {
        let c = SaturationCurve::Power {
            saturation_spend: 100.0,
            elasticity: 0.5,
        };
        assert_eq!(c.effective_spend(80.0), 80.0);
        assert_eq!(c.marginal(80.0), 1.0);
        assert!((c.effective_spend(400.0) - 200.0).abs() < 1e-9);
        assert!((c.marginal(400.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(SaturationCurve::Exponential { saturation_spend: 0.0 }
            .validate()
            .is_err());
        assert!(SaturationCurve::Power {
            saturation_spend: 10.0,
            elasticity: 1.5
        }
        .validate()
        .is_err());
    }

    #[test]
    fn fit_recovers_generating_curve() {
        let truth = SaturationCurve::Exponential { saturation_spend: 80_000.0 };
        let observations: Vec<(f64, f64)> = [10_000.0, 30_000.0, 60_000.0, 120_000.0, 250_000.0]
            .iter()
            .map(|&s| (s, 4.0 * truth.effective_spend(s)))
            .collect();

        let fit = SaturationCurve::fit_exponential(&observations).unwrap();
        let k = fit.curve.saturation_spend();
        assert!((k / 80_000.0 - 1.0).abs() < 0.05, "fitted K {k}");
        assert!((fit.return_scale - 4.0).abs() < 0.2, "fitted scale {}", fit.return_scale);
    }

    #[test]
    fn fit_needs_two_points() {
        assert!(SaturationCurve::fit_exponential(&[(1_000.0, 4_000.0)]).is_err());
    }

    #[test]
    fn curve_json_is_tagged() {
        let c: SaturationCurve =
            serde_json::from_str(r#"{"shape":"power","saturation_spend":5.0,"elasticity":0.7}"#)
                .unwrap();
        assert_eq!(
            c,
            SaturationCurve::Power {
                saturation_spend: 5.0,
                elasticity: 0.7
            }
        );
    }
}
