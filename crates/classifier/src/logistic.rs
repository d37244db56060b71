//! L2-regularised logistic regression fitted by full-batch gradient descent.

use campaign_core::config::TrainingConfig;
use campaign_core::model::sigmoid;
use campaign_core::{CancelToken, CampaignResult};
use ndarray::{Array1, Array2};

/// Epochs between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 50;

#[derive(Debug, Clone)]
pub struct LogisticFit {
    pub weights: Array1<f64>,
    pub intercept: f64,
}

impl LogisticFit {
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<f64>,
        config: &TrainingConfig,
        cancel: &CancelToken,
    ) -> CampaignResult<Self> {
        let (n, d) = x.dim();
        let n = n.max(1) as f64;
        let mut weights = Array1::<f64>::zeros(d);
        let mut intercept = 0.0;

        for epoch in 0..config.epochs {
            if epoch % CANCEL_CHECK_INTERVAL == 0 {
                cancel.check()?;
            }

            let residual = (x.dot(&weights) + intercept).mapv(sigmoid) - y;
            let grad_w = x.t().dot(&residual) / n + &weights * config.l2_penalty;
            let grad_b = residual.sum() / n;

            weights.scaled_add(-config.learning_rate, &grad_w);
            intercept -= config.learning_rate * grad_b;
        }

        Ok(Self { weights, intercept })
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        (x.dot(&self.weights) + self.intercept).mapv(sigmoid)
    }

    /// Share of rows whose thresholded probability matches the label.
    pub fn accuracy(&self, x: &Array2<f64>, y: &Array1<f64>) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        let hits = self
            .predict_proba(x)
            .iter()
            .zip(y.iter())
            .filter(|(&p, &label)| (p >= 0.5) == (label >= 0.5))
            .count();
        hits as f64 / y.len() as f64
    }

    /// Mean squared error between probability and outcome.
    pub fn brier_score(&self, x: &Array2<f64>, y: &Array1<f64>) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        let p = self.predict_proba(x);
        (&p - y).mapv(|e| e * e).sum() / y.len() as f64
    }
}
