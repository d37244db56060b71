//! Labelled design matrix plus the stratified partitioning used for the
//! train/test split and k-fold cross-validation.

use campaign_core::{CampaignError, CampaignResult};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Rows of already-encoded features with binary outcomes.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
}

impl TrainingSet {
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            rows: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<f64>, label: bool) -> CampaignResult<()> {
        if row.len() != self.feature_names.len() {
            return Err(CampaignError::validation(format!(
                "row has {} features, expected {}",
                row.len(),
                self.feature_names.len()
            )));
        }
        self.rows.push(row);
        self.labels.push(label);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l).count()
    }

    pub fn negatives(&self) -> usize {
        self.len() - self.positives()
    }

    pub(crate) fn matrix(&self) -> CampaignResult<(Array2<f64>, Array1<f64>)> {
        let n = self.rows.len();
        let d = self.feature_names.len();
        let flat: Vec<f64> = self.rows.iter().flatten().copied().collect();
        let x = Array2::from_shape_vec((n, d), flat)
            .map_err(|e| CampaignError::Internal(anyhow::anyhow!("design matrix: {e}")))?;
        let y = Array1::from_iter(self.labels.iter().map(|&l| if l { 1.0 } else { 0.0 }));
        Ok((x, y))
    }
}

/// Row subset of a design matrix.
pub(crate) fn take_rows(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &[usize],
) -> (Array2<f64>, Array1<f64>) {
    (x.select(Axis(0), indices), y.select(Axis(0), indices))
}

fn class_indices(labels: &[bool], class: bool, within: &[usize]) -> Vec<usize> {
    within
        .iter()
        .copied()
        .filter(|&i| labels[i] == class)
        .collect()
}

/// Split row indices into (train, test) preserving the class balance.
///
/// Each class contributes `round(len * test_fraction)` rows to the test side,
/// at least one when the class has two or more rows, and always leaves at
/// least one row for training.
pub fn stratified_split(
    labels: &[bool],
    test_fraction: f64,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let all: Vec<usize> = (0..labels.len()).collect();
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [false, true] {
        let mut idx = class_indices(labels, class, &all);
        idx.shuffle(rng);

        let len = idx.len();
        let wanted = (len as f64 * test_fraction).round() as usize;
        let floor = usize::from(len >= 2 && test_fraction > 0.0);
        let n_test = wanted.max(floor).min(len.saturating_sub(1));

        test.extend_from_slice(&idx[..n_test]);
        train.extend_from_slice(&idx[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Partition `indices` into `k` folds, dealing each class round-robin so
/// every fold sees both outcomes.
pub fn stratified_folds(
    labels: &[bool],
    indices: &[usize],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<usize>> {
    let mut folds = vec![Vec::new(); k.max(1)];
    for class in [false, true] {
        let mut idx = class_indices(labels, class, indices);
        idx.shuffle(rng);
        for (i, row) in idx.into_iter().enumerate() {
            folds[i % k.max(1)].push(row);
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}
