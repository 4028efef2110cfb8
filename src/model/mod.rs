//! Gradient-boosted decision trees for binary outcomes
//!
//! A small, deterministic GBDT:
//! - logistic loss with class-balanced sample weights
//! - leaf-wise trees bounded by a leaf budget and minimum child size
//! - shrinkage folded into stored leaf values
//! - split-gain feature importances accumulated across all trees
//!
//! Given the same data and seed, fitting is bit-for-bit reproducible.

mod tree;


use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use tree::TreeParams;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("training data is empty")]
    EmptyInput,

    #[error("feature rows have no columns")]
    NoFeatures,

    #[error("feature rows ({rows}) and targets ({targets}) differ in length")]
    LengthMismatch { rows: usize, targets: usize },

    #[error("ragged feature rows: expected {expected} columns, found {found}")]
    RaggedRows { expected: usize, found: usize },

    /// Only one outcome class present; there is nothing to learn
    #[error("training target contains a single class")]
    DegenerateTarget,
}

/// Boosting hyperparameters.
#[derive(Debug, Clone)]
pub struct GbdtParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// Leaf budget per tree
    pub num_leaves: usize,
    /// Minimum samples on each side of a split
    pub min_child_samples: usize,
    /// Fraction of features considered per split
    pub colsample: f64,
    /// L2 regularization on leaf values
    pub lambda: f64,
    pub seed: u64,
}

impl GbdtParams {
    /// Settings for the opportunity win predictor.
    pub fn win_predictor() -> Self {
        Self {
            n_estimators: 500,
            learning_rate: 0.05,
            num_leaves: 63,
            min_child_samples: 50,
            colsample: 1.0,
            lambda: 0.0,
            seed: 42,
        }
    }

    /// Settings for the peak-exit model, sized for a small cohort.
    pub fn peak_exit() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            num_leaves: 7,
            min_child_samples: 2,
            colsample: 1.0,
            lambda: 0.0,
            seed: 42,
        }
    }
}

/// A fitted classifier.
#[derive(Debug)]
pub struct GbdtClassifier {
    trees: Vec<tree::RegressionTree>,
    base_score: f64,
    importance: Vec<f64>,
    n_features: usize,
}

impl GbdtClassifier {
    /// Fit on dense rows and 0/1 targets.
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], params: GbdtParams) -> Result<Self, ModelError> {
        if rows.is_empty() {
            return Err(ModelError::EmptyInput);
        }
        if rows.len() != targets.len() {
            return Err(ModelError::LengthMismatch {
                rows: rows.len(),
                targets: targets.len(),
            });
        }
        let n_features = rows[0].len();
        if n_features == 0 {
            return Err(ModelError::NoFeatures);
        }
        for row in rows {
            if row.len() != n_features {
                return Err(ModelError::RaggedRows {
                    expected: n_features,
                    found: row.len(),
                });
            }
        }

        let positives = targets.iter().filter(|&&y| y > 0.5).count();
        let negatives = targets.len() - positives;
        if positives == 0 || negatives == 0 {
            return Err(ModelError::DegenerateTarget);
        }

        // balanced weighting: each class carries half the total mass
        let n = targets.len() as f64;
        let w_pos = n / (2.0 * positives as f64);
        let w_neg = n / (2.0 * negatives as f64);
        let weights: Vec<f64> = targets
            .iter()
            .map(|&y| if y > 0.5 { w_pos } else { w_neg })
            .collect();

        // weighted prior log odds; exactly zero under balanced weights
        let weighted_pos: f64 = weights.iter().zip(targets).map(|(&w, &y)| w * y).sum();
        let weighted_neg: f64 = weights
            .iter()
            .zip(targets)
            .map(|(&w, &y)| w * (1.0 - y))
            .sum();
        let base_score = (weighted_pos / weighted_neg).ln();

        let tree_params = TreeParams {
            max_leaves: params.num_leaves,
            min_child_samples: params.min_child_samples,
            learning_rate: params.learning_rate,
            lambda: params.lambda,
            colsample: params.colsample,
        };

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut scores = vec![base_score; targets.len()];
        let mut importance = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut grad = vec![0.0; targets.len()];
        let mut hess = vec![0.0; targets.len()];

        for _ in 0..params.n_estimators {
            for i in 0..targets.len() {
                let p = sigmoid(scores[i]);
                grad[i] = weights[i] * (p - targets[i]);
                hess[i] = weights[i] * p * (1.0 - p);
            }
            let fitted = tree::fit(rows, &grad, &hess, &tree_params, &mut rng, &mut importance);
            for (i, row) in rows.iter().enumerate() {
                scores[i] += fitted.predict_row(row);
            }
            trees.push(fitted);
        }

        Ok(Self {
            trees,
            base_score,
            importance,
            n_features,
        })
    }

    /// Probability of the positive class per row. Rows must carry the same
    /// columns, in the same order, the model was fitted with.
    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| sigmoid(self.raw_score(row))).collect()
    }

    fn raw_score(&self, row: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }

    /// Total split gain per feature, in fit column order.
    pub fn feature_importance(&self) -> &[f64] {
        &self.importance
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z.clamp(-60.0, 60.0)).exp())
}
