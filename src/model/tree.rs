//! Regression trees grown leaf-wise on gradient statistics
//!
//! Each tree fits the current gradient/hessian pairs of the boosting loop.
//! Growth is best-first: the frontier leaf with the highest split gain is
//! split until the leaf budget is exhausted or no split clears the gain
//! and minimum-sample constraints.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

const MIN_GAIN: f64 = 1e-12;
const MIN_DENOM: f64 = 1e-12;

#[derive(Debug, Clone)]
pub(crate) struct TreeParams {
    pub max_leaves: usize,
    pub min_child_samples: usize,
    /// Shrinkage folded directly into stored leaf values
    pub learning_rate: f64,
    /// L2 term on leaf values
    pub lambda: f64,
    /// Fraction of features considered per split
    pub colsample: f64,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitPlan {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

struct PendingSplit {
    /// Arena slot of the leaf this plan would replace
    slot: usize,
    plan: SplitPlan,
}

impl RegressionTree {
    pub(crate) fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

/// Fit one tree to the given gradients/hessians. Split gains are added to
/// `importance` per feature as they are committed.
pub(crate) fn fit(
    rows: &[Vec<f64>],
    grad: &[f64],
    hess: &[f64],
    params: &TreeParams,
    rng: &mut StdRng,
    importance: &mut [f64],
) -> RegressionTree {
    let all: Vec<usize> = (0..rows.len()).collect();
    let mut nodes = vec![Node::Leaf {
        value: leaf_value(&all, grad, hess, params),
    }];
    let mut leaves = 1usize;

    let mut pending: Vec<PendingSplit> = Vec::new();
    if let Some(plan) = best_split(rows, grad, hess, &all, params, rng) {
        pending.push(PendingSplit { slot: 0, plan });
    }

    while leaves < params.max_leaves && !pending.is_empty() {
        let mut best = 0;
        for i in 1..pending.len() {
            if pending[i].plan.gain > pending[best].plan.gain {
                best = i;
            }
        }
        let PendingSplit { slot, plan } = pending.swap_remove(best);

        importance[plan.feature] += plan.gain;

        let left_slot = nodes.len();
        nodes.push(Node::Leaf {
            value: leaf_value(&plan.left, grad, hess, params),
        });
        let right_slot = nodes.len();
        nodes.push(Node::Leaf {
            value: leaf_value(&plan.right, grad, hess, params),
        });
        nodes[slot] = Node::Split {
            feature: plan.feature,
            threshold: plan.threshold,
            left: left_slot,
            right: right_slot,
        };
        leaves += 1;

        if let Some(next) = best_split(rows, grad, hess, &plan.left, params, rng) {
            pending.push(PendingSplit {
                slot: left_slot,
                plan: next,
            });
        }
        if let Some(next) = best_split(rows, grad, hess, &plan.right, params, rng) {
            pending.push(PendingSplit {
                slot: right_slot,
                plan: next,
            });
        }
    }

    RegressionTree { nodes }
}

/// Newton-step leaf value with shrinkage applied.
fn leaf_value(indices: &[usize], grad: &[f64], hess: &[f64], params: &TreeParams) -> f64 {
    let g: f64 = indices.iter().map(|&i| grad[i]).sum();
    let h: f64 = indices.iter().map(|&i| hess[i]).sum();
    let denom = h + params.lambda;
    if denom <= MIN_DENOM {
        return 0.0;
    }
    -params.learning_rate * g / denom
}

fn score(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom <= MIN_DENOM {
        0.0
    } else {
        g * g / denom
    }
}

/// Exhaustive best split over the sampled features: sort members by value,
/// sweep cut points between distinct neighbors, keep the highest gain that
/// satisfies the minimum-child constraint.
fn best_split(
    rows: &[Vec<f64>],
    grad: &[f64],
    hess: &[f64],
    indices: &[usize],
    params: &TreeParams,
    rng: &mut StdRng,
) -> Option<SplitPlan> {
    let min_child = params.min_child_samples.max(1);
    if indices.len() < 2 * min_child {
        return None;
    }
    let n_features = rows[indices[0]].len();
    if n_features == 0 {
        return None;
    }

    let total_g: f64 = indices.iter().map(|&i| grad[i]).sum();
    let total_h: f64 = indices.iter().map(|&i| hess[i]).sum();
    let parent_score = score(total_g, total_h, params.lambda);

    let mut feature_order: Vec<usize> = (0..n_features).collect();
    feature_order.shuffle(rng);
    let keep = ((n_features as f64 * params.colsample).ceil() as usize).clamp(1, n_features);
    feature_order.truncate(keep);

    let mut best: Option<SplitPlan> = None;

    for &feature in &feature_order {
        let mut ordered = indices.to_vec();
        ordered.sort_by(|&a, &b| {
            rows[a][feature]
                .partial_cmp(&rows[b][feature])
                .unwrap_or(Ordering::Equal)
        });

        let mut left_g = 0.0;
        let mut left_h = 0.0;
        for pos in 0..ordered.len() - 1 {
            let i = ordered[pos];
            left_g += grad[i];
            left_h += hess[i];

            let here = rows[i][feature];
            let next = rows[ordered[pos + 1]][feature];
            if here == next {
                continue;
            }
            let left_n = pos + 1;
            let right_n = ordered.len() - left_n;
            if left_n < min_child || right_n < min_child {
                continue;
            }

            let gain = 0.5
                * (score(left_g, left_h, params.lambda)
                    + score(total_g - left_g, total_h - left_h, params.lambda)
                    - parent_score);
            if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(SplitPlan {
                    feature,
                    threshold: (here + next) / 2.0,
                    gain,
                    left: ordered[..left_n].to_vec(),
                    right: ordered[left_n..].to_vec(),
                });
            }
        }
    }
    best
}
