//! Evaluation metrics and binning utilities
//!
//! Pure functions over probability/outcome slices:
//! - tie-aware trapezoidal ROC AUC
//! - clipped log loss
//! - equal-width calibration bins
//! - linear-interpolation quantiles

use std::cmp::Ordering;

const LOG_LOSS_EPS: f64 = 1e-15;

/// Area under the ROC curve via the trapezoid rule.
///
/// Tied scores are collapsed into a single curve point. Degenerate input
/// (one class only) returns 0.5; so does a constant score, since the curve
/// is then the single chance diagonal segment.
pub fn roc_auc(targets: &[f64], scores: &[f64]) -> f64 {
    let positives = targets.iter().filter(|&&t| t > 0.5).count();
    let negatives = targets.len() - positives;
    if positives == 0 || negatives == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..targets.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    let mut auc = 0.0;
    let (mut tp, mut fp) = (0usize, 0usize);
    let (mut tpr_prev, mut fpr_prev) = (0.0f64, 0.0f64);

    let mut i = 0;
    while i < order.len() {
        let score = scores[order[i]];
        let mut j = i;
        while j < order.len() && scores[order[j]] == score {
            if targets[order[j]] > 0.5 {
                tp += 1;
            } else {
                fp += 1;
            }
            j += 1;
        }
        let tpr = tp as f64 / positives as f64;
        let fpr = fp as f64 / negatives as f64;
        auc += (fpr - fpr_prev) * (tpr + tpr_prev) / 2.0;
        tpr_prev = tpr;
        fpr_prev = fpr;
        i = j;
    }
    auc
}

/// Mean negative log likelihood with probabilities clipped away from 0 and 1.
pub fn log_loss(targets: &[f64], probs: &[f64]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let total: f64 = targets
        .iter()
        .zip(probs)
        .map(|(&y, &p)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if y > 0.5 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / targets.len() as f64
}

/// One equal-width probability bin.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationBin {
    pub lo: f64,
    pub hi: f64,
    pub count: usize,
    pub mean_pred: f64,
    pub observed_rate: f64,
}

impl CalibrationBin {
    /// Label like `0.30-0.40`, as the reports print it.
    pub fn label(&self) -> String {
        format!("{:.2}-{:.2}", self.lo, self.hi)
    }
}

/// Partition probabilities into `n_bins` equal-width bins over [0, 1].
///
/// Bins are left-closed with 1.0 folded into the last bin, so every input
/// lands in exactly one bin and counts sum to the input length. Empty bins
/// are returned with a zero count; callers decide whether to print them.
pub fn calibration_bins(probs: &[f64], targets: &[f64], n_bins: usize) -> Vec<CalibrationBin> {
    if n_bins == 0 {
        return Vec::new();
    }
    let width = 1.0 / n_bins as f64;
    let mut counts = vec![0usize; n_bins];
    let mut pred_sums = vec![0.0f64; n_bins];
    let mut target_sums = vec![0.0f64; n_bins];

    for (&p, &y) in probs.iter().zip(targets) {
        // Left-closed: a probability sitting exactly on an interior edge
        // (0.40 with 10 bins) counts toward the higher bin.
        let idx = ((p.clamp(0.0, 1.0) / width).floor() as usize).min(n_bins - 1);
        counts[idx] += 1;
        pred_sums[idx] += p;
        target_sums[idx] += y;
    }

    (0..n_bins)
        .map(|i| {
            let n = counts[i];
            CalibrationBin {
                lo: i as f64 * width,
                hi: (i + 1) as f64 * width,
                count: n,
                mean_pred: if n > 0 { pred_sums[i] / n as f64 } else { 0.0 },
                observed_rate: if n > 0 { target_sums[i] / n as f64 } else { 0.0 },
            }
        })
        .collect()
}

/// Quantile of an already-sorted sample, with linear interpolation between
/// the two nearest order statistics.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return Some(sorted[lower]);
    }
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Convenience wrapper that sorts a copy first.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    quantile_sorted(&sorted, q)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_of_perfect_ranking_is_one() {
        let targets = [0.0, 0.0, 1.0, 1.0];
        let scores = [0.1, 0.2, 0.8, 0.9];
        assert!((roc_auc(&targets, &scores) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_auc_of_constant_baseline_is_exactly_half() {
        let targets = [0.0, 1.0, 1.0, 0.0, 1.0];
        let scores = [0.7; 5];
        assert_eq!(roc_auc(&targets, &scores), 0.5);
    }

    #[test]
    fn test_auc_of_reversed_ranking_is_zero() {
        let targets = [1.0, 1.0, 0.0, 0.0];
        let scores = [0.1, 0.2, 0.8, 0.9];
        assert!(roc_auc(&targets, &scores).abs() < 1e-12);
    }

    #[test]
    fn test_auc_with_single_class_falls_back_to_half() {
        let targets = [1.0, 1.0, 1.0];
        let scores = [0.2, 0.5, 0.9];
        assert_eq!(roc_auc(&targets, &scores), 0.5);
    }

    #[test]
    fn test_auc_handles_ties_between_classes() {
        // two tied scores split one positive and one negative
        let targets = [0.0, 1.0, 0.0, 1.0];
        let scores = [0.3, 0.5, 0.5, 0.9];
        let auc = roc_auc(&targets, &scores);
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_log_loss_of_perfect_oracle_is_zero() {
        let targets = [1.0, 0.0, 1.0, 0.0];
        let probs = [1.0, 0.0, 1.0, 0.0];
        assert!(log_loss(&targets, &probs) < 1e-9);
    }

    #[test]
    fn test_log_loss_of_half_guess_is_ln_two() {
        let targets = [1.0, 0.0];
        let probs = [0.5, 0.5];
        assert!((log_loss(&targets, &probs) - (2.0f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_calibration_counts_partition_the_population() {
        let probs = [0.0, 0.05, 0.1, 0.35, 0.51, 0.99, 1.0];
        let targets = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0];
        let bins = calibration_bins(&probs, &targets, 10);
        assert_eq!(bins.len(), 10);
        let total: usize = bins.iter().map(|b| b.count).sum();
        assert_eq!(total, probs.len());
        // exactly 1.0 folds into the last bin
        assert_eq!(bins[9].count, 2);
        // left-closed edges: 0.1 belongs to the second bin
        assert_eq!(bins[1].count, 1);
        assert_eq!(bins[0].count, 2);
    }

    #[test]
    fn test_calibration_bin_stats() {
        let probs = [0.32, 0.38];
        let targets = [1.0, 0.0];
        let bins = calibration_bins(&probs, &targets, 10);
        let bin = &bins[3];
        assert_eq!(bin.count, 2);
        assert!((bin.mean_pred - 0.35).abs() < 1e-12);
        assert!((bin.observed_rate - 0.5).abs() < 1e-12);
        assert_eq!(bin.label(), "0.30-0.40");
    }

    #[test]
    fn test_quantiles_interpolate_linearly() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        assert_eq!(quantile(&values, 0.5), Some(2.5));
        assert_eq!(quantile(&values, 0.25), Some(1.75));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_quantile_sorts_before_interpolating() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(quantile(&values, 0.5), Some(2.5));
    }
}
