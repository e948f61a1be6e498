//! Binary classification metrics. The positive class is label 1.

use crate::data::labels::BinaryLabel;
use serde::{Deserialize, Serialize};

/// Confusion counts for a binary problem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[BinaryLabel], y_pred: &[BinaryLabel]) -> Self {
        let mut cm = Self::default();
        for (t, p) in y_true.iter().zip(y_pred) {
            match (t, p) {
                (BinaryLabel::Positive, BinaryLabel::Positive) => cm.true_positive += 1,
                (BinaryLabel::Negative, BinaryLabel::Positive) => cm.false_positive += 1,
                (BinaryLabel::Negative, BinaryLabel::Negative) => cm.true_negative += 1,
                (BinaryLabel::Positive, BinaryLabel::Negative) => cm.false_negative += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }
}

/// Classification metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion_matrix: ConfusionMatrix,
}

impl ClassificationMetrics {
    /// Undefined ratios (no predicted or no actual positives) count as 0.
    pub fn compute(y_true: &[BinaryLabel], y_pred: &[BinaryLabel]) -> Self {
        let cm = ConfusionMatrix::from_predictions(y_true, y_pred);
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(cm.true_positive, cm.true_positive + cm.false_positive);
        let recall = ratio(cm.true_positive, cm.true_positive + cm.false_negative);
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            accuracy: ratio(cm.true_positive + cm.true_negative, cm.total()),
            precision,
            recall,
            f1_score,
            confusion_matrix: cm,
        }
    }
}

pub fn accuracy(y_true: &[BinaryLabel], y_pred: &[BinaryLabel]) -> f64 {
    ClassificationMetrics::compute(y_true, y_pred).accuracy
}

pub fn f1_score(y_true: &[BinaryLabel], y_pred: &[BinaryLabel]) -> f64 {
    ClassificationMetrics::compute(y_true, y_pred).f1_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use BinaryLabel::{Negative as N, Positive as P};

    #[test]
    fn test_metrics_from_confusion() {
        let y_true = [P, P, P, N, N, N, N, P];
        let y_pred = [P, P, N, N, P, N, N, P];
        let m = ClassificationMetrics::compute(&y_true, &y_pred);
        assert_eq!(m.confusion_matrix.true_positive, 3);
        assert_eq!(m.confusion_matrix.false_positive, 1);
        assert_eq!(m.confusion_matrix.false_negative, 1);
        assert!((m.accuracy - 0.75).abs() < 1e-12);
        assert!((m.precision - 0.75).abs() < 1e-12);
        assert!((m.recall - 0.75).abs() < 1e-12);
        assert!((m.f1_score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_no_positive_predictions_is_zero_not_nan() {
        let m = ClassificationMetrics::compute(&[P, N], &[N, N]);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.f1_score, 0.0);
        assert_eq!(m.accuracy, 0.5);
    }

    #[test]
    fn test_empty_input() {
        let m = ClassificationMetrics::compute(&[], &[]);
        assert_eq!(m.accuracy, 0.0);
        assert_eq!(f1_score(&[], &[]), 0.0);
    }
}
