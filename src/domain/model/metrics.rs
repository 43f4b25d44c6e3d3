use serde::{Deserialize, Serialize};

/// Binary classification scores, positive class = "up".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub samples: usize,
}

impl ClassificationMetrics {
    /// Scores `predicted` against `actual`. Extra elements in the longer
    /// slice are ignored; an empty input yields all zeros.
    pub fn from_labels(predicted: &[u8], actual: &[u8]) -> Self {
        let n = predicted.len().min(actual.len());
        if n == 0 {
            return Self::default();
        }

        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;
        let mut correct = 0usize;

        for (p, a) in predicted.iter().zip(actual.iter()).take(n) {
            if p == a {
                correct += 1;
            }
            match (*p, *a) {
                (1, 1) => tp += 1,
                (1, _) => fp += 1,
                (_, 1) => fn_ += 1,
                _ => {}
            }
        }

        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };
        let recall = if tp + fn_ > 0 {
            tp as f64 / (tp + fn_) as f64
        } else {
            0.0
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: correct as f64 / n as f64,
            precision,
            recall,
            f1,
            samples: n,
        }
    }
}
