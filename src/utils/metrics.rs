//! Metrics for multi-label evaluation
//!
//! Host-side accuracy computations over flattened prediction/target buffers,
//! plus a sample-weighted accumulator used to turn per-batch values into
//! per-epoch values.

use serde::{Deserialize, Serialize};

/// Decision threshold for an independent per-class probability
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Element-wise binary accuracy.
///
/// `probabilities` and `targets` are row-major `[samples, classes]` buffers.
/// A position counts as correct when `(p > threshold) == (t > 0.5)`.
pub fn binary_accuracy(probabilities: &[f32], targets: &[f32], threshold: f32) -> f64 {
    assert_eq!(
        probabilities.len(),
        targets.len(),
        "Predictions and targets must have same length"
    );

    if probabilities.is_empty() {
        return 0.0;
    }

    let correct = probabilities
        .iter()
        .zip(targets.iter())
        .filter(|(p, t)| (**p > threshold) == (**t > 0.5))
        .count();

    correct as f64 / probabilities.len() as f64
}

/// Arg-max accuracy for single-label (softmax) outputs.
pub fn categorical_accuracy(probabilities: &[f32], targets: &[f32], num_classes: usize) -> f64 {
    assert_eq!(
        probabilities.len(),
        targets.len(),
        "Predictions and targets must have same length"
    );

    if num_classes == 0 || probabilities.is_empty() {
        return 0.0;
    }

    let rows = probabilities.len() / num_classes;
    let correct = probabilities
        .chunks(num_classes)
        .zip(targets.chunks(num_classes))
        .filter(|(p, t)| argmax(p) == argmax(t))
        .count();

    correct as f64 / rows as f64
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_i, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best_i, best_v)
            }
        })
        .0
}

/// Sample-weighted running mean of loss and accuracy over several batches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricAccumulator {
    loss_sum: f64,
    accuracy_sum: f64,
    samples: usize,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one batch's mean loss and accuracy over `samples` samples
    pub fn update(&mut self, loss: f64, accuracy: f64, samples: usize) {
        self.loss_sum += loss * samples as f64;
        self.accuracy_sum += accuracy * samples as f64;
        self.samples += samples;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn mean_loss(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.loss_sum / self.samples as f64
        }
    }

    pub fn mean_accuracy(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.accuracy_sum / self.samples as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_accuracy_counts_every_position() {
        // two samples x three classes, one wrong position
        let probs = [0.9, 0.1, 0.7, 0.2, 0.6, 0.4];
        let targets = [1.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let acc = binary_accuracy(&probs, &targets, DEFAULT_THRESHOLD);
        assert!((acc - 5.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_binary_accuracy_empty() {
        assert_eq!(binary_accuracy(&[], &[], 0.5), 0.0);
    }

    #[test]
    fn test_categorical_accuracy() {
        let probs = [0.7, 0.2, 0.1, 0.1, 0.3, 0.6];
        let targets = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let acc = categorical_accuracy(&probs, &targets, 3);
        assert!((acc - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_accumulator_weights_by_samples() {
        let mut acc = MetricAccumulator::new();
        acc.update(1.0, 0.5, 8);
        acc.update(0.0, 1.0, 2);
        assert_eq!(acc.samples(), 10);
        assert!((acc.mean_loss() - 0.8).abs() < 1e-9);
        assert!((acc.mean_accuracy() - 0.6).abs() < 1e-9);
    }
}
