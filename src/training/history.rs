//! Per-epoch training history
//!
//! Append-only while fitting; afterwards it feeds the diagnostic plot and the
//! optional JSON dump.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::charts::{generate_line_chart, DataSeries, PALETTE};
use crate::utils::error::{MamonetError, Result};

pub const PLOT_TITLE: &str = "Training Loss and Accuracy";

/// The four metrics recorded after each epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

impl EpochMetrics {
    /// All values finite, losses non-negative, accuracies in [0, 1]
    pub fn is_valid(&self) -> bool {
        let losses = [self.train_loss, self.val_loss];
        let accuracies = [self.train_accuracy, self.val_accuracy];
        losses.iter().all(|l| l.is_finite() && *l >= 0.0)
            && accuracies.iter().all(|a| (0.0..=1.0).contains(a))
    }
}

/// Which metric curve to extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    TrainLoss,
    ValLoss,
    TrainAccuracy,
    ValAccuracy,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::TrainLoss,
        Metric::ValLoss,
        Metric::TrainAccuracy,
        Metric::ValAccuracy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::TrainLoss => "train_loss",
            Metric::ValLoss => "val_loss",
            Metric::TrainAccuracy => "train_acc",
            Metric::ValAccuracy => "val_acc",
        }
    }

    fn value(&self, m: &EpochMetrics) -> f64 {
        match self {
            Metric::TrainLoss => m.train_loss,
            Metric::ValLoss => m.val_loss,
            Metric::TrainAccuracy => m.train_accuracy,
            Metric::ValAccuracy => m.val_accuracy,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn epochs(&self) -> &[EpochMetrics] {
        &self.epochs
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// One metric across all epochs, in epoch order
    pub fn series(&self, metric: Metric) -> Vec<f64> {
        self.epochs.iter().map(|m| metric.value(m)).collect()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MamonetError::persist(path, e))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MamonetError::persist(path, e))?;
        }
        std::fs::write(path, json).map_err(|e| MamonetError::persist(path, e))
    }

    /// Render all four curves over epoch index as an SVG chart
    pub fn plot(&self, path: &Path) -> Result<()> {
        let series: Vec<DataSeries> = Metric::ALL
            .iter()
            .zip(PALETTE.iter())
            .map(|(metric, color)| DataSeries::from_values(metric.name(), &self.series(*metric), color))
            .collect();

        generate_line_chart(PLOT_TITLE, "Epoch #", "Loss/Accuracy", &series, path)
    }
}
