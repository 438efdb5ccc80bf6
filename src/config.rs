//! Run Configuration
//!
//! A `RunConfig` fixes every parameter of one training run before any other
//! component executes: the image dimensions drive both the loader's resize
//! target and the network's input shape. The value is passed explicitly into
//! each component, so several runs with different settings can coexist in one
//! process.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::model::mamonet::OutputActivation;
use crate::utils::error::{MamonetError, Result};

/// Target image dimensions (height x width x channel depth)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDims {
    pub height: usize,
    pub width: usize,
    pub depth: usize,
}

impl ImageDims {
    pub fn new(height: usize, width: usize, depth: usize) -> Self {
        Self {
            height,
            width,
            depth,
        }
    }

    /// Number of values in one channel-first image tensor
    pub fn numel(&self) -> usize {
        self.height * self.width * self.depth
    }
}

impl Default for ImageDims {
    fn default() -> Self {
        Self::new(96, 96, 3)
    }
}

impl std::fmt::Display for ImageDims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.depth)
    }
}

/// Destinations of the run's artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputPaths {
    /// Serialized network (architecture + trained parameters)
    pub model_path: PathBuf,
    /// Serialized label vocabulary
    pub label_path: PathBuf,
    /// Loss/accuracy diagnostic plot (SVG)
    pub plot_path: PathBuf,
    /// Optional per-epoch history dump (JSON)
    #[serde(default)]
    pub history_path: Option<PathBuf>,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("mamonet.model"),
            label_path: PathBuf::from("mlb.json"),
            plot_path: PathBuf::from("plot.svg"),
            history_path: None,
        }
    }
}

impl OutputPaths {
    fn required(&self) -> [(&'static str, &Path); 3] {
        [
            ("model_path", self.model_path.as_path()),
            ("label_path", self.label_path.as_path()),
            ("plot_path", self.plot_path.as_path()),
        ]
    }
}

/// Width knobs for the network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Filters in the first convolution; later stages use 2x and 4x
    pub base_filters: usize,
    /// Units in the fully connected layer
    pub dense_units: usize,
    /// Dropout after each convolutional stage
    pub conv_dropout: f64,
    /// Dropout before the classifier
    pub dense_dropout: f64,
    /// Output activation mode
    pub output_activation: OutputActivation,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_filters: 32,
            dense_units: 1024,
            conv_dropout: 0.25,
            dense_dropout: 0.5,
            output_activation: OutputActivation::Sigmoid,
        }
    }
}

/// Complete configuration of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root directory of the labeled image corpus
    pub dataset_dir: PathBuf,
    /// Delimiter splitting a class directory name into labels
    pub label_delimiter: String,
    pub image: ImageDims,
    pub learning_rate: f64,
    /// Apply inverse-time decay of `learning_rate / epochs` per step
    pub lr_decay: bool,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
    /// Held-out fraction of the corpus
    pub test_fraction: f64,
    pub augmentation: AugmentationConfig,
    pub model: ModelSettings,
    pub output: OutputPaths,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("dataset"),
            label_delimiter: "_".to_string(),
            image: ImageDims::default(),
            learning_rate: 1e-3,
            lr_decay: true,
            epochs: 75,
            batch_size: 32,
            seed: 42,
            test_fraction: 0.2,
            augmentation: AugmentationConfig::default(),
            model: ModelSettings::default(),
            output: OutputPaths::default(),
        }
    }
}

impl RunConfig {
    /// Decay rate applied by the optimizer schedule (0 when disabled)
    pub fn decay(&self) -> f64 {
        if self.lr_decay && self.epochs > 0 {
            self.learning_rate / self.epochs as f64
        } else {
            0.0
        }
    }

    /// Reject any configuration that cannot produce a valid run
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(MamonetError::Config("epochs must be greater than 0".into()));
        }

        if self.batch_size == 0 {
            return Err(MamonetError::Config(
                "batch_size must be greater than 0".into(),
            ));
        }

        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(MamonetError::Config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }

        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(MamonetError::Config(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }

        if self.image.height == 0 || self.image.width == 0 {
            return Err(MamonetError::Config(format!(
                "image dimensions must be positive, got {}",
                self.image
            )));
        }

        if self.image.depth != 1 && self.image.depth != 3 {
            return Err(MamonetError::Config(format!(
                "image depth must be 1 (grayscale) or 3 (RGB), got {}",
                self.image.depth
            )));
        }

        if self.label_delimiter.is_empty() {
            return Err(MamonetError::Config("label_delimiter must not be empty".into()));
        }

        self.augmentation.validate()?;

        let mut seen: Vec<&Path> = Vec::new();
        let history = self.output.history_path.as_deref().map(|p| ("history_path", p));
        for (name, path) in self.output.required().into_iter().chain(history) {
            if path.as_os_str().is_empty() {
                return Err(MamonetError::Config(format!("{} is missing", name)));
            }
            if path.file_name().is_none() || path.is_dir() {
                return Err(MamonetError::Config(format!(
                    "{} must name a file, got {:?}",
                    name, path
                )));
            }
            if seen.contains(&path) {
                return Err(MamonetError::Config(format!(
                    "{} {:?} collides with another output path",
                    name, path
                )));
            }
            seen.push(path);
        }

        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MamonetError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            MamonetError::Config(format!("cannot read config {:?}: {}", path, e))
        })?;
        serde_json::from_str(&json)
            .map_err(|e| MamonetError::Config(format!("invalid config {:?}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.image, ImageDims::new(96, 96, 3));
        assert_eq!(config.seed, 42);
        assert!((config.decay() - 1e-3 / 75.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_epochs_rejected() {
        let config = RunConfig {
            epochs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MamonetError::Config(_))));
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = RunConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MamonetError::Config(_))));
    }

    #[test]
    fn test_bad_fraction_rejected() {
        for fraction in [0.0, 1.0, -0.2, f64::NAN] {
            let config = RunConfig {
                test_fraction: fraction,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "fraction {} accepted", fraction);
        }
    }

    #[test]
    fn test_missing_output_path_rejected() {
        let mut config = RunConfig::default();
        config.output.label_path = PathBuf::new();
        assert!(matches!(config.validate(), Err(MamonetError::Config(_))));
    }

    #[test]
    fn test_colliding_output_paths_rejected() {
        let mut config = RunConfig::default();
        config.output.plot_path = config.output.model_path.clone();
        assert!(matches!(config.validate(), Err(MamonetError::Config(_))));
    }

    #[test]
    fn test_directory_output_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RunConfig::default();
        config.output.model_path = dir.path().to_path_buf();
        assert!(matches!(config.validate(), Err(MamonetError::Config(_))));
    }

    #[test]
    fn test_unsupported_depth_rejected() {
        let config = RunConfig {
            image: ImageDims::new(96, 96, 4),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MamonetError::Config(_))));
    }

    #[test]
    fn test_decay_disabled() {
        let config = RunConfig {
            lr_decay: false,
            ..Default::default()
        };
        assert_eq!(config.decay(), 0.0);
    }

    #[test]
    fn test_save_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let config = RunConfig {
            epochs: 3,
            batch_size: 8,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = RunConfig::load(&path).unwrap();
        assert_eq!(loaded.epochs, 3);
        assert_eq!(loaded.batch_size, 8);
        assert_eq!(loaded.output.plot_path, PathBuf::from("plot.svg"));
    }

    #[test]
    fn test_load_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(RunConfig::load(&path), Err(MamonetError::Config(_))));
    }
}
