//! # MaMoNet
//!
//! Multi-label image classification training built on the Burn framework.
//! Each image may carry several labels at once (for example a color and a
//! clothing kind), derived from the name of the directory it lives in.
//!
//! ## Modules
//!
//! - `config`: The explicit run configuration shared by every stage
//! - `dataset`: Corpus discovery, label binarization, splitting, augmentation and batching
//! - `model`: The MaMoNet convolutional network and its on-disk artifact
//! - `training`: Trainer state machine, learning rate decay, history and the end-to-end run
//! - `inference`: Scoring new images with a persisted model
//! - `utils`: Errors, logging, metrics and charts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mamonet::backend::{default_device, TrainingBackend};
//! use mamonet::{run_training, RunConfig};
//!
//! let config = RunConfig::default();
//! let report = run_training::<TrainingBackend>(&config, default_device())?;
//! println!("{:?}", report.final_val_accuracy());
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{ImageDims, ModelSettings, OutputPaths, RunConfig};
pub use dataset::binarizer::MultiLabelBinarizer;
pub use dataset::loader::{load_corpus, LoadedCorpus};
pub use inference::predictor::{Prediction, Predictor};
pub use model::mamonet::{MaMoNet, MaMoNetConfig, OutputActivation};
pub use training::pipeline::{run_training, RunReport};
pub use training::trainer::{Trainer, TrainerPhase};
pub use utils::error::{MamonetError, Result};
