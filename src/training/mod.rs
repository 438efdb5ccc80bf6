//! Training module
//!
//! This module provides:
//! - The trainer state machine (compile, fit, persist)
//! - Inverse-time learning rate decay
//! - Per-epoch history and its diagnostic plot
//! - The end-to-end training pipeline

pub mod history;
pub mod pipeline;
pub mod scheduler;
pub mod trainer;

// Re-export main types for convenience
pub use history::{EpochMetrics, Metric, TrainingHistory};
pub use pipeline::{run_training, RunReport};
pub use scheduler::LRScheduler;
pub use trainer::{PersistedArtifacts, Trainer, TrainerPhase};
