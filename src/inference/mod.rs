//! Inference module for scoring images with a trained model
//!
//! This module provides:
//! - Loading a persisted model artifact together with its label vocabulary
//! - Per-label probabilities for a single image

pub mod predictor;

// Re-export main types for convenience
pub use predictor::{LabelScore, Prediction, Predictor};
