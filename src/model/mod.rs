//! Model module for the MaMoNet CNN using the Burn framework
//!
//! This module provides:
//! - The MaMoNet architecture and its build factory
//! - Single-file model artifacts (architecture, vocabulary, parameters)

pub mod artifact;
pub mod mamonet;

// Re-export main types for convenience
pub use artifact::{load_model_artifact, load_model_metadata, save_model_artifact, ModelMetadata};
pub use mamonet::{build, MaMoNet, MaMoNetConfig, OutputActivation};
