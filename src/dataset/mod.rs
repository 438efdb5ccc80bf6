//! Dataset module for multi-label image data
//!
//! This module provides functionality for:
//! - Loading a labeled image corpus from disk and fitting its label vocabulary
//! - Seeded train/test splitting
//! - Random geometric augmentation of training images
//! - An infinite augmented batch stream and Burn batching

pub mod augmentation;
pub mod batcher;
pub mod binarizer;
pub mod image;
pub mod loader;
pub mod split;
pub mod stream;

// Re-export main types for convenience
pub use augmentation::{AugmentationConfig, Augmenter, FillMode, RandomTransform};
pub use batcher::{MultiLabelBatch, MultiLabelBatcher, MultiLabelDataset, MultiLabelItem};
pub use binarizer::MultiLabelBinarizer;
pub use image::ImageTensor;
pub use loader::{load_corpus, LoadedCorpus};
pub use split::{train_test_split, DatasetSplit};
pub use stream::AugmentedStream;
