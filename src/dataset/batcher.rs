//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` and `Batcher` traits for multi-label samples:
//! an image tensor paired with its multi-hot target vector.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;

use crate::config::ImageDims;
use crate::dataset::image::ImageTensor;
use crate::utils::error::{MamonetError, Result};

/// A single sample ready for Burn
#[derive(Clone, Debug, PartialEq)]
pub struct MultiLabelItem {
    pub image: ImageTensor,
    /// Multi-hot target vector, one entry per vocabulary label
    pub targets: Vec<f32>,
}

impl MultiLabelItem {
    pub fn new(image: ImageTensor, targets: Vec<f32>) -> Self {
        Self { image, targets }
    }
}

/// In-memory dataset implementing Burn's Dataset trait
#[derive(Clone, Debug, Default)]
pub struct MultiLabelDataset {
    items: Vec<MultiLabelItem>,
}

impl MultiLabelDataset {
    /// Pair index-aligned images and targets
    pub fn new(images: Vec<ImageTensor>, targets: Vec<Vec<f32>>) -> Result<Self> {
        if images.len() != targets.len() {
            return Err(MamonetError::Data(format!(
                "{} images but {} target vectors",
                images.len(),
                targets.len()
            )));
        }

        let items = images
            .into_iter()
            .zip(targets)
            .map(|(image, targets)| MultiLabelItem::new(image, targets))
            .collect();
        Ok(Self { items })
    }

    pub fn items(&self) -> &[MultiLabelItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<MultiLabelItem> {
        self.items
    }
}

impl Dataset<MultiLabelItem> for MultiLabelDataset {
    fn get(&self, index: usize) -> Option<MultiLabelItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of images with their multi-hot targets
#[derive(Clone, Debug)]
pub struct MultiLabelBatch<B: Backend> {
    /// Images [batch_size, depth, height, width]
    pub images: Tensor<B, 4>,
    /// Targets [batch_size, num_classes]
    pub targets: Tensor<B, 2, Int>,
}

/// Batcher for multi-label items of a fixed shape
#[derive(Clone, Debug)]
pub struct MultiLabelBatcher {
    dims: ImageDims,
    num_classes: usize,
}

impl MultiLabelBatcher {
    pub fn new(dims: ImageDims, num_classes: usize) -> Self {
        Self { dims, num_classes }
    }

    /// Check every item against the configured shape
    pub fn validate(&self, items: &[MultiLabelItem]) -> Result<()> {
        if items.is_empty() {
            return Err(MamonetError::shape("a non-empty batch", "0 items"));
        }

        for (i, item) in items.iter().enumerate() {
            if item.image.dims() != self.dims {
                return Err(MamonetError::shape(
                    format!("image {} in batch to be {}", i, self.dims),
                    item.image.dims(),
                ));
            }
            if item.targets.len() != self.num_classes {
                return Err(MamonetError::shape(
                    format!("target {} in batch of width {}", i, self.num_classes),
                    format!("width {}", item.targets.len()),
                ));
            }
        }

        Ok(())
    }

    /// Validate and batch
    pub fn try_batch<B: Backend>(
        &self,
        items: Vec<MultiLabelItem>,
        device: &B::Device,
    ) -> Result<MultiLabelBatch<B>> {
        self.validate(&items)?;
        Ok(self.build(items, device))
    }

    fn build<B: Backend>(&self, items: Vec<MultiLabelItem>, device: &B::Device) -> MultiLabelBatch<B> {
        let batch_size = items.len();
        let ImageDims {
            height,
            width,
            depth,
        } = self.dims;

        let mut images_data = Vec::with_capacity(batch_size * self.dims.numel());
        let mut targets_data = Vec::with_capacity(batch_size * self.num_classes);
        for item in items {
            targets_data.extend(item.targets.iter().map(|&t| if t > 0.5 { 1i64 } else { 0 }));
            images_data.extend(item.image.into_data());
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, depth, height, width]),
            device,
        );
        let targets = Tensor::<B, 2, Int>::from_data(
            TensorData::new(targets_data, [batch_size, self.num_classes]),
            device,
        );

        MultiLabelBatch { images, targets }
    }
}

impl<B: Backend> Batcher<B, MultiLabelItem, MultiLabelBatch<B>> for MultiLabelBatcher {
    fn batch(&self, items: Vec<MultiLabelItem>, device: &B::Device) -> MultiLabelBatch<B> {
        self.build(items, device)
    }
}
