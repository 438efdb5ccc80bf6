//! MaMoNet CNN Architecture
//!
//! A VGG-style convolutional network for multi-label image classification:
//!
//! - Stage 1: CONV(32) => RELU => BN => POOL(3x3) => DROPOUT
//! - Stage 2: (CONV(64) => RELU => BN) x 2 => POOL(2x2) => DROPOUT
//! - Stage 3: (CONV(128) => RELU => BN) x 2 => POOL(2x2) => DROPOUT
//! - Head: FLATTEN => FC(1024) => RELU => BN => DROPOUT => FC(num_classes)
//!
//! `forward` returns raw logits. The output activation is applied by
//! `forward_probabilities`: independent sigmoids for multi-label output, or a
//! softmax over all classes for mutually exclusive labels.

use std::fmt;

use burn::{
    config::Config,
    module::{Ignored, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{
        activation::{sigmoid, softmax},
        backend::Backend,
        Tensor,
    },
};
use serde::{Deserialize, Serialize};

use crate::config::{ImageDims, ModelSettings};
use crate::utils::error::{self, MamonetError};

/// Final-layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputActivation {
    /// Independent per-class probabilities (multi-label)
    Sigmoid,
    /// One distribution over all classes (single-label)
    Softmax,
}

impl fmt::Display for OutputActivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sigmoid => write!(f, "sigmoid"),
            Self::Softmax => write!(f, "softmax"),
        }
    }
}

/// (kernel, stride) of the three pooling stages
const POOLING: [(usize, usize); 3] = [(3, 3), (2, 2), (2, 2)];

fn pooled(size: usize) -> usize {
    POOLING.iter().fold(size, |s, &(k, stride)| {
        if s < k {
            0
        } else {
            (s - k) / stride + 1
        }
    })
}

/// Configuration for the MaMoNet model
#[derive(Config, Debug)]
pub struct MaMoNetConfig {
    /// Width of the output layer
    pub num_classes: usize,

    pub height: usize,
    pub width: usize,

    /// Number of input channels (1 or 3)
    pub depth: usize,

    /// Filters in the first stage; later stages use 2x and 4x
    #[config(default = "32")]
    pub base_filters: usize,

    #[config(default = "1024")]
    pub dense_units: usize,

    #[config(default = "0.25")]
    pub conv_dropout: f64,

    #[config(default = "0.5")]
    pub dense_dropout: f64,

    #[config(default = "OutputActivation::Sigmoid")]
    pub output_activation: OutputActivation,
}

impl MaMoNetConfig {
    /// Config for the given input shape, vocabulary size, and width settings
    pub fn from_settings(dims: ImageDims, num_classes: usize, settings: &ModelSettings) -> Self {
        Self::new(num_classes, dims.height, dims.width, dims.depth)
            .with_base_filters(settings.base_filters)
            .with_dense_units(settings.dense_units)
            .with_conv_dropout(settings.conv_dropout)
            .with_dense_dropout(settings.dense_dropout)
            .with_output_activation(settings.output_activation)
    }

    pub fn input_dims(&self) -> ImageDims {
        ImageDims::new(self.height, self.width, self.depth)
    }

    /// Length of the flattened feature vector fed to the dense head
    pub fn flattened_size(&self) -> usize {
        self.base_filters * 4 * pooled(self.height) * pooled(self.width)
    }

    pub fn validate(&self) -> error::Result<()> {
        if self.num_classes == 0 {
            return Err(MamonetError::Config(
                "model needs at least one output class".into(),
            ));
        }
        if self.depth == 0 || self.base_filters == 0 || self.dense_units == 0 {
            return Err(MamonetError::Config(
                "depth, base_filters and dense_units must be positive".into(),
            ));
        }
        if pooled(self.height) == 0 || pooled(self.width) == 0 {
            return Err(MamonetError::Config(format!(
                "input {} is too small for the pooling chain (minimum 12x12)",
                self.input_dims()
            )));
        }
        for p in [self.conv_dropout, self.dense_dropout] {
            if !(0.0..1.0).contains(&p) {
                return Err(MamonetError::Config(format!(
                    "dropout must be in [0, 1), got {}",
                    p
                )));
            }
        }
        Ok(())
    }

    /// Initialize a new model with freshly sampled parameters
    pub fn init<B: Backend>(&self, device: &B::Device) -> error::Result<MaMoNet<B>> {
        self.validate()?;
        Ok(MaMoNet::new(self, device))
    }
}

/// CONV => RELU => BN
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    pub relu: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv,
            bn,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        self.bn.forward(x)
    }
}

/// One or more conv blocks followed by max pooling and dropout
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub pool: MaxPool2d,
    pub dropout: Dropout,
}

impl<B: Backend> ConvStage<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        repeats: usize,
        (kernel, stride): (usize, usize),
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let blocks = (0..repeats)
            .map(|i| {
                let input = if i == 0 { in_channels } else { out_channels };
                ConvBlock::new(input, out_channels, device)
            })
            .collect();

        Self {
            blocks,
            pool: MaxPool2dConfig::new([kernel, kernel])
                .with_strides([stride, stride])
                .init(),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));
        let x = self.pool.forward(x);
        self.dropout.forward(x)
    }
}

/// MaMoNet multi-label classifier
#[derive(Module, Debug)]
pub struct MaMoNet<B: Backend> {
    pub stage1: ConvStage<B>,
    pub stage2: ConvStage<B>,
    pub stage3: ConvStage<B>,

    pub fc1: Linear<B>,
    pub relu: Relu,
    pub bn_fc: BatchNorm<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,

    activation: Ignored<OutputActivation>,
    num_classes: usize,
    height: usize,
    width: usize,
    depth: usize,
}

impl<B: Backend> MaMoNet<B> {
    fn new(config: &MaMoNetConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        // 96 -> 32 -> 16 -> 8 for the default input size
        let stage1 = ConvStage::new(config.depth, base, 1, POOLING[0], config.conv_dropout, device);
        let stage2 = ConvStage::new(base, base * 2, 2, POOLING[1], config.conv_dropout, device);
        let stage3 = ConvStage::new(base * 2, base * 4, 2, POOLING[2], config.conv_dropout, device);

        let fc1 = LinearConfig::new(config.flattened_size(), config.dense_units).init(device);
        let bn_fc = BatchNormConfig::new(config.dense_units).init(device);
        let dropout = DropoutConfig::new(config.dense_dropout).init();
        let fc2 = LinearConfig::new(config.dense_units, config.num_classes).init(device);

        Self {
            stage1,
            stage2,
            stage3,
            fc1,
            relu: Relu::new(),
            bn_fc,
            dropout,
            fc2,
            activation: Ignored(config.output_activation),
            num_classes: config.num_classes,
            height: config.height,
            width: config.width,
            depth: config.depth,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, depth, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stage1.forward(x);
        let x = self.stage2.forward(x);
        let x = self.stage3.forward(x);

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.fc1.forward(x);
        let x = self.relu.forward(x);

        // BatchNorm normalizes over dim 1 of a [batch, features, ..] tensor
        let [batch_size, units] = x.dims();
        let x = self
            .bn_fc
            .forward(x.reshape([batch_size, units, 1]))
            .reshape([batch_size, units]);

        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Forward pass followed by the configured output activation
    pub fn forward_probabilities(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        match self.output_activation() {
            OutputActivation::Sigmoid => sigmoid(logits),
            OutputActivation::Softmax => softmax(logits, 1),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn input_dims(&self) -> ImageDims {
        ImageDims::new(self.height, self.width, self.depth)
    }

    pub fn output_activation(&self) -> OutputActivation {
        *self.activation
    }
}

/// Build a fresh network for the given input shape and vocabulary size
pub fn build<B: Backend>(
    dims: ImageDims,
    num_classes: usize,
    settings: &ModelSettings,
    device: &B::Device,
) -> error::Result<MaMoNet<B>> {
    MaMoNetConfig::from_settings(dims, num_classes, settings).init(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend as B;
    use burn::tensor::Distribution;

    fn small_settings() -> ModelSettings {
        ModelSettings {
            base_filters: 4,
            dense_units: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_pooling_chain() {
        assert_eq!(pooled(96), 8);
        assert_eq!(pooled(24), 2);
        assert_eq!(pooled(12), 1);
        assert_eq!(pooled(11), 0);
    }

    #[test]
    fn test_default_input_forward_shape() {
        let device = Default::default();
        let model: MaMoNet<B> =
            build(ImageDims::new(96, 96, 3), 6, &small_settings(), &device).unwrap();

        let input = Tensor::<B, 4>::random([2, 3, 96, 96], Distribution::Default, &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 6]);
        assert_eq!(model.input_dims(), ImageDims::new(96, 96, 3));
    }

    #[test]
    fn test_default_config_sizes() {
        let config = MaMoNetConfig::new(6, 96, 96, 3);
        assert_eq!(config.base_filters, 32);
        assert_eq!(config.dense_units, 1024);
        assert_eq!(config.flattened_size(), 128 * 8 * 8);
        assert_eq!(config.output_activation, OutputActivation::Sigmoid);
    }

    #[test]
    fn test_sigmoid_probabilities_are_independent() {
        let device = Default::default();
        let model: MaMoNet<B> =
            build(ImageDims::new(24, 24, 3), 4, &small_settings(), &device).unwrap();

        let input = Tensor::<B, 4>::random([3, 3, 24, 24], Distribution::Default, &device);
        let probs: Vec<f32> = model
            .forward_probabilities(input)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap();

        assert_eq!(probs.len(), 12);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let settings = ModelSettings {
            output_activation: OutputActivation::Softmax,
            ..small_settings()
        };
        let model: MaMoNet<B> = build(ImageDims::new(24, 24, 1), 5, &settings, &device).unwrap();
        assert_eq!(model.output_activation(), OutputActivation::Softmax);

        let input = Tensor::<B, 4>::random([2, 1, 24, 24], Distribution::Default, &device);
        let probs: Vec<f32> = model
            .forward_probabilities(input)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap();

        for row in probs.chunks(5) {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_too_small_input_is_config_error() {
        let device = Default::default();
        let result = build::<B>(ImageDims::new(8, 8, 3), 3, &small_settings(), &device);
        assert!(matches!(result, Err(MamonetError::Config(_))));
    }

    #[test]
    fn test_zero_classes_is_config_error() {
        let device = Default::default();
        let result = build::<B>(ImageDims::new(24, 24, 3), 0, &small_settings(), &device);
        assert!(matches!(result, Err(MamonetError::Config(_))));
    }
}
