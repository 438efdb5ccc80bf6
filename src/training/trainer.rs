//! MaMoNet trainer
//!
//! Drives one network through its lifecycle:
//!
//! ```text
//! Unbuilt -> Compiled -> Training(epoch 1..N) -> Trained -> Persisted
//! ```
//!
//! Every epoch pulls exactly `steps_per_epoch` augmented batches from the
//! stream, then evaluates once on the held-out partition without
//! augmentation. Operations invoked out of order are rejected.

use std::path::PathBuf;

use burn::{
    module::AutodiffModule,
    nn::loss::BinaryCrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        activation::{log_softmax, sigmoid, softmax},
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use tracing::{debug, info};

use crate::config::{OutputPaths, RunConfig};
use crate::dataset::batcher::{MultiLabelBatcher, MultiLabelDataset, MultiLabelItem};
use crate::dataset::binarizer::MultiLabelBinarizer;
use crate::dataset::stream::AugmentedStream;
use crate::model::artifact::{save_model_artifact, ModelMetadata};
use crate::model::mamonet::{MaMoNet, MaMoNetConfig, OutputActivation};
use crate::training::history::{EpochMetrics, TrainingHistory};
use crate::training::scheduler::LRScheduler;
use crate::utils::error::{MamonetError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{binary_accuracy, categorical_accuracy, MetricAccumulator, DEFAULT_THRESHOLD};

/// Adam hyperparameters
const ADAM_BETA_1: f32 = 0.9;
const ADAM_BETA_2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-7;

/// Lifecycle phase of a [`Trainer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerPhase {
    Unbuilt,
    Compiled,
    /// Fitting is in progress (0-indexed epoch)
    Training { epoch: usize },
    Trained,
    Persisted,
}

/// Paths written by [`Trainer::persist`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifacts {
    pub model_path: PathBuf,
    pub label_path: PathBuf,
    pub plot_path: PathBuf,
    pub history_path: Option<PathBuf>,
}

/// Main trainer for the MaMoNet model using Burn
pub struct Trainer<B: AutodiffBackend> {
    config: RunConfig,
    binarizer: MultiLabelBinarizer,
    device: B::Device,
    model_config: Option<MaMoNetConfig>,
    model: Option<MaMoNet<B>>,
    scheduler: LRScheduler,
    history: TrainingHistory,
    phase: TrainerPhase,
    iteration: usize,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: RunConfig, binarizer: MultiLabelBinarizer, device: B::Device) -> Self {
        let scheduler = LRScheduler::for_run(config.learning_rate, config.decay());
        Self {
            config,
            binarizer,
            device,
            model_config: None,
            model: None,
            scheduler,
            history: TrainingHistory::new(),
            phase: TrainerPhase::Unbuilt,
            iteration: 0,
        }
    }

    pub fn phase(&self) -> TrainerPhase {
        self.phase
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn model(&self) -> Option<&MaMoNet<B>> {
        self.model.as_ref()
    }

    /// Optimizer steps taken so far
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    fn expect_phase(&self, expected: TrainerPhase, operation: &str) -> Result<()> {
        if self.phase != expected {
            return Err(MamonetError::Training(format!(
                "cannot {} while trainer is {:?} (expected {:?})",
                operation, self.phase, expected
            )));
        }
        Ok(())
    }

    /// Build the network for the vocabulary size and attach the schedule
    pub fn compile(&mut self) -> Result<()> {
        self.expect_phase(TrainerPhase::Unbuilt, "compile")?;

        let model_config =
            MaMoNetConfig::from_settings(self.config.image, self.binarizer.len(), &self.config.model);
        let model = model_config.init::<B>(&self.device)?;

        info!(
            "Compiled MaMoNet: input {}, {} outputs ({}), {} parameters, lr {} with decay {:.2e}",
            self.config.image,
            model.num_classes(),
            model.output_activation(),
            crate::utils::format_number(burn::module::Module::num_params(&model)),
            self.config.learning_rate,
            self.config.decay()
        );

        self.model_config = Some(model_config);
        self.model = Some(model);
        self.phase = TrainerPhase::Compiled;
        Ok(())
    }

    /// Number of batches per epoch; zero steps is a configuration error
    pub fn steps_per_epoch(train_len: usize, batch_size: usize) -> Result<usize> {
        if batch_size == 0 {
            return Err(MamonetError::Config("batch_size must be greater than 0".into()));
        }
        let steps = train_len / batch_size;
        if steps == 0 {
            return Err(MamonetError::Config(format!(
                "batch_size {} exceeds the {} training samples: no steps per epoch",
                batch_size, train_len
            )));
        }
        Ok(steps)
    }

    /// Fit for the configured number of epochs
    pub fn fit(
        &mut self,
        stream: &mut AugmentedStream,
        validation: &MultiLabelDataset,
    ) -> Result<&TrainingHistory> {
        self.expect_phase(TrainerPhase::Compiled, "fit")?;

        let steps = Self::steps_per_epoch(stream.len(), self.config.batch_size)?;
        let epochs = self.config.epochs;
        let batcher = MultiLabelBatcher::new(self.config.image, self.binarizer.len());
        let mut model = self
            .model
            .take()
            .ok_or_else(|| MamonetError::Training("no compiled model".into()))?;
        let activation = model.output_activation();

        let mut optimizer = AdamConfig::new()
            .with_beta_1(ADAM_BETA_1)
            .with_beta_2(ADAM_BETA_2)
            .with_epsilon(ADAM_EPSILON)
            .init::<B, MaMoNet<B>>();

        info!(
            "Training on {} samples for {} epochs ({} steps of {}), validating on {}",
            stream.len(),
            epochs,
            steps,
            self.config.batch_size,
            validation.items().len()
        );

        let mut logger = TrainingLogger::new(epochs);

        for epoch in 0..epochs {
            self.phase = TrainerPhase::Training { epoch };
            logger.start_epoch(epoch, steps, self.scheduler.get_lr(self.iteration));

            let mut train = MetricAccumulator::new();
            for step in 0..steps {
                let items = stream.next().ok_or_else(|| {
                    MamonetError::Training("augmented stream ended unexpectedly".into())
                })?;
                let batch = batcher.try_batch::<B>(items, &self.device)?;
                let batch_size = batch.targets.dims()[0];

                let logits = model.forward(batch.images);
                let loss = batch_loss(activation, logits.clone(), batch.targets.clone());
                let loss_value: f64 = loss.clone().into_scalar().elem();
                if !loss_value.is_finite() {
                    return Err(MamonetError::Training(format!(
                        "loss became {} at epoch {} step {}",
                        loss_value,
                        epoch + 1,
                        step + 1
                    )));
                }

                let accuracy = batch_accuracy(activation, logits.detach(), batch.targets)?;
                train.update(loss_value, accuracy, batch_size);

                let lr = self.scheduler.get_lr(self.iteration);
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(lr, model, grads);
                self.iteration += 1;

                debug!(
                    "  Batch {:>4}/{}: loss = {:.4}, acc = {:.4}, lr = {:.6}",
                    step + 1,
                    steps,
                    loss_value,
                    accuracy,
                    lr
                );
            }

            let (val_loss, val_accuracy) = evaluate(
                &model.valid(),
                validation,
                &batcher,
                self.config.batch_size,
                &self.device,
            )?;

            let metrics = EpochMetrics {
                train_loss: train.mean_loss(),
                train_accuracy: train.mean_accuracy(),
                val_loss,
                val_accuracy,
            };
            logger.end_epoch(
                metrics.train_loss,
                metrics.train_accuracy,
                metrics.val_loss,
                metrics.val_accuracy,
            );
            self.history.push(metrics);
        }

        logger.log_complete(self.history.last().map(|m| m.val_accuracy).unwrap_or(0.0));

        self.model = Some(model);
        self.phase = TrainerPhase::Trained;
        Ok(&self.history)
    }

    /// Replace the output locations, e.g. to retry a failed `persist`
    pub fn set_output(&mut self, output: OutputPaths) -> Result<()> {
        if self.phase == TrainerPhase::Persisted {
            return Err(MamonetError::Training(
                "cannot change outputs of a persisted trainer".into(),
            ));
        }
        self.config.output = output;
        Ok(())
    }

    /// Write the model, vocabulary, plot, and optional history.
    ///
    /// The trained model is kept until every write succeeds, so a failed
    /// call can be retried without retraining.
    pub fn persist(&mut self) -> Result<PersistedArtifacts> {
        self.expect_phase(TrainerPhase::Trained, "persist")?;

        let model = self
            .model
            .as_ref()
            .ok_or_else(|| MamonetError::Training("no trained model".into()))?;
        let model_config = self
            .model_config
            .clone()
            .ok_or_else(|| MamonetError::Training("no model config".into()))?;
        let output = self.config.output.clone();

        let mut metadata =
            ModelMetadata::new(model_config, self.binarizer.classes().to_vec(), self.history.len());
        if let Some(last) = self.history.last() {
            metadata.final_val_loss = Some(last.val_loss);
            metadata.final_val_accuracy = Some(last.val_accuracy);
        }

        save_model_artifact(&output.model_path, &model.valid(), &metadata)?;
        self.binarizer.save(&output.label_path)?;
        self.history.plot(&output.plot_path)?;
        if let Some(path) = &output.history_path {
            self.history.save_json(path)?;
        }

        info!(
            "Persisted model to {:?}, labels to {:?}, plot to {:?}",
            output.model_path, output.label_path, output.plot_path
        );

        self.model = None;
        self.phase = TrainerPhase::Persisted;
        Ok(PersistedArtifacts {
            model_path: output.model_path,
            label_path: output.label_path,
            plot_path: output.plot_path,
            history_path: output.history_path,
        })
    }
}

/// Mean loss of one batch for the given output mode.
///
/// Sigmoid: binary cross-entropy over every (sample, class) position.
/// Softmax: categorical cross-entropy against the (normalized) target rows.
pub fn batch_loss<B: Backend>(
    activation: OutputActivation,
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    match activation {
        OutputActivation::Sigmoid => BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&logits.device())
            .forward(logits, targets),
        OutputActivation::Softmax => {
            let targets = targets.float();
            let norm = targets.clone().sum_dim(1).clamp_min(1.0);
            let log_probs = log_softmax(logits, 1);
            (log_probs * (targets / norm)).sum_dim(1).mean().neg()
        }
    }
}

/// Host-side accuracy of one batch
fn batch_accuracy<B: Backend>(
    activation: OutputActivation,
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2, Int>,
) -> Result<f64> {
    let num_classes = logits.dims()[1];
    let probabilities = match activation {
        OutputActivation::Sigmoid => sigmoid(logits),
        OutputActivation::Softmax => softmax(logits, 1),
    };

    let probabilities = to_host(probabilities)?;
    let targets = to_host(targets.float())?;

    Ok(match activation {
        OutputActivation::Sigmoid => binary_accuracy(&probabilities, &targets, DEFAULT_THRESHOLD),
        OutputActivation::Softmax => categorical_accuracy(&probabilities, &targets, num_classes),
    })
}

fn to_host<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| MamonetError::Training(format!("cannot read tensor data: {:?}", e)))
}

/// Sample-weighted loss and accuracy over a dataset, in batches
pub fn evaluate<B: Backend>(
    model: &MaMoNet<B>,
    dataset: &MultiLabelDataset,
    batcher: &MultiLabelBatcher,
    batch_size: usize,
    device: &B::Device,
) -> Result<(f64, f64)> {
    let items = dataset.items();
    if items.is_empty() {
        return Err(MamonetError::Data("cannot evaluate on an empty dataset".into()));
    }

    let activation = model.output_activation();
    let mut acc = MetricAccumulator::new();

    for chunk in items.chunks(batch_size.max(1)) {
        let chunk: Vec<MultiLabelItem> = chunk.to_vec();
        let n = chunk.len();
        let batch = batcher.try_batch::<B>(chunk, device)?;

        let logits = model.forward(batch.images);
        let loss: f64 = batch_loss(activation, logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        if !loss.is_finite() {
            return Err(MamonetError::Training(format!("validation loss became {}", loss)));
        }
        let accuracy = batch_accuracy(activation, logits, batch.targets)?;
        acc.update(loss, accuracy, n);
    }

    Ok((acc.mean_loss(), acc.mean_accuracy()))
}
