//! End-to-end training run
//!
//! load -> encode -> split -> stream -> compile -> fit -> persist
//!
//! Every stage runs in sequence under one explicit `RunConfig`. The first
//! failure aborts the run.

use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use crate::config::RunConfig;
use crate::dataset::augmentation::Augmenter;
use crate::dataset::batcher::MultiLabelDataset;
use crate::dataset::loader::load_corpus;
use crate::dataset::split::train_test_split;
use crate::dataset::stream::AugmentedStream;
use crate::training::history::TrainingHistory;
use crate::training::trainer::{PersistedArtifacts, Trainer};
use crate::utils::error::Result;

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub num_samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub classes: Vec<String>,
    pub steps_per_epoch: usize,
    pub history: TrainingHistory,
    pub artifacts: PersistedArtifacts,
}

impl RunReport {
    pub fn final_val_accuracy(&self) -> Option<f64> {
        self.history.last().map(|m| m.val_accuracy)
    }
}

/// Run one complete training job
pub fn run_training<B: AutodiffBackend>(config: &RunConfig, device: B::Device) -> Result<RunReport> {
    config.validate()?;

    let corpus = load_corpus(&config.dataset_dir, config.image, &config.label_delimiter)?;
    let targets = corpus.encode_targets()?;
    let num_samples = corpus.len();
    let binarizer = corpus.binarizer;

    let split = train_test_split(corpus.images, targets, config.test_fraction, config.seed)?;
    let steps_per_epoch = Trainer::<B>::steps_per_epoch(split.train_len(), config.batch_size)?;
    let (train_samples, test_samples) = (split.train_len(), split.test_len());

    let train = MultiLabelDataset::new(split.train_x, split.train_y)?;
    let validation = MultiLabelDataset::new(split.test_x, split.test_y)?;
    let mut stream = AugmentedStream::new(
        train.into_items(),
        Augmenter::new(config.augmentation.clone()),
        config.batch_size,
        config.seed,
    )?;

    let classes = binarizer.classes().to_vec();
    let mut trainer = Trainer::<B>::new(config.clone(), binarizer, device);
    trainer.compile()?;
    let history = trainer.fit(&mut stream, &validation)?.clone();
    let artifacts = trainer.persist()?;

    info!(
        "Run finished: {} samples ({} train / {} test), {} labels",
        num_samples,
        train_samples,
        test_samples,
        classes.len()
    );

    Ok(RunReport {
        num_samples,
        train_samples,
        test_samples,
        classes,
        steps_per_epoch,
        history,
        artifacts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TrainingBackend;
    use crate::config::{ImageDims, ModelSettings};
    use crate::dataset::binarizer::MultiLabelBinarizer;
    use crate::model::artifact::load_model_metadata;
    use crate::utils::error::MamonetError;
    use image::{ImageBuffer, Rgb};
    use std::path::Path;

    const COLORS: [(&str, [u8; 3]); 3] = [
        ("black", [20, 20, 20]),
        ("blue", [30, 60, 200]),
        ("red", [210, 40, 30]),
    ];
    const KINDS: [&str; 3] = ["dress", "jeans", "shirt"];

    /// 100 images spread over the 9 color_kind directories
    fn write_corpus(root: &Path, size: u32) {
        for i in 0..100u32 {
            let (color, rgb) = COLORS[(i % 9 / 3) as usize];
            let kind = KINDS[(i % 3) as usize];
            let dir = root.join(format!("{}_{}", color, kind));
            std::fs::create_dir_all(&dir).unwrap();

            let img = ImageBuffer::from_fn(size, size, |x, y| {
                // a crude per-kind pattern on top of the base color
                let stripe = match kind {
                    "dress" => x < size / 2,
                    "jeans" => y < size / 2,
                    _ => (x + y) % 4 < 2,
                };
                let shade = if stripe { 40 } else { 0 };
                Rgb([
                    rgb[0].saturating_add(shade),
                    rgb[1].saturating_add(shade),
                    rgb[2].saturating_add((i % 7) as u8),
                ])
            });
            img.save(dir.join(format!("{:04}.png", i))).unwrap();
        }
    }

    fn run_config(root: &Path, dims: ImageDims) -> RunConfig {
        let out = root.join("out");
        let mut config = RunConfig {
            dataset_dir: root.join("dataset"),
            image: dims,
            epochs: 2,
            batch_size: 8,
            seed: 42,
            test_fraction: 0.2,
            model: ModelSettings {
                base_filters: 4,
                dense_units: 16,
                ..Default::default()
            },
            ..Default::default()
        };
        config.output.model_path = out.join("mamonet.model");
        config.output.label_path = out.join("mlb.json");
        config.output.plot_path = out.join("plot.svg");
        config.output.history_path = Some(out.join("history.json"));
        config
    }

    fn check_run(config: &RunConfig, report: &RunReport) {
        assert_eq!(report.num_samples, 100);
        assert_eq!(report.test_samples, 20);
        assert_eq!(report.train_samples, 80);
        assert_eq!(report.steps_per_epoch, 10);
        assert_eq!(
            report.classes,
            vec!["black", "blue", "dress", "jeans", "red", "shirt"]
        );

        assert_eq!(report.history.len(), 2);
        for m in report.history.epochs() {
            assert!(m.is_valid(), "{:?}", m);
        }

        let metadata = load_model_metadata(&config.output.model_path).unwrap();
        assert_eq!(metadata.architecture.input_dims(), config.image);
        assert_eq!(metadata.architecture.num_classes, 6);
        assert_eq!(metadata.epochs, 2);

        let mlb = MultiLabelBinarizer::load(&config.output.label_path).unwrap();
        assert_eq!(mlb.len(), 6);
        for label in &report.classes {
            let vector = mlb.encode(&[label.as_str()]).unwrap();
            assert_eq!(mlb.decode(&vector).unwrap(), vec![label.clone()]);
        }

        let svg = std::fs::read_to_string(&config.output.plot_path).unwrap();
        for name in ["train_loss", "val_loss", "train_acc", "val_acc"] {
            let marker = format!("data-series=\"{}\"", name);
            assert_eq!(svg.matches(&marker).count(), 2);
        }

        assert!(config.output.history_path.as_ref().unwrap().is_file());
    }

    #[test]
    fn test_end_to_end_small_images() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(&dir.path().join("dataset"), 24);
        let config = run_config(dir.path(), ImageDims::new(24, 24, 3));

        let report = run_training::<TrainingBackend>(&config, Default::default()).unwrap();
        check_run(&config, &report);
    }

    #[test]
    #[ignore = "full 96x96 run, slow on CPU"]
    fn test_end_to_end_default_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(&dir.path().join("dataset"), 96);
        let config = run_config(dir.path(), ImageDims::new(96, 96, 3));

        let report = run_training::<TrainingBackend>(&config, Default::default()).unwrap();
        check_run(&config, &report);
    }

    #[test]
    fn test_empty_corpus_fails_before_training() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dataset").join("red_dress")).unwrap();
        let config = run_config(dir.path(), ImageDims::new(24, 24, 3));

        let result = run_training::<TrainingBackend>(&config, Default::default());
        assert!(matches!(result, Err(MamonetError::Data(_))));
        assert!(!config.output.model_path.exists());
    }

    #[test]
    fn test_batch_larger_than_partition_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(&dir.path().join("dataset"), 24);
        let mut config = run_config(dir.path(), ImageDims::new(24, 24, 3));
        config.batch_size = 81;

        let result = run_training::<TrainingBackend>(&config, Default::default());
        assert!(matches!(result, Err(MamonetError::Config(_))));
        assert!(!config.output.model_path.exists());
        assert!(!config.output.plot_path.exists());
    }

    #[test]
    fn test_invalid_config_rejected_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = run_config(dir.path(), ImageDims::new(24, 24, 3));
        config.epochs = 0;

        // The dataset does not exist either; configuration is checked first
        let result = run_training::<TrainingBackend>(&config, Default::default());
        assert!(matches!(result, Err(MamonetError::Config(_))));
    }
}
