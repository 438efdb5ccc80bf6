//! Inference Predictor Module
//!
//! Loads a persisted model artifact plus its label vocabulary and scores new
//! images. Images are preprocessed exactly as during training: decoded,
//! resized to the model's input dimensions, normalized to [0, 1].

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ImageDims;
use crate::dataset::binarizer::MultiLabelBinarizer;
use crate::dataset::image::ImageTensor;
use crate::model::artifact::{load_model_artifact, ModelMetadata};
use crate::model::mamonet::MaMoNet;
use crate::utils::error::{MamonetError, Result};
use crate::utils::metrics::DEFAULT_THRESHOLD;

/// One label and its predicted probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub probability: f32,
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Path to the input image (if applicable)
    pub image_path: Option<PathBuf>,

    /// Every label with its probability, highest first
    pub scores: Vec<LabelScore>,

    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl Prediction {
    fn new(labels: &[String], probabilities: &[f32], elapsed: Duration, image_path: Option<PathBuf>) -> Self {
        let mut scores: Vec<LabelScore> = labels
            .iter()
            .zip(probabilities)
            .map(|(label, &probability)| LabelScore {
                label: label.clone(),
                probability,
            })
            .collect();
        scores.sort_by(|a, b| b.probability.total_cmp(&a.probability));

        Self {
            image_path,
            scores,
            inference_time_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    /// The `k` most probable labels
    pub fn top_k(&self, k: usize) -> &[LabelScore] {
        &self.scores[..k.min(self.scores.len())]
    }

    /// Labels whose probability exceeds `threshold`
    pub fn labels_above(&self, threshold: f32) -> Vec<&str> {
        self.scores
            .iter()
            .filter(|s| s.probability > threshold)
            .map(|s| s.label.as_str())
            .collect()
    }

    /// Labels predicted at the default 0.5 threshold
    pub fn predicted_labels(&self) -> Vec<&str> {
        self.labels_above(DEFAULT_THRESHOLD)
    }

    /// Pretty print the top `k` scores
    pub fn display(&self, k: usize) -> String {
        let mut output = String::new();

        if let Some(path) = &self.image_path {
            output.push_str(&format!("Image: {:?}\n", path));
        }
        for score in self.top_k(k) {
            output.push_str(&format!("{}: {:.2}%\n", score.label, score.probability * 100.0));
        }
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));

        output
    }
}

/// Predictor for running inference with a trained model
pub struct Predictor<B: Backend> {
    model: MaMoNet<B>,
    binarizer: MultiLabelBinarizer,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Load a model artifact and the vocabulary it was trained with
    pub fn load(model_path: &Path, label_path: &Path, device: B::Device) -> Result<Self> {
        let (model, metadata) = load_model_artifact::<B>(model_path, &device)?;
        let binarizer = MultiLabelBinarizer::load(label_path)?;

        if binarizer.classes() != metadata.classes.as_slice() || binarizer.len() != model.num_classes() {
            return Err(MamonetError::Model(format!(
                "vocabulary {:?} ({} labels) does not match model {:?} ({} outputs)",
                label_path,
                binarizer.len(),
                model_path,
                model.num_classes()
            )));
        }

        Ok(Self {
            model,
            binarizer,
            metadata,
            device,
        })
    }

    pub fn input_dims(&self) -> ImageDims {
        self.model.input_dims()
    }

    pub fn classes(&self) -> &[String] {
        self.binarizer.classes()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Decode, preprocess, and score an image file
    pub fn predict_image(&self, path: &Path) -> Result<Prediction> {
        let tensor = ImageTensor::from_path(path, self.input_dims())?;
        let mut prediction = self.predict_tensor(&tensor)?;
        prediction.image_path = Some(path.to_path_buf());
        Ok(prediction)
    }

    /// Score an already preprocessed image
    pub fn predict_tensor(&self, image: &ImageTensor) -> Result<Prediction> {
        let dims = self.input_dims();
        image.check_dims(dims)?;

        let start = Instant::now();
        let input = Tensor::<B, 4>::from_floats(
            TensorData::new(image.data().to_vec(), [1, dims.depth, dims.height, dims.width]),
            &self.device,
        );
        let probabilities: Vec<f32> = self
            .model
            .forward_probabilities(input)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| MamonetError::Model(format!("cannot read predictions: {:?}", e)))?;
        let elapsed = start.elapsed();

        Ok(Prediction::new(self.binarizer.classes(), &probabilities, elapsed, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend as B;
    use crate::model::artifact::save_model_artifact;
    use crate::model::mamonet::MaMoNetConfig;
    use image::{ImageBuffer, Rgb};

    fn write_model(dir: &Path, classes: &[&str]) -> (PathBuf, PathBuf) {
        let device = Default::default();
        let config = MaMoNetConfig::new(classes.len(), 16, 16, 3)
            .with_base_filters(2)
            .with_dense_units(8);
        let model: MaMoNet<B> = config.init(&device).unwrap();
        let classes: Vec<String> = classes.iter().map(|c| c.to_string()).collect();

        let model_path = dir.join("mamonet.model");
        let label_path = dir.join("mlb.json");
        save_model_artifact(&model_path, &model, &ModelMetadata::new(config, classes.clone(), 1)).unwrap();
        MultiLabelBinarizer::fit(&[classes]).unwrap().save(&label_path).unwrap();
        (model_path, label_path)
    }

    #[test]
    fn test_predict_image_scores_every_label() {
        let dir = tempfile::tempdir().unwrap();
        let (model_path, label_path) = write_model(dir.path(), &["blue", "dress", "red"]);
        let predictor = Predictor::<B>::load(&model_path, &label_path, Default::default()).unwrap();

        let image_path = dir.path().join("probe.png");
        ImageBuffer::from_pixel(40, 30, Rgb([200u8, 20, 20])).save(&image_path).unwrap();

        let prediction = predictor.predict_image(&image_path).unwrap();
        assert_eq!(prediction.scores.len(), 3);
        assert_eq!(prediction.image_path.as_deref(), Some(image_path.as_path()));
        assert!(prediction
            .scores
            .windows(2)
            .all(|w| w[0].probability >= w[1].probability));
        assert!(prediction
            .scores
            .iter()
            .all(|s| (0.0..=1.0).contains(&s.probability)));
        assert_eq!(prediction.top_k(10).len(), 3);
        assert_eq!(predictor.metadata().classes, predictor.classes());
        assert_eq!(predictor.metadata().epochs, 1);
    }

    #[test]
    fn test_wrong_tensor_dims_is_shape_error() {
        let dir = tempfile::tempdir().unwrap();
        let (model_path, label_path) = write_model(dir.path(), &["a", "b"]);
        let predictor = Predictor::<B>::load(&model_path, &label_path, Default::default()).unwrap();

        let result = predictor.predict_tensor(&ImageTensor::filled(ImageDims::new(8, 8, 3), 0.5));
        assert!(matches!(result, Err(MamonetError::Shape { .. })));
    }

    #[test]
    fn test_mismatched_vocabulary_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (model_path, _) = write_model(dir.path(), &["a", "b"]);
        let other = dir.path().join("other.json");
        MultiLabelBinarizer::fit(&[vec!["x", "y", "z"]]).unwrap().save(&other).unwrap();

        let result = Predictor::<B>::load(&model_path, &other, Default::default());
        assert!(matches!(result, Err(MamonetError::Model(_))));
    }

    #[test]
    fn test_prediction_threshold() {
        let labels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let prediction = Prediction::new(&labels, &[0.2, 0.9, 0.6], Duration::from_millis(1), None);
        assert_eq!(prediction.scores[0].label, "b");
        assert_eq!(prediction.predicted_labels(), vec!["b", "c"]);
        assert_eq!(prediction.labels_above(0.7), vec!["b"]);
        assert!(prediction.display(2).contains("b: 90.00%"));
    }
}
