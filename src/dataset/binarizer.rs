//! Multi-label binarizer
//!
//! Fitted, ordered vocabulary mapping label strings to multi-hot vector
//! positions. The model's output vector is meaningless without it, so it is
//! persisted next to the model artifact.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::{MamonetError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiLabelBinarizer {
    classes: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl MultiLabelBinarizer {
    /// Fit the vocabulary: every distinct label, sorted
    pub fn fit<S: AsRef<str>>(label_sets: &[Vec<S>]) -> Result<Self> {
        let classes: BTreeSet<String> = label_sets
            .iter()
            .flat_map(|set| set.iter().map(|l| l.as_ref().to_string()))
            .collect();

        if classes.is_empty() {
            return Err(MamonetError::Data(
                "cannot fit a label vocabulary without labels".into(),
            ));
        }

        Ok(Self::from_classes(classes.into_iter().collect()))
    }

    fn from_classes(classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { classes, index }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Multi-hot vector for one label set
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.classes.len()];
        for label in labels {
            let label = label.as_ref();
            let i = self.index_of(label).ok_or_else(|| {
                MamonetError::Data(format!("label '{}' is not in the vocabulary", label))
            })?;
            vector[i] = 1.0;
        }
        Ok(vector)
    }

    /// Encode every label set, keeping order
    pub fn transform<S: AsRef<str>>(&self, label_sets: &[Vec<S>]) -> Result<Vec<Vec<f32>>> {
        label_sets.iter().map(|set| self.encode(set)).collect()
    }

    /// Labels at the active positions of a multi-hot vector
    pub fn decode(&self, vector: &[f32]) -> Result<Vec<String>> {
        self.decode_probabilities(vector, 0.5)
    }

    /// Labels whose probability exceeds `threshold`
    pub fn decode_probabilities(&self, probabilities: &[f32], threshold: f32) -> Result<Vec<String>> {
        if probabilities.len() != self.classes.len() {
            return Err(MamonetError::shape(
                format!("vector of width {}", self.classes.len()),
                format!("width {}", probabilities.len()),
            ));
        }

        Ok(probabilities
            .iter()
            .zip(self.classes.iter())
            .filter(|(p, _)| **p > threshold)
            .map(|(_, c)| c.clone())
            .collect())
    }

    /// Write the vocabulary as JSON; failures are persistence errors
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MamonetError::persist(path, e))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MamonetError::persist(path, e))?;
        }
        std::fs::write(path, json).map_err(|e| MamonetError::persist(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let parsed: Self = serde_json::from_str(&json)
            .map_err(|e| MamonetError::Serialization(format!("{:?}: {}", path, e)))?;
        Ok(Self::from_classes(parsed.classes))
    }
}
