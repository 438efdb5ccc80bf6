//! Model artifact persistence
//!
//! A trained network is stored as a single tar.gz file:
//!
//! - `metadata.json` - architecture config, vocabulary, and training provenance
//! - `model.bin`     - parameter record (Burn binary, full precision)
//!
//! The architecture config is enough to rebuild an empty network, which the
//! record is then loaded into.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tar::{Archive, Builder};
use tempfile::NamedTempFile;
use tracing::info;

use crate::model::mamonet::{MaMoNet, MaMoNetConfig};
use crate::utils::error::{MamonetError, Result};

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// Bumped whenever the archive layout changes
pub const ARTIFACT_VERSION: u32 = 1;

/// Everything needed to rebuild and interpret a trained network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub version: u32,
    pub architecture: MaMoNetConfig,
    /// Label vocabulary in output order
    pub classes: Vec<String>,
    pub epochs: usize,
    pub final_val_loss: Option<f64>,
    pub final_val_accuracy: Option<f64>,
    /// RFC 3339 timestamp
    pub trained_at: String,
    pub backend: String,
}

impl ModelMetadata {
    pub fn new(architecture: MaMoNetConfig, classes: Vec<String>, epochs: usize) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            architecture,
            classes,
            epochs,
            final_val_loss: None,
            final_val_accuracy: None,
            trained_at: chrono::Utc::now().to_rfc3339(),
            backend: crate::backend::backend_name().to_string(),
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| MamonetError::Serialization(e.to_string()))
    }

    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MamonetError::Serialization(e.to_string()))
    }
}

fn append_entry<W: Write>(builder: &mut Builder<W>, name: &str, bytes: &[u8]) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, bytes)
}

/// Write the network and its metadata to exactly `path`
pub fn save_model_artifact<B: Backend>(
    path: &Path,
    model: &MaMoNet<B>,
    metadata: &ModelMetadata,
) -> Result<()> {
    let persist = |e: &dyn std::fmt::Display| MamonetError::persist(path, e);

    let json = metadata.to_json_string().map_err(|e| persist(&e))?;
    let record = BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(model.clone().into_record(), ())
        .map_err(|e| persist(&format!("{:?}", e)))?;

    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| persist(&e))?;

    // Staged next to the destination; a failed write never leaves a partial artifact at `path`
    let staged = NamedTempFile::new_in(parent).map_err(|e| persist(&e))?;
    let mut builder = Builder::new(GzEncoder::new(staged, Compression::default()));
    append_entry(&mut builder, METADATA_ENTRY, json.as_bytes()).map_err(|e| persist(&e))?;
    append_entry(&mut builder, MODEL_ENTRY, &record).map_err(|e| persist(&e))?;
    let staged = builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| persist(&e))?;
    staged.as_file().sync_all().map_err(|e| persist(&e))?;
    staged.persist(path).map_err(|e| persist(&e.error))?;

    info!("Saved model artifact to {:?} ({} parameter bytes)", path, record.len());
    Ok(())
}

fn read_entries(path: &Path, wanted: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
    let file = File::open(path)
        .map_err(|e| MamonetError::Model(format!("cannot open model artifact {:?}: {}", path, e)))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut found = vec![None; wanted.len()];

    let corrupt = |e: std::io::Error| {
        MamonetError::Model(format!("model artifact {:?} is unreadable: {}", path, e))
    };
    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let name = entry.path().map_err(corrupt)?.to_string_lossy().to_string();
        if let Some(i) = wanted.iter().position(|w| *w == name) {
            let mut buffer = Vec::new();
            entry.read_to_end(&mut buffer).map_err(corrupt)?;
            found[i] = Some(buffer);
        }
    }

    Ok(found)
}

fn missing(path: &Path, entry: &str) -> MamonetError {
    MamonetError::Model(format!("{} not found in model artifact {:?}", entry, path))
}

fn parse_metadata(path: &Path, bytes: Vec<u8>) -> Result<ModelMetadata> {
    let json = String::from_utf8(bytes)
        .map_err(|e| MamonetError::Model(format!("{:?}: {}", path, e)))?;
    let metadata = ModelMetadata::from_json_string(&json)?;
    if metadata.version != ARTIFACT_VERSION {
        return Err(MamonetError::Model(format!(
            "unsupported artifact version {} in {:?}",
            metadata.version, path
        )));
    }
    Ok(metadata)
}

/// Read only the metadata of a model artifact
pub fn load_model_metadata(path: &Path) -> Result<ModelMetadata> {
    let mut entries = read_entries(path, &[METADATA_ENTRY])?;
    let bytes = entries
        .pop()
        .flatten()
        .ok_or_else(|| missing(path, METADATA_ENTRY))?;
    parse_metadata(path, bytes)
}

/// Rebuild a trained network from its artifact
pub fn load_model_artifact<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(MaMoNet<B>, ModelMetadata)> {
    let mut entries = read_entries(path, &[METADATA_ENTRY, MODEL_ENTRY])?.into_iter();
    let metadata_bytes = entries
        .next()
        .flatten()
        .ok_or_else(|| missing(path, METADATA_ENTRY))?;
    let model_bytes = entries
        .next()
        .flatten()
        .ok_or_else(|| missing(path, MODEL_ENTRY))?;

    let metadata = parse_metadata(path, metadata_bytes)?;
    let model = metadata.architecture.init::<B>(device)?;

    let record = BinBytesRecorder::<FullPrecisionSettings>::default()
        .load(model_bytes, device)
        .map_err(|e| MamonetError::Model(format!("cannot load parameters from {:?}: {:?}", path, e)))?;
    let model = model.load_record(record);

    info!(
        "Loaded {} model from {:?} ({} classes, input {})",
        metadata.architecture.output_activation,
        path,
        model.num_classes(),
        model.input_dims()
    );
    Ok((model, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend as B;
    use crate::config::ImageDims;
    use burn::tensor::{Distribution, Tensor};

    fn small_config() -> MaMoNetConfig {
        MaMoNetConfig::new(3, 24, 24, 3)
            .with_base_filters(4)
            .with_dense_units(8)
    }

    #[test]
    fn test_save_load_preserves_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mamonet.model");
        let device = Default::default();

        let config = small_config();
        let model: MaMoNet<B> = config.init(&device).unwrap();
        let metadata = ModelMetadata::new(config, vec!["a".into(), "b".into(), "c".into()], 2);
        save_model_artifact(&path, &model, &metadata).unwrap();
        assert!(path.is_file());

        let (loaded, loaded_meta) = load_model_artifact::<B>(&path, &device).unwrap();
        assert_eq!(loaded_meta.classes, vec!["a", "b", "c"]);
        assert_eq!(loaded.input_dims(), ImageDims::new(24, 24, 3));
        assert_eq!(loaded.num_classes(), 3);

        // No autodiff here, so dropout is inactive and batch norm uses running stats
        let input = Tensor::<B, 4>::random([1, 3, 24, 24], Distribution::Default, &device);
        let expected: Vec<f32> = model.forward(input.clone()).into_data().convert::<f32>().to_vec().unwrap();
        let actual: Vec<f32> = loaded.forward(input).into_data().convert::<f32>().to_vec().unwrap();
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-5);
        }
    }

    #[test]
    fn test_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.model");
        let device = Default::default();
        let config = small_config();
        let model: MaMoNet<B> = config.init(&device).unwrap();
        save_model_artifact(&path, &model, &ModelMetadata::new(config, vec!["x".to_string(); 3], 5)).unwrap();

        let metadata = load_model_metadata(&path).unwrap();
        assert_eq!(metadata.epochs, 5);
        assert_eq!(metadata.architecture.height, 24);
        assert_eq!(metadata.version, ARTIFACT_VERSION);
    }

    #[test]
    fn test_missing_artifact_is_model_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_model_metadata(&dir.path().join("absent.model"));
        assert!(matches!(result, Err(MamonetError::Model(_))));
    }

    #[test]
    fn test_unwritable_destination_is_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let device = Default::default();
        let config = small_config();
        let model: MaMoNet<B> = config.init(&device).unwrap();

        let result = save_model_artifact(
            &blocker.join("mamonet.model"),
            &model,
            &ModelMetadata::new(config, vec![], 1),
        );
        assert!(result.unwrap_err().is_persistence());
    }

    #[test]
    fn test_failed_save_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory already occupies the destination, so the final rename fails
        let target = dir.path().join("mamonet.model");
        std::fs::create_dir_all(target.join("occupied")).unwrap();
        let device = Default::default();
        let config = small_config();
        let model: MaMoNet<B> = config.init(&device).unwrap();

        let result = save_model_artifact(&target, &model, &ModelMetadata::new(config, vec![], 1));
        assert!(result.unwrap_err().is_persistence());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("mamonet.model")]);
        assert!(target.is_dir());
    }

    #[test]
    fn test_save_replaces_existing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.model");
        std::fs::write(&path, b"stale").unwrap();
        let device = Default::default();
        let config = small_config();
        let model: MaMoNet<B> = config.init(&device).unwrap();

        save_model_artifact(&path, &model, &ModelMetadata::new(config, vec!["a".into(); 3], 4)).unwrap();
        assert_eq!(load_model_metadata(&path).unwrap().epochs, 4);
    }
}
