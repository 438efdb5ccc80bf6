//! Labeled Corpus Loader
//!
//! Loads a labeled image corpus from disk. The label set of an image is
//! inferred from its parent directory, split on a delimiter:
//!
//! ```text
//! dataset/
//! ├── black_jeans/
//! │   ├── 00000001.jpg
//! │   └── ...
//! ├── red_dress/
//! │   └── ...
//! └── ...
//! ```
//!
//! Every image is decoded and resized to the configured dimensions. Images
//! and label sets are returned index-aligned, in sorted path order.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::ImageDims;
use crate::dataset::binarizer::MultiLabelBinarizer;
use crate::dataset::image::ImageTensor;
use crate::utils::error::{MamonetError, Result};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

/// One image file and the labels inferred for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub path: PathBuf,
    pub labels: Vec<String>,
}

/// A fully decoded corpus with its fitted vocabulary
#[derive(Debug, Clone)]
pub struct LoadedCorpus {
    pub images: Vec<ImageTensor>,
    pub label_sets: Vec<Vec<String>>,
    pub binarizer: MultiLabelBinarizer,
    pub paths: Vec<PathBuf>,
}

impl LoadedCorpus {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Multi-hot target vectors, aligned with `images`
    pub fn encode_targets(&self) -> Result<Vec<Vec<f32>>> {
        self.binarizer.transform(&self.label_sets)
    }
}

/// Split a class directory name into its label set.
///
/// Empty tokens are dropped and duplicates removed; order is preserved.
pub fn labels_from_dir_name(name: &str, delimiter: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for token in name.split(delimiter).map(str::trim).filter(|t| !t.is_empty()) {
        if !labels.iter().any(|l| l == token) {
            labels.push(token.to_string());
        }
    }
    labels
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Walk the corpus and infer a label set for every image file
pub fn discover_corpus(root: &Path, delimiter: &str) -> Result<Vec<CorpusEntry>> {
    if !root.is_dir() {
        return Err(MamonetError::Data(format!(
            "dataset directory does not exist: {:?}",
            root
        )));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(2)
        .follow_links(true)
        .sort_by_file_name()
    {
        // An unreadable directory would silently shrink the corpus and vocabulary
        let entry = entry.map_err(|e| {
            let at = e.path().unwrap_or(root).to_path_buf();
            MamonetError::Data(format!("cannot read corpus entry {:?}: {}", at, e))
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_image_file(path) {
            continue;
        }

        let dir_name = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let labels = labels_from_dir_name(&dir_name, delimiter);
        if labels.is_empty() {
            return Err(MamonetError::Data(format!(
                "no labels can be inferred for {:?} (directory '{}')",
                path, dir_name
            )));
        }

        entries.push(CorpusEntry {
            path: path.to_path_buf(),
            labels,
        });
    }

    debug!("Discovered {} image files under {:?}", entries.len(), root);
    Ok(entries)
}

/// Load, decode, and label the whole corpus
pub fn load_corpus(root: &Path, dims: ImageDims, delimiter: &str) -> Result<LoadedCorpus> {
    info!("Loading corpus from: {:?}", root);

    let entries = discover_corpus(root, delimiter)?;
    if entries.is_empty() {
        return Err(MamonetError::Data(format!(
            "no images found under {:?}",
            root
        )));
    }

    let progress = ProgressBar::new(entries.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let images = entries
        .par_iter()
        .map(|entry| {
            let tensor = ImageTensor::from_path(&entry.path, dims)?;
            tensor.check_dims(dims)?;
            progress.inc(1);
            Ok(tensor)
        })
        .collect::<Result<Vec<_>>>();
    progress.finish_and_clear();
    let images = images?;

    let (paths, label_sets): (Vec<_>, Vec<_>) =
        entries.into_iter().map(|e| (e.path, e.labels)).unzip();

    let binarizer = MultiLabelBinarizer::fit(&label_sets)?;
    info!(
        "Loaded {} images ({}) with {} labels: {:?}",
        images.len(),
        dims,
        binarizer.len(),
        binarizer.classes()
    );

    Ok(LoadedCorpus {
        images,
        label_sets,
        binarizer,
        paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn write_image(dir: &Path, name: &str, color: [u8; 3]) {
        std::fs::create_dir_all(dir).unwrap();
        let img = ImageBuffer::from_pixel(20, 16, Rgb(color));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_labels_from_dir_name() {
        assert_eq!(labels_from_dir_name("red_dress", "_"), vec!["red", "dress"]);
        assert_eq!(labels_from_dir_name("__blue__", "_"), vec!["blue"]);
        assert_eq!(labels_from_dir_name("a_a_b", "_"), vec!["a", "b"]);
        assert!(labels_from_dir_name("___", "_").is_empty());
        assert_eq!(labels_from_dir_name("red-shirt", "-"), vec!["red", "shirt"]);
    }

    #[test]
    fn test_load_corpus() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("red_dress"), "0.png", [200, 10, 10]);
        write_image(&dir.path().join("red_dress"), "1.png", [210, 20, 20]);
        write_image(&dir.path().join("blue_jeans"), "0.png", [10, 10, 200]);
        std::fs::write(dir.path().join("blue_jeans").join("notes.txt"), "skip me").unwrap();

        let dims = ImageDims::new(8, 8, 3);
        let corpus = load_corpus(dir.path(), dims, "_").unwrap();

        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.binarizer.classes(), &["blue", "dress", "jeans", "red"]);
        // sorted path order: blue_jeans before red_dress
        assert_eq!(corpus.label_sets[0], vec!["blue", "jeans"]);
        assert_eq!(corpus.label_sets[2], vec!["red", "dress"]);
        assert!(corpus.images.iter().all(|img| img.dims() == dims));
        assert!(corpus.images[0].get(2, 4, 4) > 0.7);

        let targets = corpus.encode_targets().unwrap();
        assert_eq!(targets[0], vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_empty_corpus_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("red_dress")).unwrap();
        let result = load_corpus(dir.path(), ImageDims::new(8, 8, 3), "_");
        assert!(matches!(result, Err(MamonetError::Data(_))));
    }

    #[test]
    fn test_missing_directory_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_corpus(&dir.path().join("nope"), ImageDims::new(8, 8, 3), "_");
        assert!(matches!(result, Err(MamonetError::Data(_))));
    }

    #[test]
    fn test_undecodable_image_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("red_dress"), "0.png", [200, 10, 10]);
        std::fs::write(dir.path().join("red_dress").join("1.png"), b"garbage").unwrap();
        let result = load_corpus(dir.path(), ImageDims::new(8, 8, 3), "_");
        assert!(matches!(result, Err(MamonetError::ImageDecode(_, _))));
    }

    #[test]
    fn test_unlabelable_directory_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("___"), "0.png", [1, 2, 3]);
        assert!(matches!(
            discover_corpus(dir.path(), "_"),
            Err(MamonetError::Data(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("red_dress"), "0.png", [200, 10, 10]);
        std::os::unix::fs::symlink(dir.path(), dir.path().join("red_dress").join("again")).unwrap();

        assert!(matches!(
            discover_corpus(dir.path(), "_"),
            Err(MamonetError::Data(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_label_directory_is_data_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("red_dress"), "0.png", [200, 10, 10]);
        let locked = dir.path().join("blue_jeans");
        write_image(&locked, "0.png", [10, 10, 200]);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can still list the directory; nothing to check then
        let readable = std::fs::read_dir(&locked).is_ok();
        let result = discover_corpus(dir.path(), "_");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        if !readable {
            assert!(matches!(result, Err(MamonetError::Data(_))));
        }
    }
}
