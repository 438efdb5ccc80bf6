//! Train/test partitioning
//!
//! The corpus is shuffled with a seeded `ChaCha8Rng` and cut into a training
//! and a held-out partition. The same seed and fraction over the same corpus
//! always yields the same partition.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::utils::error::{MamonetError, Result};

/// Aligned train/test partitions plus the corpus indices behind them
#[derive(Debug, Clone)]
pub struct DatasetSplit<X, Y> {
    pub train_x: Vec<X>,
    pub test_x: Vec<X>,
    pub train_y: Vec<Y>,
    pub test_y: Vec<Y>,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

impl<X, Y> DatasetSplit<X, Y> {
    pub fn train_len(&self) -> usize {
        self.train_x.len()
    }

    pub fn test_len(&self) -> usize {
        self.test_x.len()
    }
}

/// Number of held-out samples for a corpus of `n`
pub fn test_size(n: usize, test_fraction: f64) -> usize {
    (test_fraction * n as f64).round() as usize
}

/// Randomly partition aligned `xs`/`ys` into train and test sets
pub fn train_test_split<X, Y>(
    xs: Vec<X>,
    ys: Vec<Y>,
    test_fraction: f64,
    seed: u64,
) -> Result<DatasetSplit<X, Y>> {
    if xs.len() != ys.len() {
        return Err(MamonetError::Data(format!(
            "{} images but {} label vectors",
            xs.len(),
            ys.len()
        )));
    }
    if xs.is_empty() {
        return Err(MamonetError::Data("cannot split an empty corpus".into()));
    }
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(MamonetError::Config(format!(
            "test_fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let n = xs.len();
    let n_test = test_size(n, test_fraction);
    if n_test == 0 || n_test == n {
        return Err(MamonetError::Config(format!(
            "test_fraction {} over {} samples leaves an empty partition",
            test_fraction, n
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let test_indices = order[..n_test].to_vec();
    let train_indices = order[n_test..].to_vec();

    // Move items out in permutation order without cloning
    let mut xs: Vec<Option<X>> = xs.into_iter().map(Some).collect();
    let mut ys: Vec<Option<Y>> = ys.into_iter().map(Some).collect();
    let mut take = |indices: &[usize]| -> (Vec<X>, Vec<Y>) {
        indices
            .iter()
            .filter_map(|&i| Some((xs[i].take()?, ys[i].take()?)))
            .unzip()
    };
    let (test_x, test_y) = take(&test_indices[..]);
    let (train_x, train_y) = take(&train_indices[..]);

    info!(
        "Split {} samples: {} train, {} test (seed {})",
        n,
        train_x.len(),
        test_x.len(),
        seed
    );

    Ok(DatasetSplit {
        train_x,
        test_x,
        train_y,
        test_y,
        train_indices,
        test_indices,
    })
}
