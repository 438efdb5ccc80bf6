//! Infinite augmented batch stream
//!
//! Wraps the training partition in a pull-based, restartable iterator of
//! randomly perturbed batches. Each pass over the partition visits every
//! sample once in a freshly shuffled order; the last batch of a pass may be
//! shorter than `batch_size`. The stream never ends on its own: the trainer
//! decides how many batches to pull.
//!
//! Augmentation runs in parallel with rayon, but every per-image seed is drawn
//! from the stream's own RNG in batch order, so the produced sequence is the
//! same as a strictly sequential pull.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::dataset::augmentation::Augmenter;
use crate::dataset::batcher::MultiLabelItem;
use crate::utils::error::{MamonetError, Result};

pub struct AugmentedStream {
    items: Vec<MultiLabelItem>,
    augmenter: Augmenter,
    batch_size: usize,
    seed: u64,
    rng: ChaCha8Rng,
    order: Vec<usize>,
    cursor: usize,
    passes: usize,
}

impl AugmentedStream {
    pub fn new(
        items: Vec<MultiLabelItem>,
        augmenter: Augmenter,
        batch_size: usize,
        seed: u64,
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(MamonetError::Data(
                "cannot stream batches from an empty training partition".into(),
            ));
        }
        if batch_size == 0 {
            return Err(MamonetError::Config("batch_size must be greater than 0".into()));
        }

        let n = items.len();
        Ok(Self {
            items,
            augmenter,
            batch_size,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            order: (0..n).collect(),
            cursor: n,
            passes: 0,
        })
    }

    /// Rewind to the very first batch; the same sequence is produced again
    pub fn restart(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.order = (0..self.items.len()).collect();
        self.cursor = self.items.len();
        self.passes = 0;
    }

    /// Number of samples in the wrapped partition
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Completed or in-progress passes over the partition
    pub fn passes(&self) -> usize {
        self.passes
    }

    fn next_batch(&mut self) -> Vec<MultiLabelItem> {
        if self.cursor >= self.order.len() {
            self.order.shuffle(&mut self.rng);
            self.cursor = 0;
            self.passes += 1;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let picks: Vec<(usize, u64)> = self.order[self.cursor..end]
            .iter()
            .map(|&i| (i, self.rng.gen::<u64>()))
            .collect();
        self.cursor = end;

        let items = &self.items;
        let augmenter = &self.augmenter;
        picks
            .par_iter()
            .map(|&(i, seed)| {
                let item = &items[i];
                MultiLabelItem::new(augmenter.augment_seeded(&item.image, seed), item.targets.clone())
            })
            .collect()
    }
}

impl Iterator for AugmentedStream {
    type Item = Vec<MultiLabelItem>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}
