//! Data Augmentation Module
//!
//! Randomized geometric augmentation of training images. Every sample drawn
//! for training gets an independent affine transform (rotation, shift, shear,
//! zoom) resampled bilinearly about the image center, followed by optional
//! flips. Pixels that land outside the source image are filled according to
//! the configured [`FillMode`].
//!
//! # Augmentation Strategy
//!
//! - **Training**: fresh random transform per sample, every time it is drawn
//! - **Validation/Test**: no augmentation
//! - **Inference**: no augmentation

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::ImageDims;
use crate::dataset::image::ImageTensor;
use crate::utils::error::{MamonetError, Result};

/// How to fill points sampled outside the source image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Repeat the closest edge pixel
    Nearest,
    /// Use a fixed value
    Constant(f32),
    /// Mirror about the edge (`d c b a | a b c d | d c b a`)
    Reflect,
    /// Tile the image (`a b c d | a b c d | a b c d`)
    Wrap,
}

/// Configuration for data augmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Maximum rotation in degrees (applies ±rotation_range)
    pub rotation_range: f64,
    /// Horizontal shift, as a fraction of width (< 1) or in pixels (>= 1)
    pub width_shift_range: f64,
    /// Vertical shift, as a fraction of height (< 1) or in pixels (>= 1)
    pub height_shift_range: f64,
    /// Shear angle in degrees (applies ±shear_range)
    pub shear_range: f64,
    /// Zoom factor bounds, drawn independently per axis
    pub zoom_range: [f64; 2],
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
    pub fill_mode: FillMode,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_range: 25.0,
            width_shift_range: 0.1,
            height_shift_range: 0.1,
            shear_range: 0.2,
            zoom_range: [0.8, 1.2],
            horizontal_flip: true,
            vertical_flip: false,
            fill_mode: FillMode::Nearest,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations (for validation/inference)
    pub fn none() -> Self {
        Self {
            rotation_range: 0.0,
            width_shift_range: 0.0,
            height_shift_range: 0.0,
            shear_range: 0.0,
            zoom_range: [1.0, 1.0],
            horizontal_flip: false,
            vertical_flip: false,
            fill_mode: FillMode::Nearest,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ranges = [
            ("rotation_range", self.rotation_range),
            ("width_shift_range", self.width_shift_range),
            ("height_shift_range", self.height_shift_range),
            ("shear_range", self.shear_range),
        ];
        for (name, value) in ranges {
            if !value.is_finite() || value < 0.0 {
                return Err(MamonetError::Config(format!(
                    "augmentation {} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        let [lo, hi] = self.zoom_range;
        if !(lo.is_finite() && hi.is_finite() && lo > 0.0 && lo <= hi) {
            return Err(MamonetError::Config(format!(
                "augmentation zoom_range must satisfy 0 < low <= high, got [{}, {}]",
                lo, hi
            )));
        }

        if let FillMode::Constant(v) = self.fill_mode {
            if !v.is_finite() {
                return Err(MamonetError::Config("constant fill value must be finite".into()));
            }
        }

        Ok(())
    }
}

/// One concrete set of transform parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomTransform {
    pub theta: f64,
    /// Row shift in pixels
    pub tx: f64,
    /// Column shift in pixels
    pub ty: f64,
    pub shear: f64,
    pub zx: f64,
    pub zy: f64,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl RandomTransform {
    pub fn identity() -> Self {
        Self {
            theta: 0.0,
            tx: 0.0,
            ty: 0.0,
            shear: 0.0,
            zx: 1.0,
            zy: 1.0,
            flip_horizontal: false,
            flip_vertical: false,
        }
    }

    fn is_affine_identity(&self) -> bool {
        self.theta == 0.0
            && self.tx == 0.0
            && self.ty == 0.0
            && self.shear == 0.0
            && self.zx == 1.0
            && self.zy == 1.0
    }

    /// Output-to-input mapping in (row, col) coordinates, centered on the image
    fn matrix(&self, dims: ImageDims) -> [[f64; 3]; 3] {
        let theta = self.theta.to_radians();
        let shear = self.shear.to_radians();

        let rotation = [
            [theta.cos(), -theta.sin(), 0.0],
            [theta.sin(), theta.cos(), 0.0],
            [0.0, 0.0, 1.0],
        ];
        let shift = [[1.0, 0.0, self.tx], [0.0, 1.0, self.ty], [0.0, 0.0, 1.0]];
        let shear = [
            [1.0, -shear.sin(), 0.0],
            [0.0, shear.cos(), 0.0],
            [0.0, 0.0, 1.0],
        ];
        let zoom = [[self.zx, 0.0, 0.0], [0.0, self.zy, 0.0], [0.0, 0.0, 1.0]];

        let transform = matmul(&matmul(&matmul(&rotation, &shift), &shear), &zoom);

        let o_r = dims.height as f64 / 2.0 - 0.5;
        let o_c = dims.width as f64 / 2.0 - 0.5;
        let offset = [[1.0, 0.0, o_r], [0.0, 1.0, o_c], [0.0, 0.0, 1.0]];
        let reset = [[1.0, 0.0, -o_r], [0.0, 1.0, -o_c], [0.0, 0.0, 1.0]];

        matmul(&matmul(&offset, &transform), &reset)
    }
}

fn matmul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn uniform<R: Rng>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

/// Image augmenter that applies random affine transformations
#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Augmenter that returns its input unchanged
    pub fn no_augmentation() -> Self {
        Self::new(AugmentationConfig::none())
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Draw transform parameters for an image of the given size
    pub fn sample_transform<R: Rng>(&self, rng: &mut R, dims: ImageDims) -> RandomTransform {
        let c = &self.config;

        let theta = uniform(rng, -c.rotation_range, c.rotation_range);

        let mut tx = uniform(rng, -c.height_shift_range, c.height_shift_range);
        if c.height_shift_range < 1.0 {
            tx *= dims.height as f64;
        }
        let mut ty = uniform(rng, -c.width_shift_range, c.width_shift_range);
        if c.width_shift_range < 1.0 {
            ty *= dims.width as f64;
        }

        let shear = uniform(rng, -c.shear_range, c.shear_range);

        let [lo, hi] = c.zoom_range;
        let (zx, zy) = if lo == 1.0 && hi == 1.0 {
            (1.0, 1.0)
        } else {
            (uniform(rng, lo, hi), uniform(rng, lo, hi))
        };

        let flip_horizontal = c.horizontal_flip && rng.gen::<f64>() < 0.5;
        let flip_vertical = c.vertical_flip && rng.gen::<f64>() < 0.5;

        RandomTransform {
            theta,
            tx,
            ty,
            shear,
            zx,
            zy,
            flip_horizontal,
            flip_vertical,
        }
    }

    /// Apply a concrete transform. Output dims equal input dims.
    pub fn apply_transform(&self, img: &ImageTensor, transform: &RandomTransform) -> ImageTensor {
        let dims = img.dims();
        let mut result = img.clone();
        if !transform.is_affine_identity() {
            let warped = self.resample(img, transform.matrix(dims));
            result.data_mut().copy_from_slice(&warped);
        }
        let out = result.data_mut();

        if transform.flip_horizontal {
            for row in out.chunks_mut(dims.width) {
                row.reverse();
            }
        }

        if transform.flip_vertical {
            let plane = dims.height * dims.width;
            for channel in out.chunks_mut(plane) {
                for y in 0..dims.height / 2 {
                    let (top, bottom) = channel.split_at_mut((dims.height - 1 - y) * dims.width);
                    top[y * dims.width..(y + 1) * dims.width].swap_with_slice(&mut bottom[..dims.width]);
                }
            }
        }

        result
    }

    /// Sample a transform and apply it
    pub fn random_transform<R: Rng>(&self, img: &ImageTensor, rng: &mut R) -> ImageTensor {
        let transform = self.sample_transform(rng, img.dims());
        self.apply_transform(img, &transform)
    }

    /// Deterministic augmentation from a per-sample seed
    pub fn augment_seeded(&self, img: &ImageTensor, seed: u64) -> ImageTensor {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.random_transform(img, &mut rng)
    }

    fn resample(&self, img: &ImageTensor, m: [[f64; 3]; 3]) -> Vec<f32> {
        let dims = img.dims();
        let mut out = vec![0.0f32; dims.numel()];

        for r in 0..dims.height {
            for col in 0..dims.width {
                let (rf, cf) = (r as f64, col as f64);
                let src_r = m[0][0] * rf + m[0][1] * cf + m[0][2];
                let src_c = m[1][0] * rf + m[1][1] * cf + m[1][2];
                for ch in 0..dims.depth {
                    out[(ch * dims.height + r) * dims.width + col] =
                        self.bilinear_sample(img, ch, src_r, src_c);
                }
            }
        }

        out
    }

    /// Sample a channel using bilinear interpolation
    fn bilinear_sample(&self, img: &ImageTensor, ch: usize, r: f64, c: f64) -> f32 {
        let dims = img.dims();

        // Nearest clamps the coordinate itself rather than each neighbor
        let (r, c) = match self.config.fill_mode {
            FillMode::Nearest => (
                r.clamp(0.0, (dims.height - 1) as f64),
                c.clamp(0.0, (dims.width - 1) as f64),
            ),
            _ => (r, c),
        };

        let r0 = r.floor();
        let c0 = c.floor();
        let fr = (r - r0) as f32;
        let fc = (c - c0) as f32;
        let (r0, c0) = (r0 as i64, c0 as i64);

        let v00 = self.pixel(img, ch, r0, c0);
        let v01 = self.pixel(img, ch, r0, c0 + 1);
        let v10 = self.pixel(img, ch, r0 + 1, c0);
        let v11 = self.pixel(img, ch, r0 + 1, c0 + 1);

        v00 * (1.0 - fr) * (1.0 - fc) + v01 * (1.0 - fr) * fc + v10 * fr * (1.0 - fc) + v11 * fr * fc
    }

    fn pixel(&self, img: &ImageTensor, ch: usize, r: i64, c: i64) -> f32 {
        let dims = img.dims();
        let rows = dims.height as i64;
        let cols = dims.width as i64;

        let map = |i: i64, n: i64| -> Option<usize> {
            let mapped = match self.config.fill_mode {
                FillMode::Nearest => i.clamp(0, n - 1),
                FillMode::Constant(_) => {
                    if i < 0 || i >= n {
                        return None;
                    }
                    i
                }
                FillMode::Reflect => {
                    let period = 2 * n;
                    let m = i.rem_euclid(period);
                    if m >= n {
                        period - 1 - m
                    } else {
                        m
                    }
                }
                FillMode::Wrap => i.rem_euclid(n),
            };
            Some(mapped as usize)
        };

        match (map(r, rows), map(c, cols)) {
            (Some(r), Some(c)) => img.get(ch, r, c),
            _ => match self.config.fill_mode {
                FillMode::Constant(v) => v,
                _ => 0.0,
            },
        }
    }
}
