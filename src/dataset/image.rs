//! Channel-first image tensors on the host
//!
//! Pixels are stored as `f32` in `[0, 1]`, laid out `[depth, height, width]`
//! so a batch can be handed to Burn without re-ordering.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};

use crate::config::ImageDims;
use crate::utils::error::{MamonetError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    dims: ImageDims,
}

impl ImageTensor {
    /// Wrap raw CHW data, checking that its length matches `dims`
    pub fn new(data: Vec<f32>, dims: ImageDims) -> Result<Self> {
        if data.len() != dims.numel() {
            return Err(MamonetError::shape(
                format!("{} values ({})", dims.numel(), dims),
                format!("{} values", data.len()),
            ));
        }
        Ok(Self { data, dims })
    }

    /// Image with every value set to `value`
    pub fn filled(dims: ImageDims, value: f32) -> Self {
        Self {
            data: vec![value; dims.numel()],
            dims,
        }
    }

    /// Resize and normalize a decoded image to exactly `dims`
    pub fn from_image(img: &DynamicImage, dims: ImageDims) -> Result<Self> {
        let resized = img.resize_exact(dims.width as u32, dims.height as u32, FilterType::Triangle);
        let plane = dims.height * dims.width;
        let mut data = vec![0.0f32; dims.numel()];

        match dims.depth {
            1 => {
                let luma = resized.to_luma8();
                for (x, y, pixel) in luma.enumerate_pixels() {
                    data[y as usize * dims.width + x as usize] = pixel[0] as f32 / 255.0;
                }
            }
            3 => {
                let rgb = resized.to_rgb8();
                for (x, y, pixel) in rgb.enumerate_pixels() {
                    let offset = y as usize * dims.width + x as usize;
                    for c in 0..3 {
                        data[c * plane + offset] = pixel[c] as f32 / 255.0;
                    }
                }
            }
            other => {
                return Err(MamonetError::Config(format!(
                    "unsupported image depth {}",
                    other
                )))
            }
        }

        let (w, h) = (resized.width() as usize, resized.height() as usize);
        if (h, w) != (dims.height, dims.width) {
            return Err(MamonetError::shape(dims, format!("{}x{}x{}", h, w, dims.depth)));
        }

        Self::new(data, dims)
    }

    /// Decode an image file and convert it to `dims`
    pub fn from_path(path: &Path, dims: ImageDims) -> Result<Self> {
        let img = ImageReader::open(path)
            .map_err(|e| MamonetError::ImageDecode(path.to_path_buf(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| MamonetError::ImageDecode(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| MamonetError::ImageDecode(path.to_path_buf(), e.to_string()))?;

        Self::from_image(&img, dims)
    }

    pub fn dims(&self) -> ImageDims {
        self.dims
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Value at channel `c`, row `y`, column `x`
    pub fn get(&self, c: usize, y: usize, x: usize) -> f32 {
        self.data[(c * self.dims.height + y) * self.dims.width + x]
    }

    /// Verify this tensor matches the configured dimensions
    pub fn check_dims(&self, expected: ImageDims) -> Result<()> {
        if self.dims != expected {
            return Err(MamonetError::shape(expected, self.dims));
        }
        Ok(())
    }
}
