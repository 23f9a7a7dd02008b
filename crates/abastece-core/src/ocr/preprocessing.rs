//! Image enhancement before a second OCR pass.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use imageproc::contrast::{adaptive_threshold, otsu_level, threshold, ThresholdType};
use tracing::debug;

use crate::models::config::PreprocessMode;

/// Image preprocessor for low-yield regions.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    /// Regions smaller than this on either side are upscaled.
    min_size: u32,
    /// Upper bound on the longest side after upscaling.
    max_size: u32,
    /// Binarization applied after grayscale conversion.
    mode: PreprocessMode,
    /// Neighbourhood radius for adaptive thresholding.
    block_radius: u32,
}

impl ImagePreprocessor {
    /// Create a new preprocessor with default settings.
    pub fn new() -> Self {
        Self {
            min_size: 1500,
            max_size: 6000,
            mode: PreprocessMode::Otsu,
            block_radius: 7,
        }
    }

    pub fn with_mode(mut self, mode: PreprocessMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_min_size(mut self, size: u32) -> Self {
        self.min_size = size;
        self
    }

    pub fn with_max_size(mut self, size: u32) -> Self {
        self.max_size = size;
        self
    }

    pub fn mode(&self) -> PreprocessMode {
        self.mode
    }

    /// Upscale, convert to grayscale and binarize.
    pub fn enhance(&self, image: &DynamicImage) -> DynamicImage {
        let (width, height) = image.dimensions();
        let (new_width, new_height) = self.upscale_dimensions(width, height);

        let gray = if (new_width, new_height) != (width, height) {
            debug!("Upscaling region {}x{} -> {}x{}", width, height, new_width, new_height);
            image
                .resize_exact(new_width, new_height, FilterType::CatmullRom)
                .to_luma8()
        } else {
            image.to_luma8()
        };

        let binary = match self.mode {
            PreprocessMode::Otsu => {
                let blurred = imageops::blur(&gray, 0.8);
                let level = otsu_level(&blurred);
                debug!("Otsu level {}", level);
                threshold(&blurred, level, ThresholdType::Binary)
            }
            PreprocessMode::Adaptive => adaptive_threshold(&gray, self.block_radius),
        };

        DynamicImage::ImageLuma8(binary)
    }

    /// Target size so that both sides reach `min_size`, capped by `max_size`.
    fn upscale_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 || (width >= self.min_size && height >= self.min_size) {
            return (width, height);
        }

        let min = self.min_size as f32;
        let mut scale = (min / width as f32).max(min / height as f32);

        let longest = width.max(height) as f32;
        if longest * scale > self.max_size as f32 {
            scale = self.max_size as f32 / longest;
        }
        if scale <= 1.0 {
            return (width, height);
        }

        let new_width = (width as f32 * scale) as u32;
        let new_height = (height as f32 * scale) as u32;
        (new_width.max(1), new_height.max(1))
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}
