//! Core data types produced by segmentation

use crate::error::{PhotoError, Result};
use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// Per-pixel foreground probability scaled to 0..=255
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// Row-major mask values
    pub data: Vec<u8>,
    /// `(width, height)`
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Mask value at `(x, y)`, 0 outside the mask
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        let (width, height) = self.dimensions;
        if x >= width || y >= height {
            return 0;
        }
        self.data
            .get((y as usize) * (width as usize) + x as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Fraction of pixels at or above half opacity
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let foreground = self.data.iter().filter(|&&value| value >= 128).count();
        foreground as f32 / self.data.len() as f32
    }

    /// The mask as a grayscale image
    ///
    /// # Errors
    /// - Data length does not match the dimensions
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        GrayImage::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            PhotoError::processing(format!(
                "Mask data length {} does not match {width}x{height}",
                self.data.len()
            ))
        })
    }

    /// Resize with bilinear filtering
    ///
    /// # Errors
    /// - Data length does not match the dimensions
    pub fn resize(&self, width: u32, height: u32) -> Result<Self> {
        let resized = image::imageops::resize(
            &self.to_image()?,
            width,
            height,
            image::imageops::FilterType::Triangle,
        );
        Ok(Self::new(resized.into_raw(), (width, height)))
    }
}

/// Stage timings of one segmentation run in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model loading, only on the first run
    pub model_load_ms: u64,
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    pub postprocessing_ms: u64,
    pub total_ms: u64,
}

/// Output of the segmentation processor
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Input pixels with alpha taken from the mask
    pub image: RgbaImage,
    pub mask: SegmentationMask,
    /// `(width, height)` of the input
    pub original_dimensions: (u32, u32),
    pub timings: ProcessingTimings,
}

impl RemovalResult {
    #[must_use]
    pub fn new(
        image: RgbaImage,
        mask: SegmentationMask,
        original_dimensions: (u32, u32),
        timings: ProcessingTimings,
    ) -> Self {
        Self {
            image,
            mask,
            original_dimensions,
            timings,
        }
    }
}
