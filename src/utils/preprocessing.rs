//! Image to tensor preparation for segmentation models
//!
//! Images are letterboxed: scaled to fit the square model input with their
//! aspect ratio kept, then centered on a padded canvas. The returned
//! [`LetterboxTransform`] maps tensor coordinates back to the image.

use crate::{
    error::{PhotoError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Fill around the letterboxed image
const PADDING: image::Rgb<u8> = image::Rgb([255, 255, 255]);

/// Placement of the scaled image inside the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    /// Image pixels to tensor pixels
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Side of the square input
    pub target_size: u32,
}

impl LetterboxTransform {
    /// Fit `(width, height)` inside a `target_size` square
    ///
    /// # Errors
    /// - Zero-sized image or target
    pub fn fit(width: u32, height: u32, target_size: u32) -> Result<Self> {
        if width == 0 || height == 0 || target_size == 0 {
            return Err(PhotoError::processing_stage_error(
                "preprocessing",
                "zero-sized image or model input",
                Some(&format!("{width}x{height} into {target_size}")),
            ));
        }

        let target = target_size as f32;
        let scale = (target / width as f32).min(target / height as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            scale,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
            scaled_width,
            scaled_height,
            target_size,
        })
    }

    /// Tensor coordinate for an image pixel, `None` when it lands outside
    /// the tensor of size `(mask_width, mask_height)`
    #[must_use]
    pub fn to_tensor(&self, x: u32, y: u32, mask_width: usize, mask_height: usize) -> Option<(usize, usize)> {
        // Tensors may come back at a different resolution than the input
        let ratio_x = mask_width as f32 / self.target_size as f32;
        let ratio_y = mask_height as f32 / self.target_size as f32;

        let tx = ((x as f32 + 0.5) * self.scale + self.offset_x as f32) * ratio_x;
        let ty = ((y as f32 + 0.5) * self.scale + self.offset_y as f32) * ratio_y;
        let (tx, ty) = (tx.floor(), ty.floor());

        if tx < 0.0 || ty < 0.0 {
            return None;
        }
        let (tx, ty) = (tx as usize, ty as usize);
        (tx < mask_width && ty < mask_height).then_some((tx, ty))
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Letterbox and normalize an image into an NCHW tensor
    ///
    /// # Errors
    /// - Zero-sized image or model input
    /// - Target size too large for tensor allocation
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, LetterboxTransform)> {
        let target_size = preprocessing_config.target_size[0];
        let rgb_image = image.to_rgb8();
        let (orig_width, orig_height) = rgb_image.dimensions();

        let transform = LetterboxTransform::fit(orig_width, orig_height, target_size)?;

        let resized = image::imageops::resize(
            &rgb_image,
            transform.scaled_width,
            transform.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let mut canvas = ImageBuffer::from_pixel(target_size, target_size, PADDING);
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(transform.offset_x),
            i64::from(transform.offset_y),
        );

        let target_size_usize = usize::try_from(target_size).map_err(|_| {
            PhotoError::processing("Target size too large for tensor allocation")
        })?;
        let tensor = Self::canvas_to_tensor(&canvas, preprocessing_config, target_size_usize);

        Ok((tensor, transform))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(
        canvas: &RgbImage,
        preprocessing_config: &PreprocessingConfig,
        target_size: usize,
    ) -> Array4<f32> {
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;
        let mut tensor = Array4::<f32>::zeros((1, 3, target_size, target_size));

        #[allow(clippy::indexing_slicing)]
        // Tensor dimensions are allocated from the canvas size
        for (y, row) in canvas.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                for channel in 0..3 {
                    tensor[[0, channel, y, x]] =
                        (f32::from(pixel[channel]) / 255.0 - mean[channel]) / std[channel];
                }
            }
        }

        tensor
    }
}
