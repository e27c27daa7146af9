//! Output format handling service
//!
//! Picks the encoding for a finished photo and turns it into bytes, data
//! URLs and download metadata.

use crate::{
    composite::{flatten_onto_white, BackgroundColor},
    config::OutputFormat,
    error::{PhotoError, Result},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat};
use std::io::Cursor;

/// JPEG quality used when the caller does not ask for one
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Service for output format selection and encoding
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Transparent results default to PNG, solid ones to JPEG.
    ///
    /// An explicit request wins, except that a transparent background
    /// cannot go into JPEG; that combination falls back to PNG.
    #[must_use]
    pub fn choose(background: BackgroundColor, requested: Option<OutputFormat>) -> OutputFormat {
        match (requested, background) {
            (Some(format), BackgroundColor::Transparent) if !Self::supports_transparency(format) => {
                log::warn!("{format:?} cannot keep a transparent background, using PNG");
                OutputFormat::Png
            },
            (Some(format), _) => format,
            (None, BackgroundColor::Transparent) => OutputFormat::Png,
            (None, BackgroundColor::Solid(_)) => OutputFormat::Jpeg,
        }
    }

    /// Encode `image` as `format`. JPEG output is flattened onto white.
    ///
    /// # Errors
    /// Encoder failures.
    pub fn encode(image: &DynamicImage, format: OutputFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        match format {
            OutputFormat::Png => image
                .write_to(&mut cursor, ImageFormat::Png)
                .map_err(|e| PhotoError::processing(format!("Failed to encode PNG: {e}")))?,
            OutputFormat::Jpeg => {
                let rgb = flatten_onto_white(image);
                let mut encoder = JpegEncoder::new_with_quality(&mut cursor, jpeg_quality.clamp(1, 100));
                encoder
                    .encode_image(&rgb)
                    .map_err(|e| PhotoError::processing(format!("Failed to encode JPEG: {e}")))?;
            },
            #[cfg(feature = "webp-support")]
            OutputFormat::WebP => {
                // The image crate only writes lossless WebP from 8-bit buffers
                let normalized = if image.color().has_alpha() {
                    DynamicImage::ImageRgba8(image.to_rgba8())
                } else {
                    DynamicImage::ImageRgb8(image.to_rgb8())
                };
                normalized
                    .write_to(&mut cursor, ImageFormat::WebP)
                    .map_err(|e| PhotoError::processing(format!("Failed to encode WebP: {e}")))?;
            },
        }
        log::debug!("Encoded {format:?}: {} bytes", buffer.len());
        Ok(buffer)
    }

    /// File extension without the dot
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            #[cfg(feature = "webp-support")]
            OutputFormat::WebP => "webp",
        }
    }

    #[must_use]
    pub fn mime_type(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            #[cfg(feature = "webp-support")]
            OutputFormat::WebP => "image/webp",
        }
    }

    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png => true,
            OutputFormat::Jpeg => false,
            #[cfg(feature = "webp-support")]
            OutputFormat::WebP => true,
        }
    }

    /// `data:<mime>;base64,...` for embedding in JSON responses
    #[must_use]
    pub fn data_url(bytes: &[u8], format: OutputFormat) -> String {
        format!("data:{};base64,{}", Self::mime_type(format), STANDARD.encode(bytes))
    }

    /// Download name for a processed photo: `portrait.heic` becomes
    /// `portrait_no_bg.png`
    #[must_use]
    pub fn download_name(original_filename: &str, suffix: &str, format: OutputFormat) -> String {
        let stem = std::path::Path::new(original_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| {
                s.chars()
                    .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
                    .collect::<String>()
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "photo".to_string());
        format!("{stem}{suffix}.{}", Self::get_extension(format))
    }
}
