//! Image decoding service
//!
//! Uploads arrive as raw bytes; everything downstream works on a decoded,
//! upright `DynamicImage`.

use crate::error::{PhotoError, Result};
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;

/// Service for turning uploaded bytes into images
#[derive(Debug, Clone, Copy)]
pub struct ImageIOService;

impl ImageIOService {
    /// Decode `bytes`, detecting the format from content and applying the
    /// EXIF orientation so phone portraits come out upright.
    ///
    /// # Errors
    /// - Unknown or unsupported format
    /// - Corrupt image data
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(PhotoError::invalid_input("Image data is empty"));
        }

        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| PhotoError::unsupported_format("unrecognized image data"))?;

        let mut decoder = reader.into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);

        log::debug!(
            "Decoded {format:?} image {}x{} ({} bytes)",
            image.width(),
            image.height(),
            bytes.len()
        );
        Ok(image)
    }

    /// MIME type sniffed from the leading bytes
    #[must_use]
    pub fn sniff_mime(bytes: &[u8]) -> &'static str {
        image::guess_format(bytes)
            .map_or("application/octet-stream", |format| format.to_mime_type())
    }

    /// `data:` URL of the uploaded bytes, used as the browser preview
    #[must_use]
    pub fn preview_data_url(bytes: &[u8]) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        format!("data:{};base64,{}", Self::sniff_mime(bytes), STANDARD.encode(bytes))
    }
}
