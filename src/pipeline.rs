//! End-to-end photo processing
//!
//! Decode, frame (manual viewport crop or face-driven auto crop), segment,
//! composite and encode. The processor lock is held only for segmentation.

use crate::{
    composite::{apply_background, BackgroundColor},
    config::OutputFormat,
    error::{PhotoError, Result},
    face::{auto_crop_region, detect_primary_face, FaceDetector},
    geometry::{crop_region_to, crop_to_target, resize_cover, CropSettings},
    processor::BackgroundRemovalProcessor,
    services::{ImageIOService, OutputFormatHandler, DEFAULT_JPEG_QUALITY},
    specs::SizeChoice,
    types::ProcessingTimings,
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use instant::Instant;
use serde::Serialize;
use std::sync::Mutex;
use tracing::{info, instrument, span, Level};

/// Per-request encoding options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Explicit output format; `None` picks from the background
    pub format: Option<OutputFormat>,
    pub jpeg_quality: u8,
    /// Fail auto processing with `NoFace` instead of falling back to a
    /// centered crop
    pub require_face: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            format: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            require_face: false,
        }
    }
}

/// Stage timings of one request in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineTimings {
    pub decode_ms: u64,
    pub framing_ms: u64,
    pub segmentation: ProcessingTimings,
    pub encode_ms: u64,
    pub total_ms: u64,
}

/// Encoded result of one request
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// `Some` for auto processing
    pub face_detected: Option<bool>,
    pub timings: PipelineTimings,
}

/// Manual flow: the user's size choice and optional viewport placement
///
/// # Errors
/// - Undecodable upload
/// - Invalid crop values
/// - Segmentation or encoding failures
#[instrument(skip_all, fields(size = size.id(), bytes = original.len(), crop = crop.is_some()))]
pub fn process_manual(
    original: &[u8],
    size: &SizeChoice,
    crop: Option<&CropSettings>,
    background: BackgroundColor,
    processor: &Mutex<BackgroundRemovalProcessor>,
    options: &PipelineOptions,
) -> Result<PipelineOutput> {
    let total_start = Instant::now();
    let mut timings = PipelineTimings::default();

    let image = decode(original, &mut timings)?;

    let framed = {
        let _span = span!(Level::DEBUG, "framing").entered();
        let start = Instant::now();
        let framed = match size.target_dimensions() {
            Some(target) => crop_to_target(&image, crop, target)?,
            None => image,
        };
        timings.framing_ms = elapsed_ms(start);
        framed
    };

    let output = finish(&framed, background, processor, options, None, timings, total_start)?;
    info!(
        width = output.width,
        height = output.height,
        format = ?output.format,
        total_ms = output.timings.total_ms,
        "Manual processing complete"
    );
    Ok(output)
}

/// Auto flow: frame the photo around the most confident face
///
/// Without a detector or a face the photo is cover-resized to the target
/// instead, unless `options.require_face` is set. `Original` keeps the
/// face-framed region at its own resolution.
///
/// # Errors
/// - Undecodable upload
/// - `NoFace` when a face is required but none is found
/// - Segmentation or encoding failures
#[instrument(skip_all, fields(size = size.id(), bytes = original.len(), detector = detector.is_some()))]
pub fn process_auto(
    original: &[u8],
    size: &SizeChoice,
    background: BackgroundColor,
    processor: &Mutex<BackgroundRemovalProcessor>,
    detector: Option<&dyn FaceDetector>,
    options: &PipelineOptions,
) -> Result<PipelineOutput> {
    let total_start = Instant::now();
    let mut timings = PipelineTimings::default();

    let image = decode(original, &mut timings)?;
    let (image_w, image_h) = image.dimensions();

    let (framed, face_detected) = {
        let _span = span!(Level::DEBUG, "auto_framing").entered();
        let start = Instant::now();
        let face = detector.and_then(|detector| detect_primary_face(detector, &image));
        if face.is_none() && options.require_face {
            return Err(PhotoError::NoFace);
        }

        let target = size.target_dimensions();
        let framed = match (face, target) {
            (Some(face), Some(target)) => {
                let region = auto_crop_region(&face, image_w, image_h, &size.framing(), target);
                crop_region_to(&image, &region, target)
            },
            (Some(face), None) => {
                let region =
                    auto_crop_region(&face, image_w, image_h, &size.framing(), (image_w, image_h));
                image.crop_imm(region.x, region.y, region.width, region.height)
            },
            (None, Some(target)) => {
                info!("No face found, falling back to a centered crop");
                resize_cover(&image, target)?
            },
            (None, None) => image,
        };
        timings.framing_ms = elapsed_ms(start);
        (framed, face.is_some())
    };

    let output = finish(
        &framed,
        background,
        processor,
        options,
        Some(face_detected),
        timings,
        total_start,
    )?;
    info!(
        width = output.width,
        height = output.height,
        face_detected,
        total_ms = output.timings.total_ms,
        "Auto processing complete"
    );
    Ok(output)
}

fn decode(original: &[u8], timings: &mut PipelineTimings) -> Result<DynamicImage> {
    let _span = span!(Level::DEBUG, "decode").entered();
    let start = Instant::now();
    let image = ImageIOService::load_from_bytes(original)?;
    timings.decode_ms = elapsed_ms(start);
    Ok(image)
}

/// Segment, composite and encode a framed photo
fn finish(
    framed: &DynamicImage,
    background: BackgroundColor,
    processor: &Mutex<BackgroundRemovalProcessor>,
    options: &PipelineOptions,
    face_detected: Option<bool>,
    mut timings: PipelineTimings,
    total_start: Instant,
) -> Result<PipelineOutput> {
    // Segmentation sees opaque RGB regardless of the upload's mode
    let rgb = DynamicImage::ImageRgb8(framed.to_rgb8());

    let matte = segment(&rgb, processor, &mut timings)?;
    let composed = apply_background(matte, background);
    let (width, height) = composed.dimensions();

    let format = OutputFormatHandler::choose(background, options.format);
    let bytes = {
        let _span = span!(Level::DEBUG, "encode", ?format).entered();
        let start = Instant::now();
        let bytes = OutputFormatHandler::encode(&composed, format, options.jpeg_quality)?;
        timings.encode_ms = elapsed_ms(start);
        bytes
    };

    timings.total_ms = elapsed_ms(total_start);
    Ok(PipelineOutput {
        bytes,
        format,
        width,
        height,
        face_detected,
        timings,
    })
}

fn segment(
    image: &DynamicImage,
    processor: &Mutex<BackgroundRemovalProcessor>,
    timings: &mut PipelineTimings,
) -> Result<RgbaImage> {
    let mut processor = processor
        .lock()
        .map_err(|_| PhotoError::internal("Processor lock poisoned"))?;
    let result = processor.process_image(image)?;
    timings.segmentation = result.timings;
    Ok(result.image)
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
