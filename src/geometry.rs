//! Crop and resize to an exact target size
//!
//! Two strategies: invert the browser's viewport transform (the user dragged
//! and zoomed the photo inside a fixed canvas), or cover-resize and
//! center-crop when no placement was given.

use crate::error::{PhotoError, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};

/// Canvas side used by the browser editor when none is sent
pub const DEFAULT_CANVAS_SIDE: f64 = 400.0;

/// Viewport placement sent by the browser editor
///
/// The image was drawn at `offset` with `scale` inside a canvas of
/// `canvas_w` x `canvas_h` pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropSettings {
    pub scale: f64,
    #[serde(rename = "offsetX")]
    pub offset_x: f64,
    #[serde(rename = "offsetY")]
    pub offset_y: f64,
    #[serde(rename = "canvasW")]
    pub canvas_w: f64,
    #[serde(rename = "canvasH")]
    pub canvas_h: f64,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            canvas_w: DEFAULT_CANVAS_SIDE,
            canvas_h: DEFAULT_CANVAS_SIDE,
        }
    }
}

impl CropSettings {
    /// # Errors
    /// Non-finite values, or a scale or canvas side that is not positive.
    pub fn validate(&self) -> Result<()> {
        let all_finite = [
            self.scale,
            self.offset_x,
            self.offset_y,
            self.canvas_w,
            self.canvas_h,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !all_finite {
            return Err(PhotoError::invalid_input("Crop values must be finite numbers"));
        }
        if self.scale <= 0.0 {
            return Err(PhotoError::invalid_input(format!(
                "Crop scale must be positive, got {}",
                self.scale
            )));
        }
        if self.canvas_w <= 0.0 || self.canvas_h <= 0.0 {
            return Err(PhotoError::invalid_input(format!(
                "Canvas size must be positive, got {}x{}",
                self.canvas_w, self.canvas_h
            )));
        }
        Ok(())
    }
}

/// Rectangle in source pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Part of the source image visible through the browser canvas.
///
/// Always at least 1x1 and inside the image.
///
/// # Errors
/// Invalid crop settings or an empty image.
pub fn viewport_source_rect(image_width: u32, image_height: u32, crop: &CropSettings) -> Result<CropRegion> {
    crop.validate()?;
    if image_width == 0 || image_height == 0 {
        return Err(PhotoError::invalid_input("Image has no pixels"));
    }

    let x = (-crop.offset_x / crop.scale).max(0.0);
    let y = (-crop.offset_y / crop.scale).max(0.0);
    let w = crop.canvas_w / crop.scale;
    let h = crop.canvas_h / crop.scale;

    // Floor both edges, not the extent, so a fractional start keeps the right edge
    let (left, right) = (x.floor() as u32, (x + w).floor() as u32);
    let (top, bottom) = (y.floor() as u32, (y + h).floor() as u32);

    let x = left.min(image_width - 1);
    let y = top.min(image_height - 1);
    let width = right.saturating_sub(x).clamp(1, image_width - x);
    let height = bottom.saturating_sub(y).clamp(1, image_height - y);

    Ok(CropRegion { x, y, width, height })
}

/// Crop `region` and resize it to exactly `target`
#[must_use]
pub fn crop_region_to(image: &DynamicImage, region: &CropRegion, target: (u32, u32)) -> DynamicImage {
    image
        .crop_imm(region.x, region.y, region.width, region.height)
        .resize_exact(target.0, target.1, FilterType::Lanczos3)
}

/// Cut out what the browser canvas showed and resize it to `target`
///
/// # Errors
/// Invalid crop settings or target.
pub fn apply_viewport_crop(image: &DynamicImage, crop: &CropSettings, target: (u32, u32)) -> Result<DynamicImage> {
    check_target(target)?;
    let (width, height) = image.dimensions();
    let region = viewport_source_rect(width, height, crop)?;
    Ok(crop_region_to(image, &region, target))
}

/// Scale to cover `target` and center-crop the overflow
///
/// # Errors
/// Empty image or zero target side.
pub fn resize_cover(image: &DynamicImage, target: (u32, u32)) -> Result<DynamicImage> {
    check_target(target)?;
    let (iw, ih) = image.dimensions();
    if iw == 0 || ih == 0 {
        return Err(PhotoError::invalid_input("Image has no pixels"));
    }
    let (tw, th) = target;

    let scale = (f64::from(tw) / f64::from(iw)).max(f64::from(th) / f64::from(ih));
    let scaled_w = ((f64::from(iw) * scale).ceil() as u32).max(tw);
    let scaled_h = ((f64::from(ih) * scale).ceil() as u32).max(th);

    let resized = image.resize_exact(scaled_w, scaled_h, FilterType::Lanczos3);
    let left = (scaled_w - tw) / 2;
    let top = (scaled_h - th) / 2;
    Ok(resized.crop_imm(left, top, tw, th))
}

/// Viewport crop when the user placed the photo, cover resize otherwise
///
/// # Errors
/// See [`apply_viewport_crop`] and [`resize_cover`].
pub fn crop_to_target(image: &DynamicImage, crop: Option<&CropSettings>, target: (u32, u32)) -> Result<DynamicImage> {
    match crop {
        Some(crop) => apply_viewport_crop(image, crop, target),
        None => resize_cover(image, target),
    }
}

fn check_target(target: (u32, u32)) -> Result<()> {
    if target.0 == 0 || target.1 == 0 {
        return Err(PhotoError::invalid_input(format!(
            "Target size must be positive, got {}x{}",
            target.0, target.1
        )));
    }
    Ok(())
}
