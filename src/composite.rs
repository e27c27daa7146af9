//! Background compositing
//!
//! Blends a segmented matte (RGBA, alpha = foreground mask) onto a solid
//! color or leaves it transparent.

use crate::error::{PhotoError, Result};
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Background placed behind the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundColor {
    Solid([u8; 3]),
    Transparent,
}

impl BackgroundColor {
    pub const WHITE: Self = Self::Solid([255, 255, 255]);

    #[must_use]
    pub fn is_transparent(&self) -> bool {
        matches!(self, Self::Transparent)
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solid([r, g, b]) => write!(f, "#{r:02x}{g:02x}{b:02x}"),
            Self::Transparent => write!(f, "transparent"),
        }
    }
}

impl FromStr for BackgroundColor {
    type Err = PhotoError;

    /// Accepts `#rrggbb`, `rrggbb`, `#rgb`, `rgb` and `transparent`
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("transparent") || trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::Transparent);
        }

        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        let invalid = || PhotoError::invalid_input(format!("Invalid background color '{s}'"));
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
        match hex.len() {
            6 => Ok(Self::Solid([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            ])),
            3 => {
                let mut rgb = [0u8; 3];
                for (slot, digit) in rgb.iter_mut().zip(hex.chars()) {
                    // #abc expands to #aabbcc
                    *slot = channel(&format!("{digit}{digit}"))?;
                }
                Ok(Self::Solid(rgb))
            },
            _ => Err(invalid()),
        }
    }
}

impl Serialize for BackgroundColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// JSON `null` means transparent. Callers that want "missing means white"
/// combine this with `#[serde(default)]`.
impl<'de> Deserialize<'de> for BackgroundColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Self::Transparent),
            Some(value) => value.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Blend `matte` over a solid color: `out = fg * a + bg * (1 - a)`
#[must_use]
pub fn composite_on_color(matte: &RgbaImage, background: [u8; 3]) -> RgbImage {
    let mut out = RgbImage::new(matte.width(), matte.height());
    for (src, dst) in matte.pixels().zip(out.pixels_mut()) {
        let [r, g, b, a] = src.0;
        let alpha = f32::from(a) / 255.0;
        let blend = |fg: u8, bg: u8| (f32::from(fg) * alpha + f32::from(bg) * (1.0 - alpha)).round() as u8;
        *dst = Rgb([
            blend(r, background[0]),
            blend(g, background[1]),
            blend(b, background[2]),
        ]);
    }
    out
}

/// Flatten any alpha onto white, for outputs that cannot carry it
#[must_use]
pub fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    composite_on_color(&image.to_rgba8(), [255, 255, 255])
}

/// Solid colors give an RGB image, transparent keeps the RGBA matte
#[must_use]
pub fn apply_background(matte: RgbaImage, background: BackgroundColor) -> DynamicImage {
    match background {
        BackgroundColor::Solid(rgb) => DynamicImage::ImageRgb8(composite_on_color(&matte, rgb)),
        BackgroundColor::Transparent => DynamicImage::ImageRgba8(matte),
    }
}
