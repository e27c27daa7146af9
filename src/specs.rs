//! Photo specification presets
//!
//! Each preset fixes the output pixel size and, for official documents, the
//! physical print size and the face framing used by auto-crop. Pixel sizes
//! are the physical sizes rendered at 300 dpi.

use crate::error::{PhotoError, Result};
use serde::Serialize;

/// Print resolution shared by every preset
pub const PRINT_DPI: u32 = 300;

/// Smallest accepted custom side length in pixels
pub const MIN_CUSTOM_SIDE: u32 = 50;

/// Largest accepted custom side length in pixels
pub const MAX_CUSTOM_SIDE: u32 = 5000;

/// Side length used when a custom size omits a dimension
pub const DEFAULT_CUSTOM_SIDE: u32 = 400;

/// Where the head should sit inside the output frame.
///
/// All values are fractions of the frame height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceFraming {
    /// Crown-to-chin height divided by frame height
    pub head_ratio: f64,
    /// Distance of the eye line from the top edge
    pub eye_line: f64,
    /// Minimum gap between the crown and the top edge
    pub top_margin: f64,
}

impl FaceFraming {
    /// Framing for presets with no official head geometry
    pub const DEFAULT: Self = Self {
        head_ratio: 0.55,
        eye_line: 0.40,
        top_margin: 0.08,
    };
}

impl Default for FaceFraming {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A target photo specification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoSpec {
    /// Stable identifier used by the HTTP API
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// Issuing country or platform
    pub country: &'static str,
    /// Output width in pixels
    pub width_px: u32,
    /// Output height in pixels
    pub height_px: u32,
    /// Physical width in millimetres, if the document defines one
    pub width_mm: Option<f64>,
    /// Physical height in millimetres, if the document defines one
    pub height_mm: Option<f64>,
    /// Face framing used by auto-crop
    pub framing: FaceFraming,
}

impl PhotoSpec {
    /// Output dimensions `(width, height)` in pixels
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width_px, self.height_px)
    }

    /// Physical size in pixels at `dpi`, when one is defined
    #[must_use]
    pub fn print_size_px(&self, dpi: u32) -> Option<(u32, u32)> {
        let (w_mm, h_mm) = (self.width_mm?, self.height_mm?);
        Some((mm_to_px(w_mm, dpi), mm_to_px(h_mm, dpi)))
    }
}

/// Convert millimetres to whole pixels at the given resolution
#[must_use]
pub fn mm_to_px(mm: f64, dpi: u32) -> u32 {
    (mm / 25.4 * f64::from(dpi)).round().max(1.0) as u32
}

const ICAO_35X45: FaceFraming = FaceFraming {
    head_ratio: 0.70,
    eye_line: 0.47,
    top_margin: 0.07,
};

const LARGE_HEAD_35X45: FaceFraming = FaceFraming {
    head_ratio: 0.76,
    eye_line: 0.48,
    top_margin: 0.05,
};

const US_2X2: FaceFraming = FaceFraming {
    head_ratio: 0.59,
    eye_line: 0.42,
    top_margin: 0.08,
};

static PRESETS: &[PhotoSpec] = &[
    PhotoSpec {
        id: "passport_us",
        name: "US Passport",
        country: "United States",
        width_px: 600,
        height_px: 600,
        width_mm: Some(50.8),
        height_mm: Some(50.8),
        framing: US_2X2,
    },
    PhotoSpec {
        id: "passport_eu",
        name: "EU Passport",
        country: "European Union",
        width_px: 413,
        height_px: 531,
        width_mm: Some(35.0),
        height_mm: Some(45.0),
        framing: ICAO_35X45,
    },
    PhotoSpec {
        id: "passport_uk",
        name: "UK Passport",
        country: "United Kingdom",
        width_px: 413,
        height_px: 531,
        width_mm: Some(35.0),
        height_mm: Some(45.0),
        framing: ICAO_35X45,
    },
    PhotoSpec {
        id: "visa_schengen",
        name: "Schengen Visa",
        country: "Schengen Area",
        width_px: 413,
        height_px: 531,
        width_mm: Some(35.0),
        height_mm: Some(45.0),
        framing: ICAO_35X45,
    },
    PhotoSpec {
        id: "passport_ca",
        name: "Canada Passport",
        country: "Canada",
        width_px: 591,
        height_px: 827,
        width_mm: Some(50.0),
        height_mm: Some(70.0),
        framing: FaceFraming {
            head_ratio: 0.48,
            eye_line: 0.38,
            top_margin: 0.10,
        },
    },
    PhotoSpec {
        id: "passport_au",
        name: "Australia Passport",
        country: "Australia",
        width_px: 413,
        height_px: 531,
        width_mm: Some(35.0),
        height_mm: Some(45.0),
        framing: LARGE_HEAD_35X45,
    },
    PhotoSpec {
        id: "passport_jp",
        name: "Japan Passport",
        country: "Japan",
        width_px: 413,
        height_px: 531,
        width_mm: Some(35.0),
        height_mm: Some(45.0),
        framing: LARGE_HEAD_35X45,
    },
    PhotoSpec {
        id: "passport_in",
        name: "India Passport",
        country: "India",
        width_px: 413,
        height_px: 531,
        width_mm: Some(35.0),
        height_mm: Some(45.0),
        framing: LARGE_HEAD_35X45,
    },
    PhotoSpec {
        id: "visa_in",
        name: "India Visa",
        country: "India",
        width_px: 600,
        height_px: 600,
        width_mm: Some(50.8),
        height_mm: Some(50.8),
        framing: FaceFraming {
            head_ratio: 0.60,
            eye_line: 0.42,
            top_margin: 0.08,
        },
    },
    PhotoSpec {
        id: "visa_cn",
        name: "China Visa",
        country: "China",
        width_px: 390,
        height_px: 567,
        width_mm: Some(33.0),
        height_mm: Some(48.0),
        framing: FaceFraming {
            head_ratio: 0.635,
            eye_line: 0.43,
            top_margin: 0.07,
        },
    },
    PhotoSpec {
        id: "linkedin",
        name: "LinkedIn",
        country: "Online",
        width_px: 400,
        height_px: 400,
        width_mm: None,
        height_mm: None,
        framing: FaceFraming::DEFAULT,
    },
    PhotoSpec {
        id: "square_1000",
        name: "Square HD",
        country: "Online",
        width_px: 1000,
        height_px: 1000,
        width_mm: None,
        height_mm: None,
        framing: FaceFraming::DEFAULT,
    },
];

/// All registered presets, in display order
#[must_use]
pub fn presets() -> &'static [PhotoSpec] {
    PRESETS
}

/// Look up a preset by id
#[must_use]
pub fn find_preset(id: &str) -> Option<&'static PhotoSpec> {
    PRESETS.iter().find(|spec| spec.id == id)
}

/// The user's target size selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SizeChoice {
    /// Keep the uploaded image's dimensions
    Original,
    /// One of the registered presets
    Preset { id: &'static str },
    /// Arbitrary pixel size
    Custom { width: u32, height: u32 },
}

impl SizeChoice {
    /// Build a choice from the API's `size` string and optional custom sides.
    ///
    /// Custom sides default to 400 and must lie within 50..=5000.
    pub fn parse(size: &str, custom_width: Option<u32>, custom_height: Option<u32>) -> Result<Self> {
        match size {
            "original" => Ok(Self::Original),
            "custom" => {
                let width = custom_width.unwrap_or(DEFAULT_CUSTOM_SIDE);
                let height = custom_height.unwrap_or(DEFAULT_CUSTOM_SIDE);
                for (label, side) in [("width", width), ("height", height)] {
                    if !(MIN_CUSTOM_SIDE..=MAX_CUSTOM_SIDE).contains(&side) {
                        return Err(PhotoError::invalid_input(format!(
                            "Custom {label} must be between {MIN_CUSTOM_SIDE} and {MAX_CUSTOM_SIDE} pixels, got {side}"
                        )));
                    }
                }
                Ok(Self::Custom { width, height })
            },
            id => find_preset(id)
                .map(|spec| Self::Preset { id: spec.id })
                .ok_or_else(|| PhotoError::invalid_input(format!("Unknown size '{id}'"))),
        }
    }

    /// Target dimensions, or `None` to keep the original size
    #[must_use]
    pub fn target_dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Original => None,
            Self::Preset { id } => find_preset(id).map(PhotoSpec::dimensions),
            Self::Custom { width, height } => Some((*width, *height)),
        }
    }

    /// The preset behind this choice, if any
    #[must_use]
    pub fn spec(&self) -> Option<&'static PhotoSpec> {
        match self {
            Self::Preset { id } => find_preset(id),
            Self::Original | Self::Custom { .. } => None,
        }
    }

    /// Face framing for auto-crop
    #[must_use]
    pub fn framing(&self) -> FaceFraming {
        self.spec().map_or(FaceFraming::DEFAULT, |spec| spec.framing)
    }

    /// Short identifier for logs and responses
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Preset { id } => id,
            Self::Custom { .. } => "custom",
        }
    }
}
