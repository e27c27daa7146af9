//! Face detection and face-driven cropping
//!
//! Detection is pluggable through [`FaceDetector`]. The bundled
//! implementation wraps the SeetaFace cascade from `rustface` and needs a
//! model file supplied at runtime.

use crate::geometry::CropRegion;
use crate::specs::FaceFraming;
use image::DynamicImage;
use serde::Serialize;
use tracing::debug;

/// Crown sits this many face heights above the detector box
const CROWN_ABOVE_BOX: f64 = 0.5;

/// Chin sits this many face heights below the top of the detector box
const CHIN_BELOW_BOX_TOP: f64 = 1.1;

/// Eye line sits this many face heights below the top of the detector box
const EYES_BELOW_BOX_TOP: f64 = 0.4;

/// Bounding box of a detected face within an image
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceBounds {
    /// X coordinate of the top-left corner (pixels)
    pub x: f64,
    /// Y coordinate of the top-left corner (pixels)
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Detector score, larger is more certain
    pub confidence: f64,
}

impl FaceBounds {
    #[must_use]
    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Estimated top of the head, above the detector box
    #[must_use]
    pub fn head_top(&self) -> f64 {
        self.y - self.height * CROWN_ABOVE_BOX
    }

    #[must_use]
    pub fn chin(&self) -> f64 {
        self.y + self.height * CHIN_BELOW_BOX_TOP
    }

    #[must_use]
    pub fn eye_line(&self) -> f64 {
        self.y + self.height * EYES_BELOW_BOX_TOP
    }

    /// Crown to chin
    #[must_use]
    pub fn head_height(&self) -> f64 {
        self.chin() - self.head_top()
    }
}

/// Pluggable face detection backend
///
/// Implementations receive a row-major grayscale buffer of
/// `width * height` bytes.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceBounds>;
}

#[cfg(feature = "face-detection")]
pub use self::seeta::RustfaceDetector;

#[cfg(feature = "face-detection")]
mod seeta {
    use super::{FaceBounds, FaceDetector};
    use crate::error::{PhotoError, Result};
    use std::path::Path;

    /// Smallest face the cascade looks for, in pixels
    const MIN_FACE_SIZE: u32 = 20;

    /// SeetaFace frontal cascade through `rustface`
    pub struct RustfaceDetector {
        model: rustface::Model,
    }

    impl std::fmt::Debug for RustfaceDetector {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RustfaceDetector").finish_non_exhaustive()
        }
    }

    impl RustfaceDetector {
        /// Load a SeetaFace model file (`seeta_fd_frontal_v1.0.bin`)
        ///
        /// # Errors
        /// - File missing or unreadable
        /// - File is not a SeetaFace model
        pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
            let path = path.as_ref();
            let bytes = std::fs::read(path)
                .map_err(|e| PhotoError::file_io_error("read face model", path, &e))?;
            Self::from_bytes(&bytes)
        }

        /// # Errors
        /// Returns a model error when `bytes` cannot be parsed.
        pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
            let model = rustface::read_model(std::io::Cursor::new(bytes))
                .map_err(|e| PhotoError::model(format!("Failed to load face model: {e}")))?;
            log::info!("SeetaFace model loaded ({} bytes)", bytes.len());
            Ok(Self { model })
        }
    }

    impl FaceDetector for RustfaceDetector {
        fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceBounds> {
            // Detector holds mutable scratch state, build one per call
            let mut detector = rustface::create_detector_with_model(self.model.clone());
            detector.set_min_face_size(MIN_FACE_SIZE);
            detector.set_score_thresh(2.0);
            detector.set_pyramid_scale_factor(0.8);
            detector.set_slide_window_step(4, 4);

            detector
                .detect(&rustface::ImageData::new(gray, width, height))
                .iter()
                .map(|face| {
                    let bbox = face.bbox();
                    FaceBounds {
                        x: f64::from(bbox.x()),
                        y: f64::from(bbox.y()),
                        width: f64::from(bbox.width()),
                        height: f64::from(bbox.height()),
                        confidence: face.score(),
                    }
                })
                .collect()
        }
    }
}

/// Highest-confidence face in `image`, if any
#[must_use]
pub fn detect_primary_face(detector: &dyn FaceDetector, image: &DynamicImage) -> Option<FaceBounds> {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let faces = detector.detect(gray.as_raw(), width, height);
    debug!(count = faces.len(), "Face detection finished");

    faces
        .into_iter()
        .filter(|face| face.width > 0.0 && face.height > 0.0)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// Frame a detected face for a `target` output size.
///
/// The head fills `framing.head_ratio` of the frame height with the eyes at
/// `framing.eye_line` from the top. If the crown would end up within
/// `framing.top_margin` of the top edge the frame moves up. Frames larger
/// than the image shrink around the face; the result always lies inside
/// the image.
#[must_use]
pub fn auto_crop_region(
    face: &FaceBounds,
    image_width: u32,
    image_height: u32,
    framing: &FaceFraming,
    target: (u32, u32),
) -> CropRegion {
    let img_w = f64::from(image_width.max(1));
    let img_h = f64::from(image_height.max(1));
    let aspect = f64::from(target.0.max(1)) / f64::from(target.1.max(1));

    let mut frame_h = face.head_height() / framing.head_ratio;
    let mut frame_w = frame_h * aspect;

    let fit = (img_w / frame_w).min(img_h / frame_h);
    if fit < 1.0 {
        frame_w *= fit;
        frame_h *= fit;
    }

    let mut top = face.eye_line() - framing.eye_line * frame_h;
    let min_top = face.head_top() - framing.top_margin * frame_h;
    if top > min_top {
        top = min_top;
    }
    let left = face.center_x() - frame_w / 2.0;

    let width = (frame_w.round() as u32).clamp(1, image_width.max(1));
    let height = (frame_h.round() as u32).clamp(1, image_height.max(1));
    let x = clamp_origin(left, width, image_width);
    let y = clamp_origin(top, height, image_height);

    let region = CropRegion { x, y, width, height };
    debug!(?face, ?region, "Auto-crop region");
    region
}

fn clamp_origin(origin: f64, extent: u32, limit: u32) -> u32 {
    let max_origin = f64::from(limit.saturating_sub(extent));
    origin.round().clamp(0.0, max_origin) as u32
}
