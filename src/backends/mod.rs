//! Backend implementations for different inference engines
//!
//! - ONNX Runtime backend (GPU acceleration, feature `onnx`)
//! - Tract backend (pure Rust, feature `tract`)
//! - Mock backend (no model file, always available)

use crate::error::{PhotoError, Result};
use ndarray::Array4;

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(test)]
pub mod test_utils;

pub use self::mock::MockBackend;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

/// Bring a raw model output into `(1, 1, H, W)`.
///
/// Accepts `(H, W)`, `(1, H, W)` and `(1, C, H, W)`; for multi-channel
/// outputs only the first channel is kept.
#[cfg_attr(not(any(feature = "onnx", feature = "tract")), allow(dead_code))]
pub(crate) fn reshape_to_nchw(shape: &[usize], data: Vec<f32>) -> Result<Array4<f32>> {
    let (channels, height, width) = match *shape {
        [h, w] => (1, h, w),
        [1, h, w] => (1, h, w),
        [1, c, h, w] => (c, h, w),
        _ => {
            return Err(PhotoError::inference(format!(
                "Unsupported output tensor shape {shape:?}"
            )))
        },
    };

    let plane = height * width;
    let mut data = data;
    if channels > 1 {
        data.truncate(plane);
    }

    Array4::from_shape_vec((1, 1, height, width), data)
        .map_err(|e| PhotoError::inference(format!("Failed to reshape output tensor: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reshape_accepts_common_layouts() {
        let four = reshape_to_nchw(&[1, 1, 2, 3], vec![0.0; 6]).unwrap();
        assert_eq!(four.shape(), &[1, 1, 2, 3]);

        let three = reshape_to_nchw(&[1, 2, 3], vec![0.0; 6]).unwrap();
        assert_eq!(three.shape(), &[1, 1, 2, 3]);

        let two = reshape_to_nchw(&[2, 3], vec![0.0; 6]).unwrap();
        assert_eq!(two.shape(), &[1, 1, 2, 3]);
    }

    #[test]
    fn test_reshape_keeps_first_channel() {
        let mut data = vec![1.0; 4];
        data.extend(vec![0.0; 4]);
        let out = reshape_to_nchw(&[1, 2, 2, 2], data).unwrap();
        assert!(out.iter().all(|v| (*v - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_reshape_rejects_batches() {
        assert!(reshape_to_nchw(&[2, 1, 2, 2], vec![0.0; 8]).is_err());
        assert!(reshape_to_nchw(&[4], vec![0.0; 4]).is_err());
    }
}
