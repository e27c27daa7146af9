//! Mock backend for tests and model-free runs

use crate::error::{PhotoError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelKind, PreprocessingConfig};
use crate::processor::ProcessorConfig;
use instant::Duration;
use ndarray::Array4;

const MOCK_INPUT_SIZE: usize = 320;

/// Backend that ignores pixel content and predicts a centered ellipse.
///
/// The ellipse covers the middle of the model input, roughly where a
/// portrait subject sits, with a soft edge so compositing sees partial
/// alpha values.
#[derive(Debug)]
pub struct MockBackend {
    input_shape: (usize, usize, usize, usize),
    output_shape: (usize, usize, usize, usize),
    initialized: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            input_shape: (1, 3, MOCK_INPUT_SIZE, MOCK_INPUT_SIZE),
            output_shape: (1, 1, MOCK_INPUT_SIZE, MOCK_INPUT_SIZE),
            initialized: false,
        }
    }

    /// Mask value at `(x, y)` for an `h`×`w` output
    fn ellipse_value(x: usize, y: usize, h: usize, w: usize) -> f32 {
        let cx = w as f32 / 2.0;
        let cy = h as f32 / 2.0;
        let rx = w as f32 * 0.35;
        let ry = h as f32 * 0.45;
        let dx = (x as f32 + 0.5 - cx) / rx;
        let dy = (y as f32 + 0.5 - cy) / ry;
        let distance = dx * dx + dy * dy;
        ((1.1 - distance) / 0.2).clamp(0.0, 1.0)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &ProcessorConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        log::debug!("Mock backend ready, no model to load");
        self.initialized = true;
        Ok(Some(Duration::ZERO))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(PhotoError::inference("Mock backend not initialized"));
        }

        let (n, _c, h, w) = input.dim();
        let output = Array4::<f32>::from_shape_fn((n, 1, h, w), |(_, _, y, x)| {
            Self::ellipse_value(x, y, h, w)
        });
        Ok(output)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.input_shape
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.output_shape
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(ModelKind::U2Net.preprocessing_config())
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "mock-ellipse".to_string(),
            kind: ModelKind::U2Net,
            precision: "mock".to_string(),
            size_bytes: 0,
            input_shape: self.input_shape,
            output_shape: self.output_shape,
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_requires_initialization() {
        let mut backend = MockBackend::new();
        let input = Array4::<f32>::zeros((1, 3, 8, 8));
        assert!(backend.infer(&input).is_err());
    }

    #[test]
    fn test_mock_predicts_centered_ellipse() {
        let mut backend = MockBackend::new();
        backend.initialize(&ProcessorConfig::default()).unwrap();

        let input = Array4::<f32>::zeros((1, 3, 320, 320));
        let output = backend.infer(&input).unwrap();

        assert_eq!(output.shape(), &[1, 1, 320, 320]);
        assert!((output[[0, 0, 160, 160]] - 1.0).abs() < f32::EPSILON);
        assert!(output[[0, 0, 0, 0]].abs() < f32::EPSILON);
        assert!(output[[0, 0, 160, 2]].abs() < f32::EPSILON);
        assert!(output.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(output.iter().any(|v| *v > 0.0 && *v < 1.0));
    }
}
