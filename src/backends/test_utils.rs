//! Test backends with scripted behavior
//!
//! `MockBackend` covers the happy path; these cover failures and output
//! scaling in the processor.

use crate::{
    error::{PhotoError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelKind, PreprocessingConfig},
    processor::ProcessorConfig,
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Backend that fails at a chosen stage
#[derive(Debug, Default)]
pub struct FailingBackend {
    /// Fail in `initialize` instead of `infer`
    pub fail_init: bool,
    initialized: bool,
}

impl FailingBackend {
    #[must_use]
    pub fn failing_init() -> Self {
        Self {
            fail_init: true,
            initialized: false,
        }
    }
}

impl InferenceBackend for FailingBackend {
    fn initialize(&mut self, _config: &ProcessorConfig) -> Result<Option<Duration>> {
        if self.fail_init {
            return Err(PhotoError::model("Simulated model load failure"));
        }
        self.initialized = true;
        Ok(Some(Duration::ZERO))
    }

    fn infer(&mut self, _input: &Array4<f32>) -> Result<Array4<f32>> {
        Err(PhotoError::inference("Simulated inference failure"))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, 64, 64)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        (1, 1, 64, 64)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(PreprocessingConfig {
            target_size: [64, 64],
            normalization_mean: [0.5; 3],
            normalization_std: [1.0; 3],
        })
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "failing".to_string(),
            kind: ModelKind::IsNet,
            precision: "fp32".to_string(),
            size_bytes: 1,
            input_shape: self.input_shape(),
            output_shape: self.output_shape(),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Backend returning a fixed output tensor and recording input shapes
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    output: Array4<f32>,
    kind: ModelKind,
    input_size: u32,
    /// Shapes of every tensor passed to `infer`
    pub calls: Arc<Mutex<Vec<Vec<usize>>>>,
}

impl ScriptedBackend {
    /// Backend whose every inference returns `output`
    #[must_use]
    pub fn new(output: Array4<f32>, kind: ModelKind, input_size: u32) -> Self {
        Self {
            output,
            kind,
            input_size,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Square output filled with `value`
    #[must_use]
    pub fn constant(value: f32, kind: ModelKind, size: usize) -> Self {
        Self::new(
            Array4::from_elem((1, 1, size, size), value),
            kind,
            size as u32,
        )
    }

    /// Left half `low`, right half `high`
    #[must_use]
    pub fn split(low: f32, high: f32, kind: ModelKind, size: usize) -> Self {
        let output =
            Array4::from_shape_fn((1, 1, size, size), |(_, _, _, x)| if x < size / 2 { low } else { high });
        Self::new(output, kind, size as u32)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl InferenceBackend for ScriptedBackend {
    fn initialize(&mut self, _config: &ProcessorConfig) -> Result<Option<Duration>> {
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.calls.lock().unwrap().push(input.shape().to_vec());
        Ok(self.output.clone())
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        let size = self.input_size as usize;
        (1, 3, size, size)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.output.dim()
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        let mut config = self.kind.preprocessing_config();
        config.target_size = [self.input_size, self.input_size];
        Ok(config)
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "scripted".to_string(),
            kind: self.kind,
            precision: "fp32".to_string(),
            size_bytes: 1,
            input_shape: self.input_shape(),
            output_shape: self.output_shape(),
        })
    }

    fn is_initialized(&self) -> bool {
        true
    }
}
