//! Tract backend for segmentation models
//!
//! Pure Rust inference through Tract. Slower than ONNX Runtime on large
//! models but needs no native libraries, which makes it the default.

use crate::error::{PhotoError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use crate::processor::ProcessorConfig;
use instant::{Duration, Instant};
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the optimized runnable Tract model
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running segmentation models using pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl TractBackend {
    /// Create a backend with no model attached
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: None,
            model_manager: None,
            initialized: false,
        }
    }

    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();

        let Some(ref model_manager) = self.model_manager else {
            return Err(PhotoError::model("No model manager available for Tract backend"));
        };

        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info();

        log::info!(
            "Initializing Tract backend: model {} ({}, {})",
            model_info.name,
            model_info.kind,
            model_info.precision
        );
        let size_mb = model_info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!("Model size: {size_mb:.2} MB");

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| PhotoError::model(format!("Failed to load ONNX model: {e}")))?
            .into_optimized()
            .map_err(|e| PhotoError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| PhotoError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!("Tract backend initialized in {}ms", model_load_time.as_millis());

        Ok(model_load_time)
    }

    fn manager(&self) -> Result<&ModelManager> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| PhotoError::internal("Model manager not initialized"))
    }
}

impl Default for TractBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, config: &ProcessorConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        if config.intra_threads > 0 {
            log::debug!(
                "Tract has no thread setting; ignoring intra_threads={}",
                config.intra_threads
            );
        }
        self.load_model().map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PhotoError::inference("Tract model not initialized"))?;

        log::debug!("Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| PhotoError::inference(format!("Tract inference failed: {e}")))?;

        // The first output is the finest-resolution mask for every supported family
        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| PhotoError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| PhotoError::inference(format!("Failed to convert output tensor: {e}")))?;

        let output_array =
            super::reshape_to_nchw(output_data.shape(), output_data.iter().copied().collect())?;

        log::debug!(
            "Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );

        Ok(output_array)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .as_ref()
            .map_or((1, 3, 1024, 1024), |manager| manager.get_info().input_shape)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .as_ref()
            .map_or((1, 1, 1024, 1024), |manager| manager.get_info().output_shape)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.manager()?.get_preprocessing_config())
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(self.manager()?.get_info())
    }
}
