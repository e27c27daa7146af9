//! ONNX Runtime backend for segmentation models
//!
//! Supports the CPU, CUDA and `CoreML` execution providers. Providers that are
//! requested but not present fall back to CPU with a warning.

use crate::config::ExecutionProvider;
use crate::error::{PhotoError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use crate::processor::ProcessorConfig;
use instant::{Duration, Instant};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

/// ONNX Runtime backend for running segmentation models
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl OnnxBackend {
    /// Execution providers with their availability on this machine
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool)> {
        vec![
            ("CPU".to_string(), true),
            (
                "CUDA".to_string(),
                OrtExecutionProvider::is_available(&CUDAExecutionProvider::default())
                    .unwrap_or(false),
            ),
            (
                "CoreML".to_string(),
                OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                    .unwrap_or(false),
            ),
        ]
    }

    #[must_use]
    pub fn new() -> Self {
        Self {
            session: None,
            model_manager: None,
            initialized: false,
        }
    }

    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    /// Providers to register for the requested setting, in priority order
    fn resolve_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = CUDAExecutionProvider::default();
        let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let mut providers = Vec::new();
        match requested {
            ExecutionProvider::Auto => {
                if cuda_available {
                    log::info!("CUDA execution provider available, using it");
                    providers.push(cuda.build());
                }
                if coreml_available {
                    log::info!("CoreML execution provider available, using it");
                    providers.push(coreml.build());
                }
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => log::info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available {
                    providers.push(cuda.build());
                } else {
                    log::warn!("CUDA requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    providers.push(coreml.build());
                } else {
                    log::warn!("CoreML requested but not available, falling back to CPU");
                }
            },
        }
        providers
    }

    fn load_model(&mut self, config: &ProcessorConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        let model_manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| PhotoError::model("No model manager available for ONNX backend"))?;
        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info();

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };

        let mut session_builder = Session::builder()
            .map_err(|e| PhotoError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PhotoError::model(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| PhotoError::model(format!("Failed to set intra threads: {e}")))?;

        let providers = Self::resolve_providers(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    PhotoError::model(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let session = session_builder
            .commit_from_memory(&model_data)
            .map_err(|e| PhotoError::model(format!("Failed to create session from model data: {e}")))?;

        log::info!(
            "ONNX Runtime session ready: model {} ({}, {}), provider {}, {intra_threads} intra-op threads",
            model_info.name,
            model_info.kind,
            model_info.precision,
            config.execution_provider
        );

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!("Model loading complete: {}ms", model_load_time.as_millis());
        Ok(model_load_time)
    }

    fn manager(&self) -> Result<&ModelManager> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| PhotoError::internal("Model manager not initialized"))
    }
}

impl Default for OnnxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &ProcessorConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.load_model(config).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PhotoError::inference("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("Running ONNX inference on {:?}", input.dim());

        let input_value = Value::from_array(input.clone())
            .map_err(|e| PhotoError::inference(format!("Failed to convert input tensor: {e}")))?;

        // Positional inputs and outputs, tensor names differ between exports
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| PhotoError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| PhotoError::inference("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| PhotoError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| PhotoError::inference(format!("Failed to extract output tensor: {e}")))?;

        let shape = output_tensor.shape().to_vec();
        let result = super::reshape_to_nchw(&shape, output_tensor.iter().copied().collect())?;

        log::debug!(
            "ONNX inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            result.shape()
        );
        Ok(result)
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

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(all(test, feature = "onnx"))]
mod tests {
    use super::*;

    #[test]
    fn test_onnx_backend_creation() {
        let backend = OnnxBackend::new();
        assert!(!backend.is_initialized());
        assert_eq!(backend.input_shape(), (1, 3, 1024, 1024));
        assert!(backend.get_model_info().is_err());
    }

    #[test]
    fn test_cpu_always_listed() {
        let providers = OnnxBackend::list_providers();
        assert!(providers.iter().any(|(name, available)| name == "CPU" && *available));
    }

    #[test]
    fn test_cpu_request_registers_no_providers() {
        assert!(OnnxBackend::resolve_providers(ExecutionProvider::Cpu).is_empty());
    }

    #[test]
    fn test_onnx_infer_before_initialize() {
        let mut backend = OnnxBackend::new();
        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(backend.infer(&input).is_err());
    }
}
