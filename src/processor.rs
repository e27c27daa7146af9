//! Background removal processor
//!
//! Owns the inference backend and turns an image into a matte: letterbox
//! preprocessing, inference, output scaling, and an inverse-mapped mask
//! applied as the alpha channel.

use crate::{
    config::{BackendType, ExecutionProvider},
    error::{PhotoError, Result},
    inference::InferenceBackend,
    models::{ModelManager, ModelSpec, OutputScaling},
    types::{ProcessingTimings, RemovalResult, SegmentationMask},
    utils::{ImagePreprocessor, LetterboxTransform},
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use instant::Instant;
use log::{debug, info};
use ndarray::Array4;
use tracing::{info as trace_info, instrument, span, Level};

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend of the given type; `model_manager` is `None` only for
    /// backends that need no model file
    ///
    /// # Errors
    /// - Backend type not compiled in
    /// - Backend needs a model but none was given
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: Option<ModelManager>,
    ) -> Result<Box<dyn InferenceBackend>>;
}

/// Factory for the backends compiled into this build
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: Option<ModelManager>,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            BackendType::Mock => Ok(Box::new(crate::backends::MockBackend::new())),
            #[cfg(feature = "tract")]
            BackendType::Tract => {
                let manager = model_manager.ok_or_else(|| PhotoError::model("Model not available"))?;
                Ok(Box::new(crate::backends::TractBackend::with_model_manager(manager)))
            },
            #[cfg(feature = "onnx")]
            BackendType::Onnx => {
                let manager = model_manager.ok_or_else(|| PhotoError::model("Model not available"))?;
                Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(manager)))
            },
            #[allow(unreachable_patterns)]
            other => {
                Err(PhotoError::invalid_config(format!(
                    "Backend '{other}' is not compiled into this build"
                )))
            },
        }
    }
}

/// Segmentation settings
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessorConfig {
    /// Model file; required unless the backend is `Mock`
    pub model_spec: Option<ModelSpec>,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    /// Intra-op threads (0 = auto)
    pub intra_threads: usize,
}

impl ProcessorConfig {
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::default()
    }
}

/// Builder for `ProcessorConfig`
#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = Some(model_spec);
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn build(self) -> ProcessorConfig {
        self.config
    }
}

/// Segmentation processor with lazy backend initialization
pub struct BackgroundRemovalProcessor {
    config: ProcessorConfig,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn InferenceBackend>>,
    initialized: bool,
    pending_load_ms: u64,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor with the default backend factory
    #[must_use]
    pub fn new(config: ProcessorConfig) -> Self {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    #[must_use]
    pub fn with_factory(config: ProcessorConfig, backend_factory: Box<dyn BackendFactory>) -> Self {
        Self {
            config,
            backend_factory,
            backend: None,
            initialized: false,
            pending_load_ms: 0,
        }
    }

    /// Use an already constructed backend; it is initialized on first use
    #[must_use]
    pub fn with_backend(config: ProcessorConfig, backend: Box<dyn InferenceBackend>) -> Self {
        let mut processor = Self::new(config);
        processor.backend = Some(backend);
        processor
    }

    /// Whether segmentation can run at all: a model is configured, the
    /// backend needs none, or a backend was injected
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
            || self.config.backend_type == BackendType::Mock
            || self.config.model_spec.is_some()
    }

    /// Load the model and initialize the backend
    ///
    /// # Errors
    /// - No model configured (`Model not available`)
    /// - Model file missing or unreadable
    /// - Backend initialization failures
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        if !self.is_available() {
            return Err(PhotoError::model("Model not available"));
        }

        info!("Initializing background removal processor");
        debug!("Backend type: {}", self.config.backend_type);
        debug!("Execution provider: {}", self.config.execution_provider);

        let mut backend = match self.backend.take() {
            Some(backend) => backend,
            None => {
                let model_manager = match (&self.config.model_spec, self.config.backend_type) {
                    (_, BackendType::Mock) | (None, _) => None,
                    (Some(spec), _) => {
                        debug!("Model: {}", spec.display_name());
                        Some(ModelManager::from_spec(spec)?)
                    },
                };
                self.backend_factory
                    .create_backend(self.config.backend_type, model_manager)?
            },
        };

        let load_result = backend.initialize(&self.config);
        // Keep the backend even on failure so a later call can retry
        self.backend = Some(backend);
        let load_time = load_result?;

        self.pending_load_ms = load_time.map_or(0, |d| d.as_millis() as u64);
        self.initialized = true;
        info!("Background removal processor initialized");
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Segment `image` and return it with the mask as alpha
    ///
    /// # Errors
    /// - Initialization failures
    /// - Preprocessing, inference or mask generation errors
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.backend_type,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<RemovalResult> {
        self.initialize()?;

        let mut timings = ProcessingTimings {
            model_load_ms: std::mem::take(&mut self.pending_load_ms),
            ..ProcessingTimings::default()
        };
        let total_start = Instant::now();
        let original_dimensions = image.dimensions();

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| PhotoError::internal("Backend not initialized"))?;
        let model_info = backend.get_model_info()?;

        trace_info!(model = %model_info.name, kind = %model_info.kind, "Starting segmentation");

        let (input_tensor, transform) = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            let start = Instant::now();
            let preprocessing_config = backend.get_preprocessing_config()?;
            let prepared = ImagePreprocessor::preprocess_for_inference(image, &preprocessing_config)?;
            timings.preprocessing_ms = start.elapsed().as_millis() as u64;
            prepared
        };

        let output_tensor = {
            let _span = span!(Level::INFO, "inference", model = %model_info.name).entered();
            let start = Instant::now();
            let output = backend.infer(&input_tensor)?;
            timings.inference_ms = start.elapsed().as_millis() as u64;
            output
        };

        let (mask, matte) = {
            let _span = span!(Level::DEBUG, "mask_generation").entered();
            let start = Instant::now();
            let scaled = Self::normalize_output(&output_tensor, model_info.kind.output_scaling());
            let mask = Self::tensor_to_mask(&scaled, &transform, original_dimensions)?;
            let matte = Self::apply_background_removal(image, &mask);
            timings.postprocessing_ms = start.elapsed().as_millis() as u64;
            (mask, matte)
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        debug!(
            "Segmentation done in {}ms (inference {}ms)",
            timings.total_ms, timings.inference_ms
        );

        Ok(RemovalResult::new(matte, mask, original_dimensions, timings))
    }

    /// Scale raw outputs into 0..1.
    ///
    /// Outputs outside 0..1 are treated as logits and passed through a
    /// sigmoid first.
    fn normalize_output(tensor: &Array4<f32>, scaling: OutputScaling) -> Array4<f32> {
        let is_logits = tensor.iter().any(|v| *v < 0.0 || *v > 1.0);
        let mut scaled = if is_logits {
            tensor.mapv(|v| 1.0 / (1.0 + (-v).exp()))
        } else {
            tensor.clone()
        };

        if scaling == OutputScaling::MinMax {
            let (min, max) = scaled
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
            let range = max - min;
            if range > f32::EPSILON {
                scaled.mapv_inplace(|v| (v - min) / range);
            }
        }

        scaled.mapv_inplace(|v| v.clamp(0.0, 1.0));
        scaled
    }

    /// Sample the output tensor at every original pixel through the inverse
    /// letterbox transform
    fn tensor_to_mask(
        tensor: &Array4<f32>,
        transform: &LetterboxTransform,
        original_dimensions: (u32, u32),
    ) -> Result<SegmentationMask> {
        let (n, c, mask_height, mask_width) = tensor.dim();
        if n != 1 || c != 1 {
            return Err(PhotoError::processing_stage_error(
                "mask generation",
                "invalid output tensor shape",
                Some(&format!("{:?}", tensor.shape())),
            ));
        }

        let (width, height) = original_dimensions;
        let mut data = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                let value = transform
                    .to_tensor(x, y, mask_width, mask_height)
                    .and_then(|(tx, ty)| tensor.get([0, 0, ty, tx]).copied())
                    .unwrap_or(0.0);
                data.push((value * 255.0).round() as u8);
            }
        }

        Ok(SegmentationMask::new(data, original_dimensions))
    }

    /// Copy the mask into the alpha channel; fully transparent pixels are zeroed
    fn apply_background_removal(image: &DynamicImage, mask: &SegmentationMask) -> RgbaImage {
        let mut result = image.to_rgba8();
        for (x, y, pixel) in result.enumerate_pixels_mut() {
            let alpha = mask.get(x, y);
            *pixel = if alpha > 0 {
                image::Rgba([pixel[0], pixel[1], pixel[2], alpha])
            } else {
                image::Rgba([0, 0, 0, 0])
            };
        }
        result
    }
}
