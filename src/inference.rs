//! Inference backend abstraction

use crate::{error::Result, processor::ProcessorConfig};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// Backends are driven from blocking worker threads behind a mutex, so they
/// must be `Send` but need not be `Sync`.
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` when already initialized.
    ///
    /// # Errors
    /// - Model loading or validation errors
    /// - Execution provider setup failures
    fn initialize(&mut self, config: &ProcessorConfig) -> Result<Option<Duration>>;

    /// Run inference on an NCHW input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Tensor conversion errors
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Expected input shape (NCHW)
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Expected output shape (NCHW)
    fn output_shape(&self) -> (usize, usize, usize, usize);

    /// Preprocessing configuration for this backend
    ///
    /// # Errors
    /// - No model attached
    fn get_preprocessing_config(&self) -> Result<crate::models::PreprocessingConfig>;

    /// Model information for this backend
    ///
    /// # Errors
    /// - No model attached
    fn get_model_info(&self) -> Result<crate::models::ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::FailingBackend;
    use crate::backends::MockBackend;

    #[test]
    fn test_backends_are_object_safe() {
        let backends: Vec<Box<dyn InferenceBackend>> =
            vec![Box::new(MockBackend::new()), Box::new(FailingBackend::default())];

        for backend in &backends {
            assert!(!backend.is_initialized());
            let (n, c, h, w) = backend.input_shape();
            assert_eq!((n, c), (1, 3));
            assert!(h > 0 && w > 0);
            assert_eq!(backend.output_shape().1, 1);
        }
    }

    #[test]
    fn test_backend_trait_consistency() {
        let mut backend: Box<dyn InferenceBackend> = Box::new(MockBackend::new());
        let load_time = backend.initialize(&ProcessorConfig::default()).unwrap();
        assert!(load_time.is_some());
        assert!(backend.is_initialized());
        // Second initialization is a no-op
        assert!(backend.initialize(&ProcessorConfig::default()).unwrap().is_none());

        let config = backend.get_preprocessing_config().unwrap();
        let size = config.target_size[0] as usize;
        let input = Array4::<f32>::zeros((1, 3, size, size));
        let output = backend.infer(&input).unwrap();
        assert_eq!(output.shape(), &[1, 1, size, size]);
    }
}
