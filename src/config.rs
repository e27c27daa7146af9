//! Configuration types for the photo server and its segmentation backend

use crate::error::{PhotoError, Result};
use crate::models::ModelSpec;
use crate::processor::ProcessorConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Upload extensions accepted when nothing else is configured
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

/// Default upload limit (50 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Encoded output format of a processed photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG, keeps the alpha channel
    Png,
    /// JPEG, opaque
    #[serde(alias = "jpg")]
    Jpeg,
    /// Lossless WebP, keeps the alpha channel
    #[cfg(feature = "webp-support")]
    WebP,
}

impl std::str::FromStr for OutputFormat {
    type Err = PhotoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            #[cfg(feature = "webp-support")]
            "webp" => Ok(Self::WebP),
            other => Err(PhotoError::unsupported_format(format!(
                "output format '{other}'"
            ))),
        }
    }
}

/// Which inference engine runs the segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Tract, pure Rust
    Tract,
    /// ONNX Runtime, supports GPU providers
    Onnx,
    /// Deterministic stand-in that needs no model file
    Mock,
}

impl Default for BackendType {
    fn default() -> Self {
        if cfg!(feature = "tract") {
            Self::Tract
        } else if cfg!(feature = "onnx") {
            Self::Onnx
        } else {
            Self::Mock
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tract => write!(f, "tract"),
            Self::Onnx => write!(f, "onnx"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,

    /// Accepted upload file extensions, lowercase without the dot
    pub allowed_extensions: Vec<String>,

    /// Seconds a session survives without being touched
    pub session_ttl_secs: u64,

    /// Most sessions held at once
    pub max_sessions: usize,

    /// Seconds between expiry sweeps
    pub sweep_interval_secs: u64,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Segmentation model; `None` leaves background removal unavailable
    pub model_spec: Option<ModelSpec>,

    /// Inference engine
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// SeetaFace model used by auto-crop; `None` disables face detection
    pub face_model_path: Option<PathBuf>,

    /// JPEG quality for opaque outputs (0-100)
    pub jpeg_quality: u8,

    /// Allow any origin
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            session_ttl_secs: 3600,
            max_sessions: 256,
            sweep_interval_secs: 60,
            request_timeout_secs: 120,
            model_spec: None,
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            face_model_path: None,
            jpeg_quality: 95,
            cors_permissive: false,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use passport_photo::{BackendType, ServerConfig};
    ///
    /// let config = ServerConfig::builder()
    ///     .port(9000)
    ///     .backend_type(BackendType::Mock)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.port, 9000);
    /// ```
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Port, upload limit, session capacity, TTL, sweep interval or timeout is zero
    /// - JPEG quality above 100
    /// - No allowed upload extensions
    /// - Host is not an IP address
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(PhotoError::config_value_error("port", 0, "1-65535", Some(8000)));
        }

        if self.max_upload_bytes == 0 {
            return Err(PhotoError::config_value_error(
                "upload limit",
                0,
                "at least 1 byte",
                Some(DEFAULT_MAX_UPLOAD_BYTES),
            ));
        }

        if self.max_sessions == 0 {
            return Err(PhotoError::config_value_error(
                "session capacity",
                0,
                "at least 1",
                Some(256),
            ));
        }

        for (name, value, recommended) in [
            ("session TTL", self.session_ttl_secs, 3600),
            ("sweep interval", self.sweep_interval_secs, 60),
            ("request timeout", self.request_timeout_secs, 120),
        ] {
            if value == 0 {
                return Err(PhotoError::config_value_error(
                    name,
                    value,
                    "at least 1 second",
                    Some(recommended),
                ));
            }
        }

        if self.jpeg_quality > 100 {
            return Err(PhotoError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "0-100",
                Some(95),
            ));
        }

        if self.allowed_extensions.is_empty() {
            return Err(PhotoError::invalid_config(
                "At least one upload extension must be allowed",
            ));
        }

        self.socket_addr().map(|_| ())
    }

    /// Address the server binds to
    ///
    /// # Errors
    /// - Host is not a valid IP address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|e| {
            PhotoError::invalid_config(format!("Invalid host '{}': {e}", self.host))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Body limit for the HTTP layer: the upload limit plus room for multipart framing
    #[must_use]
    pub fn body_limit(&self) -> usize {
        self.max_upload_bytes.saturating_add(1024 * 1024)
    }

    /// Segmentation settings handed to the processor
    #[must_use]
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            model_spec: self.model_spec.clone(),
            backend_type: self.backend_type,
            execution_provider: self.execution_provider,
            intra_threads: self.intra_threads,
        }
    }
}

/// Builder for `ServerConfig`
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Replace the accepted upload extensions; leading dots and case are ignored
    #[must_use]
    pub fn allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowed_extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    #[must_use]
    pub fn session_ttl_secs(mut self, secs: u64) -> Self {
        self.config.session_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn max_sessions(mut self, sessions: usize) -> Self {
        self.config.max_sessions = sessions;
        self
    }

    #[must_use]
    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs;
        self
    }

    #[must_use]
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn model_spec(mut self, model_spec: Option<ModelSpec>) -> Self {
        self.config.model_spec = model_spec;
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
    pub fn face_model_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.face_model_path = path;
        self
    }

    /// Set JPEG quality, clamped to 100
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.min(100);
        self
    }

    #[must_use]
    pub fn cors_permissive(mut self, permissive: bool) -> Self {
        self.config.cors_permissive = permissive;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`ServerConfig::validate`]
    pub fn build(self) -> Result<ServerConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelKind;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.jpeg_quality, 95);
        assert_eq!(config.session_ttl(), Duration::from_secs(3600));
        assert!(config.model_spec.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::builder()
            .host("127.0.0.1")
            .port(9000)
            .backend_type(BackendType::Mock)
            .max_sessions(4)
            .allowed_extensions([".PNG", "jpg"])
            .build()
            .unwrap();

        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:9000");
        assert_eq!(config.backend_type, BackendType::Mock);
        assert_eq!(config.max_sessions, 4);
        assert_eq!(config.allowed_extensions, vec!["png", "jpg"]);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ServerConfig::default();
        config.port = 0;
        assert!(config.validate().unwrap_err().to_string().contains("port"));

        let mut config = ServerConfig::default();
        config.jpeg_quality = 150;
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("JPEG quality"));
        assert!(message.contains("Recommended: 95"));

        let mut config = ServerConfig::default();
        config.max_sessions = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.max_upload_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.allowed_extensions.clear();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.host = "not-an-ip".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_quality_clamping() {
        let config = ServerConfig::builder().jpeg_quality(200).build().unwrap();
        assert_eq!(config.jpeg_quality, 100);
    }

    #[test]
    fn test_body_limit_exceeds_upload_limit() {
        let config = ServerConfig::builder().max_upload_bytes(1000).build().unwrap();
        assert!(config.body_limit() > config.max_upload_bytes);
    }

    #[test]
    fn test_processor_config_projection() {
        let spec = ModelSpec::new("/models/u2net.onnx").with_kind(ModelKind::U2Net);
        let config = ServerConfig::builder()
            .model_spec(Some(spec.clone()))
            .execution_provider(ExecutionProvider::Cpu)
            .intra_threads(4)
            .build()
            .unwrap();

        let processor = config.processor_config();
        assert_eq!(processor.model_spec, Some(spec));
        assert_eq!(processor.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(processor.intra_threads, 4);
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("JPG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("jpeg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert!("tiff".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_enum_display_and_serde() {
        assert_eq!(ExecutionProvider::CoreMl.to_string(), "coreml");
        assert_eq!(BackendType::Mock.to_string(), "mock");

        let json = serde_json::to_string(&ExecutionProvider::Cuda).unwrap();
        assert_eq!(json, "\"cuda\"");
        let format: OutputFormat = serde_json::from_str("\"jpg\"").unwrap();
        assert_eq!(format, OutputFormat::Jpeg);
        let backend: BackendType = serde_json::from_str("\"tract\"").unwrap();
        assert_eq!(backend, BackendType::Tract);
    }
}
