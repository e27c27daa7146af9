//! Segmentation model description and loading
//!
//! Model files are external ONNX graphs. The file name decides which family
//! a model belongs to unless the kind is given explicitly; the family fixes
//! the input resolution, the normalization and how raw outputs are scaled.

use crate::error::{PhotoError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Supported segmentation model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// U²-Net, 320×320 input
    U2Net,
    /// `IS-Net`, 1024×1024 input
    IsNet,
    /// `BiRefNet`, 1024×1024 input
    BiRefNet,
}

/// How raw model outputs become a 0..1 mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputScaling {
    /// Clamp to 0..1
    Clamp,
    /// Stretch the observed range onto 0..1
    MinMax,
}

impl ModelKind {
    /// Square input side expected by the model
    #[must_use]
    pub fn input_size(self) -> u32 {
        match self {
            Self::U2Net => 320,
            Self::IsNet | Self::BiRefNet => 1024,
        }
    }

    #[must_use]
    pub fn preprocessing_config(self) -> PreprocessingConfig {
        let size = self.input_size();
        let (mean, std) = match self {
            Self::U2Net | Self::BiRefNet => (IMAGENET_MEAN, IMAGENET_STD),
            Self::IsNet => ([0.5; 3], [1.0; 3]),
        };
        PreprocessingConfig {
            target_size: [size, size],
            normalization_mean: mean,
            normalization_std: std,
        }
    }

    #[must_use]
    pub fn output_scaling(self) -> OutputScaling {
        match self {
            Self::U2Net | Self::BiRefNet => OutputScaling::MinMax,
            Self::IsNet => OutputScaling::Clamp,
        }
    }

    /// Guess the family from a model file name
    #[must_use]
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_stem()?.to_string_lossy().to_ascii_lowercase();
        if name.contains("birefnet") {
            Some(Self::BiRefNet)
        } else if name.contains("isnet") {
            Some(Self::IsNet)
        } else if name.contains("u2net") {
            Some(Self::U2Net)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U2Net => write!(f, "u2net"),
            Self::IsNet => write!(f, "isnet"),
            Self::BiRefNet => write!(f, "birefnet"),
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = PhotoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "u2net" => Ok(Self::U2Net),
            "isnet" => Ok(Self::IsNet),
            "birefnet" => Ok(Self::BiRefNet),
            other => Err(PhotoError::invalid_config(format!(
                "Unknown model kind '{other}' (expected u2net, isnet or birefnet)"
            ))),
        }
    }
}

/// Where to find the segmentation model and which family it is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub path: PathBuf,
    /// Explicit family; detected from the file name when `None`
    pub kind: Option<ModelKind>,
}

impl ModelSpec {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            kind: None,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ModelKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Explicit kind, else detected kind, else `IS-Net`
    #[must_use]
    pub fn resolved_kind(&self) -> ModelKind {
        self.kind
            .or_else(|| ModelKind::detect(&self.path))
            .unwrap_or(ModelKind::IsNet)
    }

    /// Short name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        format!(
            "{}:{}",
            self.resolved_kind(),
            self.path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        )
    }
}

/// Input preparation parameters for a model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    /// Square input size `[width, height]`
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub kind: ModelKind,
    pub precision: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW
    pub output_shape: (usize, usize, usize, usize),
}

/// Model manager for a model file on disk
#[derive(Debug, Clone)]
pub struct ModelManager {
    spec: ModelSpec,
    kind: ModelKind,
    size_bytes: usize,
}

impl ModelManager {
    /// Create a manager after checking that the model file exists
    ///
    /// # Errors
    /// - Model path does not exist or is not a regular file
    /// - File metadata cannot be read
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        let path = &spec.path;
        if !path.exists() {
            return Err(PhotoError::model(format!(
                "Model file does not exist: {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(PhotoError::model(format!(
                "Model path must be a file: {}",
                path.display()
            )));
        }

        let metadata = fs::metadata(path)
            .map_err(|e| PhotoError::file_io_error("read metadata of", path, &e))?;

        Ok(Self {
            spec: spec.clone(),
            kind: spec.resolved_kind(),
            size_bytes: usize::try_from(metadata.len()).unwrap_or(usize::MAX),
        })
    }

    /// Read the ONNX bytes
    ///
    /// # Errors
    /// - File I/O errors when reading model data
    pub fn load_model(&self) -> Result<Vec<u8>> {
        fs::read(&self.spec.path)
            .map_err(|e| PhotoError::file_io_error("read model file", &self.spec.path, &e))
    }

    #[must_use]
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.spec.path
    }

    #[must_use]
    pub fn get_info(&self) -> ModelInfo {
        let size = self.kind.input_size() as usize;
        let name = self
            .spec
            .path
            .file_stem()
            .map_or_else(|| self.kind.to_string(), |s| s.to_string_lossy().into_owned());
        let precision = if name.to_ascii_lowercase().contains("fp16") {
            "fp16"
        } else {
            "fp32"
        };
        ModelInfo {
            name,
            kind: self.kind,
            precision: precision.to_string(),
            size_bytes: self.size_bytes,
            input_shape: (1, 3, size, size),
            output_shape: (1, 1, size, size),
        }
    }

    #[must_use]
    pub fn get_preprocessing_config(&self) -> PreprocessingConfig {
        self.kind.preprocessing_config()
    }
}
