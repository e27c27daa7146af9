#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::unused_async)]

//! # Passport Photo
//!
//! A web service that turns an ordinary portrait into a passport, visa or
//! profile photo: upload, choose a size preset, frame the head, replace the
//! background with a solid color and download the result or a printable
//! sheet of copies.
//!
//! ## Features
//!
//! - **Size presets**: US, EU/Schengen, UK, Canada, India, China, Japan and
//!   platform sizes, plus custom pixel sizes
//! - **Manual framing**: crops follow the browser's pan-and-zoom viewport
//! - **Auto framing**: SeetaFace detection places the eye line per preset
//! - **Background removal**: U²-Net, `IS-Net` or `BiRefNet` through Tract
//!   (pure Rust) or ONNX Runtime
//! - **Print sheets**: tiles the photo at its physical size on 4x6, 5x7,
//!   A4 or Letter paper
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use passport_photo::{server, ModelSpec, ServerConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::builder()
//!     .port(8000)
//!     .model_spec(Some(ModelSpec::new("models/u2net.onnx")))
//!     .build()?;
//! server::serve(config).await
//! # }
//! ```
//!
//! The processing pipeline can also be driven without HTTP:
//!
//! ```rust,no_run
//! use passport_photo::{
//!     pipeline::{process_manual, PipelineOptions},
//!     BackgroundColor, BackgroundRemovalProcessor, ProcessorConfig, SizeChoice,
//! };
//! use std::sync::Mutex;
//!
//! # fn example() -> anyhow::Result<()> {
//! let processor = Mutex::new(BackgroundRemovalProcessor::new(ProcessorConfig::default()));
//! let upload = std::fs::read("portrait.jpg")?;
//! let size = SizeChoice::parse("passport_eu", None, None)?;
//! let output = process_manual(
//!     &upload,
//!     &size,
//!     None,
//!     BackgroundColor::WHITE,
//!     &processor,
//!     &PipelineOptions::default(),
//! )?;
//! std::fs::write("passport.jpg", &output.bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust inference backend
//! - `onnx`: ONNX Runtime backend with CUDA and `CoreML` providers
//! - `face-detection` (default): SeetaFace detector for auto framing
//! - `cli` (default): the `passport-photo` binary and subscriber setup
//! - `webp-support` (default): lossless WebP output
//! - `tracing-json`: JSON log output

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod composite;
pub mod config;
pub mod error;
pub mod face;
pub mod geometry;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod server;
pub mod services;
pub mod session;
pub mod sheet;
pub mod specs;
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use composite::BackgroundColor;
pub use config::{BackendType, ExecutionProvider, OutputFormat, ServerConfig, ServerConfigBuilder};
pub use error::{PhotoError, Result};
#[cfg(feature = "face-detection")]
pub use face::RustfaceDetector;
pub use face::{FaceBounds, FaceDetector};
pub use geometry::{CropRegion, CropSettings};
pub use inference::InferenceBackend;
pub use models::{ModelKind, ModelSpec};
pub use pipeline::{PipelineOptions, PipelineOutput};
pub use processor::{BackgroundRemovalProcessor, ProcessorConfig, ProcessorConfigBuilder};
pub use server::{router, AppState};
pub use session::{PhotoSession, SessionStore};
pub use sheet::PaperSize;
pub use specs::{find_preset, presets, PhotoSpec, SizeChoice};
pub use types::{ProcessingTimings, RemovalResult, SegmentationMask};
