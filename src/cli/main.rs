//! Passport photo server CLI
//!
//! Parses flags (every one also readable from the environment), installs the
//! tracing subscriber and runs the HTTP server until shutdown.

use super::config::CliConfigBuilder;
use crate::{
    sheet::PaperSize,
    specs::presets,
    tracing_config::{TracingConfig, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};

/// Passport and visa photo web service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "passport-photo")]
pub struct Cli {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Segmentation model file (.onnx); background removal answers 503 without one
    #[arg(short, long, env = "PASSPORT_PHOTO_MODEL", value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Model family (u2net, isnet, birefnet) [default: detected from the file name]
    #[arg(long, env = "PASSPORT_PHOTO_MODEL_KIND")]
    pub model_kind: Option<String>,

    /// Inference engine
    #[arg(short, long, value_enum, env = "PASSPORT_PHOTO_BACKEND", default_value_t = CliBackend::default())]
    pub backend: CliBackend,

    /// Execution provider for the ONNX backend
    #[arg(long, value_enum, env = "PASSPORT_PHOTO_PROVIDER", default_value_t = CliProvider::Auto)]
    pub provider: CliProvider,

    /// Inference threads (0 = auto)
    #[arg(short, long, env = "PASSPORT_PHOTO_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// SeetaFace model for auto-crop; without one auto-process uses centered crops
    #[arg(long, env = "PASSPORT_PHOTO_FACE_MODEL", value_name = "PATH")]
    pub face_model: Option<PathBuf>,

    /// Largest accepted upload in megabytes
    #[arg(long, env = "PASSPORT_PHOTO_MAX_UPLOAD_MB", default_value_t = 50)]
    pub max_upload_mb: usize,

    /// Seconds a session lives without being touched
    #[arg(long, env = "PASSPORT_PHOTO_SESSION_TTL", default_value_t = 3600)]
    pub session_ttl: u64,

    /// Most sessions kept in memory
    #[arg(long, env = "PASSPORT_PHOTO_MAX_SESSIONS", default_value_t = 256)]
    pub max_sessions: usize,

    /// Seconds between sweeps of expired sessions
    #[arg(long, env = "PASSPORT_PHOTO_SWEEP_INTERVAL", default_value_t = 60)]
    pub sweep_interval: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "PASSPORT_PHOTO_REQUEST_TIMEOUT", default_value_t = 120)]
    pub request_timeout: u64,

    /// JPEG quality (0-100)
    #[arg(long, env = "PASSPORT_PHOTO_JPEG_QUALITY", default_value_t = 95)]
    pub jpeg_quality: u8,

    /// Allow cross-origin requests from any origin
    #[arg(long, env = "PASSPORT_PHOTO_CORS")]
    pub cors: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (console, compact, json)
    #[arg(long, env = "PASSPORT_PHOTO_LOG_FORMAT", default_value = "console")]
    pub log_format: String,

    /// Tracing filter directive, overrides -v
    #[arg(long, env = "RUST_LOG")]
    pub log_filter: Option<String>,

    /// Print the photo presets and paper sizes, then exit
    #[arg(long)]
    pub list_specs: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Tract,
    Onnx,
    Mock,
}

impl Default for CliBackend {
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

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliProvider {
    Auto,
    Cpu,
    Cuda,
    #[value(name = "coreml")]
    CoreMl,
}

/// Binary entry point
///
/// # Errors
/// - Invalid flags or configuration
/// - Server failed to bind or crashed
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_specs {
        print_specs();
        return Ok(());
    }

    let format = cli
        .log_format
        .parse::<TracingFormat>()
        .map_err(anyhow::Error::msg)?;
    let mut tracing_config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(format);
    if let Some(filter) = cli.log_filter.as_deref().filter(|f| !f.is_empty()) {
        tracing_config = tracing_config.with_env_filter(filter);
    }
    tracing_config.init().context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli)?;
    match &config.model_spec {
        Some(spec) => info!(
            model = %spec.display_name(),
            backend = %config.backend_type,
            "Segmentation model configured"
        ),
        None => warn!("Starting without a segmentation model (set --model or PASSPORT_PHOTO_MODEL)"),
    }

    crate::server::serve(config).await
}

fn print_specs() {
    println!("{:<16} {:<28} {:>11}  {}", "ID", "NAME", "PIXELS", "PRINT");
    for spec in presets() {
        let print = match (spec.width_mm, spec.height_mm) {
            (Some(w), Some(h)) => format!("{w} x {h} mm"),
            _ => "-".to_string(),
        };
        println!(
            "{:<16} {:<28} {:>11}  {}",
            spec.id,
            spec.name,
            format!("{}x{}", spec.width_px, spec.height_px),
            print
        );
    }
    println!();
    let papers: Vec<String> = PaperSize::all().iter().map(ToString::to_string).collect();
    println!("Sheet paper sizes: {}", papers.join(", "));
}
