//! Conversion from CLI arguments to [`ServerConfig`]

use crate::cli::main_impl::{Cli, CliBackend, CliProvider};
use crate::{
    config::{BackendType, ExecutionProvider, ServerConfig},
    models::{ModelKind, ModelSpec},
};
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build and validate the server configuration
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServerConfig> {
        let model_spec = match &cli.model {
            Some(path) => {
                let spec = ModelSpec::new(path);
                match cli.model_kind.as_deref() {
                    Some(kind) => Some(spec.with_kind(kind.parse::<ModelKind>()?)),
                    None => Some(spec),
                }
            },
            None => None,
        };

        let backend_type = match cli.backend {
            CliBackend::Tract => BackendType::Tract,
            CliBackend::Onnx => BackendType::Onnx,
            CliBackend::Mock => BackendType::Mock,
        };
        let execution_provider = match cli.provider {
            CliProvider::Auto => ExecutionProvider::Auto,
            CliProvider::Cpu => ExecutionProvider::Cpu,
            CliProvider::Cuda => ExecutionProvider::Cuda,
            CliProvider::CoreMl => ExecutionProvider::CoreMl,
        };

        ServerConfig::builder()
            .host(cli.host.clone())
            .port(cli.port)
            .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024))
            .session_ttl_secs(cli.session_ttl)
            .max_sessions(cli.max_sessions)
            .sweep_interval_secs(cli.sweep_interval)
            .request_timeout_secs(cli.request_timeout)
            .model_spec(model_spec)
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .intra_threads(cli.threads)
            .face_model_path(cli.face_model.clone())
            .jpeg_quality(cli.jpeg_quality)
            .cors_permissive(cli.cors)
            .build()
            .context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_cli_maps_flags() {
        let cli = Cli::try_parse_from([
            "passport-photo",
            "--host",
            "127.0.0.1",
            "--model",
            "models/u2net.onnx",
            "--backend",
            "mock",
            "--max-upload-mb",
            "5",
            "--cors",
        ])
        .unwrap();
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.backend_type, BackendType::Mock);
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert!(config.cors_permissive);
        let spec = config.model_spec.unwrap();
        assert_eq!(spec.resolved_kind(), ModelKind::U2Net);
    }

    #[test]
    fn test_from_cli_explicit_model_kind() {
        let cli = Cli::try_parse_from([
            "passport-photo",
            "--model",
            "segmenter.onnx",
            "--model-kind",
            "birefnet",
        ])
        .unwrap();
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.model_spec.unwrap().kind, Some(ModelKind::BiRefNet));
    }

    #[test]
    fn test_from_cli_rejects_invalid_values() {
        let cli = Cli::try_parse_from(["passport-photo", "--host", "not a host"]).unwrap();
        assert!(CliConfigBuilder::from_cli(&cli).is_err());

        let cli = Cli::try_parse_from(["passport-photo", "--model", "m.onnx", "--model-kind", "yolo"])
            .unwrap();
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }
}
