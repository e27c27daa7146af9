//! Tracing subscriber setup for the server binary
//!
//! The library only emits events (through `tracing` in the server layer and
//! `log` in the inference backends); the binary installs the subscriber.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Colored single-line output for terminals
    #[default]
    Console,
    /// Plain single-line output for log collectors without ANSI support
    Compact,
    /// One JSON object per event
    #[cfg(feature = "tracing-json")]
    Json,
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" | "pretty" => Ok(Self::Console),
            "compact" | "plain" => Ok(Self::Compact),
            #[cfg(feature = "tracing-json")]
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Default)]
pub struct TracingConfig {
    /// 0 = info, 1 = debug, 2+ = trace
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Full `EnvFilter` directive; replaces the verbosity mapping when set
    pub env_filter: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter directive for the configured verbosity.
    ///
    /// Request spans from `tower_http` only show up from `-v` on, the
    /// SeetaFace and tract internals only at `-vv`.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info,tower_http=warn,tract_core=warn,tract_onnx=warn",
            1 => "debug,tower_http=debug,tract_core=info,tract_onnx=info",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Malformed filter directive
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = match &self.env_filter {
            Some(directive) => EnvFilter::try_new(directive)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => registry
                .with(
                    fmt::layer()
                        .with_ansi(true)
                        .with_target(self.verbosity > 0)
                        .with_level(true)
                        .compact(),
                )
                .try_init()?,
            TracingFormat::Compact => registry
                .with(fmt::layer().with_ansi(false).with_target(false).compact())
                .try_init()?,
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => registry
                .with(fmt::layer().json().with_current_span(true).with_span_list(true))
                .try_init()?,
        }

        tracing::debug!(verbosity = self.verbosity, format = ?self.format, "Tracing initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert!(TracingConfig::new().verbosity_to_filter().starts_with("info"));
        assert!(TracingConfig::new().with_verbosity(1).verbosity_to_filter().starts_with("debug"));
        assert_eq!(TracingConfig::new().with_verbosity(7).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("console".parse::<TracingFormat>().unwrap(), TracingFormat::Console);
        assert_eq!("Compact".parse::<TracingFormat>().unwrap(), TracingFormat::Compact);
        assert!("xml".parse::<TracingFormat>().is_err());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_bad_filter_rejected() {
        let result = TracingConfig::new().with_env_filter("info,[=").init();
        assert!(result.is_err());
    }
}
