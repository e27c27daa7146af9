//! Upload validation service

use crate::config::{ServerConfig, DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_UPLOAD_BYTES};
use crate::error::{PhotoError, Result};
use std::path::Path;

/// Checks client filenames and payload sizes before anything is decoded
#[derive(Debug, Clone)]
pub struct UploadValidator {
    allowed_extensions: Vec<String>,
    max_bytes: usize,
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOWED_EXTENSIONS.iter().map(|ext| (*ext).to_string()),
            DEFAULT_MAX_UPLOAD_BYTES,
        )
    }
}

impl UploadValidator {
    /// Extensions are compared without the dot and case-insensitively
    pub fn new<I, S>(allowed_extensions: I, max_bytes: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_bytes,
        }
    }

    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.allowed_extensions, config.max_upload_bytes)
    }

    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validate the client filename and return its lowercase extension
    ///
    /// # Errors
    /// - `No file` when the name is empty
    /// - `Invalid format` when the extension is not allowed
    pub fn check_filename(&self, filename: &str) -> Result<String> {
        if filename.trim().is_empty() {
            return Err(PhotoError::invalid_input("No file"));
        }
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| PhotoError::invalid_input("Invalid format"))?;
        if !self.allowed_extensions.iter().any(|allowed| *allowed == extension) {
            return Err(PhotoError::invalid_input("Invalid format"));
        }
        Ok(extension)
    }

    /// # Errors
    /// `File too large` past the configured limit
    pub fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_bytes {
            log::debug!("Rejecting upload of {len} bytes, limit {}", self.max_bytes);
            return Err(PhotoError::invalid_input("File too large"));
        }
        Ok(())
    }

    /// Filename then size
    ///
    /// # Errors
    /// See [`Self::check_filename`] and [`Self::check_size`].
    pub fn validate(&self, filename: &str, len: usize) -> Result<String> {
        let extension = self.check_filename(filename)?;
        self.check_size(len)?;
        Ok(extension)
    }
}
