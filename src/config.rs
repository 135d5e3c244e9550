//! Worker configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::codec::Framing;
use crate::{AppError, Result};

/// Default read poll timeout: the service loop waits at most this long for
/// inbound data before checking the outbound queue again.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 200;

/// Default upper bound on a single inbound frame: 1 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1_048_576;

fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

/// Settings for a single [`ConnectionWorker`](crate::worker::ConnectionWorker).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Remote host name or IP address.
    pub host: String,
    /// Remote TCP port.
    pub port: u16,
    /// Read poll timeout in milliseconds.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// How inbound bytes are split into messages.
    #[serde(default)]
    pub framing: Framing,
    /// Largest inbound frame accepted before the read fails.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl WorkerConfig {
    /// Configuration for `host:port` with every other setting at its default.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            framing: Framing::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read poll timeout as a [`Duration`].
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// `host:port` string used for connecting and in log fields.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config("host must not be empty".into()));
        }

        if self.port == 0 {
            return Err(AppError::Config("port must be greater than zero".into()));
        }

        if self.poll_timeout_ms == 0 {
            return Err(AppError::Config(
                "poll_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.max_frame_bytes == 0 {
            return Err(AppError::Config(
                "max_frame_bytes must be greater than zero".into(),
            ));
        }

        self.framing.validate(self.max_frame_bytes)
    }
}
