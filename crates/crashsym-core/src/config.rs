//! # Configuration
//!
//! Settings for the remote services and the bounds of the submit/poll loop.
//!
//! Configuration is read from a JSON file (every field optional), then
//! environment overrides are applied, then the result is validated.
//!
//! ```rust
//! use crashsym_core::config::SymbolicationConfig;
//!
//! let config = SymbolicationConfig::from_json_str(r#"{"max_polls": 10}"#).unwrap();
//! assert_eq!(config.max_polls, 10);
//! assert_eq!(config.request_timeout_secs, 5);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding [`SymbolicationConfig::symbolicator_url`].
pub const ENV_SYMBOLICATOR_URL: &str = "CRASHSYM_SYMBOLICATOR_URL";
/// Environment variable overriding [`SymbolicationConfig::symbolserver_url`].
pub const ENV_SYMBOLSERVER_URL: &str = "CRASHSYM_SYMBOLSERVER_URL";

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError
{
    /// The configuration file could not be read
    #[error("Failed to read config {}: {source}", path.display())]
    Read
    {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings of the symbolication pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolicationConfig
{
    /// Base URL of the bulk symbolication service. No remote step runs without it.
    pub symbolicator_url: Option<String>,
    /// Base URL of the system symbol lookup service.
    pub symbolserver_url: Option<String>,
    /// Whether the system symbol fallback may run at all.
    pub system_symbols_enabled: bool,
    /// Long-poll timeout sent with every request, in seconds.
    pub request_timeout_secs: u64,
    /// Upper bound on poll round trips for one event.
    pub max_polls: u32,
    /// Overall deadline of the submit/poll loop, in seconds.
    pub deadline_secs: u64,
    /// Attempts per request when the transport fails.
    pub max_attempts: u32,
    /// First retry delay; doubles on every further attempt.
    pub initial_backoff_ms: u64,
    /// Cap on the pause between two polls, in milliseconds.
    pub max_poll_delay_ms: u64,
    pub frame_cache_ttl_secs: u64,
    pub request_id_ttl_secs: u64,
    pub minidump_marker_ttl_secs: u64,
    /// External debug file sources, forwarded verbatim as `sources`.
    pub sources: Vec<Value>,
}

impl Default for SymbolicationConfig
{
    fn default() -> Self
    {
        Self {
            symbolicator_url: None,
            symbolserver_url: None,
            system_symbols_enabled: false,
            request_timeout_secs: 5,
            max_polls: 60,
            deadline_secs: 300,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_poll_delay_ms: 5_000,
            frame_cache_ttl_secs: 3600,
            request_id_ttl_secs: 3600,
            minidump_marker_ttl_secs: 3600,
            sources: Vec::new(),
        }
    }
}

impl SymbolicationConfig
{
    /// Load a configuration file, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError>
    {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&text)?;
        config.apply_env();
        config.validate()?;
        debug!(path = %path.display(), "loaded symbolication config");
        Ok(config)
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError>
    {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self)
    {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>)
    {
        if let Some(url) = lookup(ENV_SYMBOLICATOR_URL).filter(|url| !url.is_empty()) {
            self.symbolicator_url = Some(url);
        }
        if let Some(url) = lookup(ENV_SYMBOLSERVER_URL).filter(|url| !url.is_empty()) {
            self.symbolserver_url = Some(url);
        }
    }

    /// Reject settings the poll loop cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError>
    {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.max_polls == 0 {
            return Err(ConfigError::Invalid("max_polls must be at least 1".into()));
        }
        for (name, url) in [
            ("symbolicator_url", &self.symbolicator_url),
            ("symbolserver_url", &self.symbolserver_url),
        ] {
            if let Some(url) = url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid(format!("{name} must be an http(s) URL, got {url:?}")));
                }
            }
        }
        Ok(())
    }

    pub fn deadline(&self) -> Duration
    {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn initial_backoff(&self) -> Duration
    {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_poll_delay(&self) -> Duration
    {
        Duration::from_millis(self.max_poll_delay_ms)
    }
}
