//! Configuration module for Quadtodo.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `QUADTODO_BACKEND` | No | `local` | `local` (JSON files) or `remote` (object store) |
//! | `QUADTODO_DATA_DIR` | No | `~/.quadtodo` | Directory for local lists and the saved login |
//! | `QUADTODO_SERVER_URL` | Remote only | - | Object store base URL (e.g., `https://api.example.com/parse`) |
//! | `QUADTODO_APP_ID` | Remote only | - | Application id sent as `X-Parse-Application-Id` |
//! | `QUADTODO_API_KEY` | No | - | REST key sent as `X-Parse-REST-API-Key` |
//! | `QUADTODO_TICK_INTERVAL_MS` | No | 1000 | Re-render interval while a timer runs |
//! | `QUADTODO_REQUEST_TIMEOUT_SECS` | No | 30 | HTTP request timeout |
//!
//! # Example
//!
//! ```no_run
//! use quadtodo_core::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Data directory: {}", config.data_dir.display());
//! ```

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

/// Default data directory name relative to home.
const DEFAULT_DATA_DIR: &str = ".quadtodo";

/// Default tick interval in milliseconds.
const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

/// Default HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Which persistence strategy the lists use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Whole-list JSON documents in the data directory.
    #[default]
    Local,
    /// Per-item records in the remote object store. Requires a login.
    Remote,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!("expected 'local' or 'remote', got '{other}'")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// Connection settings for the remote object store and identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL without a trailing slash.
    pub server_url: String,

    /// Application id.
    pub app_id: String,

    /// Optional REST API key.
    pub api_key: Option<String>,

    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(server_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("server_url", &self.server_url)
            .field("app_id", &self.app_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Configuration for Quadtodo.
#[derive(Debug, Clone)]
pub struct Config {
    /// Selected persistence strategy.
    pub backend: BackendKind,

    /// Directory for local lists and the persisted login.
    pub data_dir: PathBuf,

    /// Interval between ticks while a timer runs.
    pub tick_interval: Duration,

    /// Remote settings, present whenever `QUADTODO_SERVER_URL` is set.
    /// Always present when `backend` is [`BackendKind::Remote`].
    pub remote: Option<RemoteConfig>,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `QUADTODO_BACKEND` is not `local` or `remote`
    /// - `QUADTODO_BACKEND=remote` but `QUADTODO_SERVER_URL` or `QUADTODO_APP_ID` is not set
    /// - a numeric variable cannot be parsed as a positive integer
    /// - the home directory cannot be determined (needed for the default data directory)
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match env::var("QUADTODO_BACKEND") {
            Ok(val) => val.parse().map_err(|message| ConfigError::InvalidValue {
                key: "QUADTODO_BACKEND".to_string(),
                message,
            })?,
            Err(_) => BackendKind::default(),
        };

        // Optional: QUADTODO_DATA_DIR (default: ~/.quadtodo)
        let data_dir = match env::var("QUADTODO_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
                base_dirs.home_dir().join(DEFAULT_DATA_DIR)
            }
        };

        let tick_interval = Duration::from_millis(parse_positive(
            "QUADTODO_TICK_INTERVAL_MS",
            DEFAULT_TICK_INTERVAL_MS,
        )?);

        let request_timeout = Duration::from_secs(parse_positive(
            "QUADTODO_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        let remote = match env::var("QUADTODO_SERVER_URL") {
            Ok(server_url) => {
                let app_id = env::var("QUADTODO_APP_ID")
                    .map_err(|_| ConfigError::MissingEnvVar("QUADTODO_APP_ID".to_string()))?;
                let mut remote =
                    RemoteConfig::new(server_url, app_id).with_request_timeout(request_timeout);
                if let Ok(api_key) = env::var("QUADTODO_API_KEY") {
                    remote = remote.with_api_key(api_key);
                }
                Some(remote)
            }
            Err(_) if backend == BackendKind::Remote => {
                return Err(ConfigError::MissingEnvVar(
                    "QUADTODO_SERVER_URL".to_string(),
                ));
            }
            Err(_) => None,
        };

        Ok(Self {
            backend,
            data_dir,
            tick_interval,
            remote,
        })
    }

    /// Remote settings, required by sign-up/login and the remote backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when no server URL was configured.
    pub fn require_remote(&self) -> Result<&RemoteConfig, ConfigError> {
        self.remote
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("QUADTODO_SERVER_URL".to_string()))
    }
}

/// Parses an optional positive integer variable.
fn parse_positive(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => {
            let parsed = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected positive integer, got '{val}'"),
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "value must be greater than 0".to_string(),
                });
            }
            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}
