//! Language server launch configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::reverse::DEFAULT_REVERSE_REQUEST_CAPACITY;

const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid server config: {0}")]
    Invalid(String),
}

/// How to launch and talk to one language server.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Executable, resolved through `PATH` (e.g. "rust-analyzer").
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Workspace root. Also the server's working directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Sent verbatim as `initializationOptions`.
    #[serde(default)]
    pub initialization_options: Option<serde_json::Value>,
    /// Extra environment for the server process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Server requests remembered while awaiting a reply. At least 1.
    #[serde(default = "default_reverse_request_capacity")]
    pub reverse_request_capacity: usize,
    /// Default wait for each phase of [`crate::LspClient::stop`].
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_reverse_request_capacity() -> usize {
    DEFAULT_REVERSE_REQUEST_CAPACITY
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

impl ServerConfig {
    /// Config with defaults for everything but the command.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            root: default_root(),
            initialization_options: None,
            env: BTreeMap::new(),
            reverse_request_capacity: DEFAULT_REVERSE_REQUEST_CAPACITY,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read server config at {}: {source}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| {
            tracing::warn!("Failed to parse server config at {}: {source}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::Invalid("command must not be empty".into()));
        }
        if self.reverse_request_capacity == 0 {
            return Err(ConfigError::Invalid(
                "reverse_request_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
