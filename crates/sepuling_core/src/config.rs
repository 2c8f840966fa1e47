//! Deployment configuration.
//!
//! # Responsibility
//! - Parse the TOML config file (with `${VAR}` environment substitution).
//! - Validate it once at startup and expose typed storage/logging settings.
//!
//! # Invariants
//! - Adapter selection (`storage.mapping.mode`) is read once per process and
//!   never consulted per call.
//! - Mode values are case-insensitive.

use crate::db::{DbTarget, PoolOptions};
use crate::logging::normalize_level;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

static ENV_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Which storage adapter backs the port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MappingMode {
    /// rusqlite, one hand-written statement per operation.
    Statement,
    /// sqlx entity repository over a pool.
    #[default]
    Repository,
}

/// Where the durable store lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProtocolMode {
    File,
    #[default]
    Memory,
}

impl FromStr for MappingMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "statement" => Ok(Self::Statement),
            "repository" => Ok(Self::Repository),
            other => Err(ConfigError::Invalid {
                field: "storage.mapping.mode",
                message: format!("unsupported mode `{other}`; expected statement|repository"),
            }),
        }
    }
}

impl FromStr for ProtocolMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Invalid {
                field: "storage.protocol.mode",
                message: format!("unsupported mode `{other}`; expected file|memory"),
            }),
        }
    }
}

impl Display for MappingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Statement => f.write_str("statement"),
            Self::Repository => f.write_str("repository"),
        }
    }
}

impl Display for ProtocolMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

impl TryFrom<String> for MappingMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for ProtocolMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MappingMode> for String {
    fn from(value: MappingMode) -> Self {
        value.to_string()
    }
}

impl From<ProtocolMode> for String {
    fn from(value: ProtocolMode) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mapping: MappingConfig,
    pub protocol: ProtocolConfig,
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub mode: MappingMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub mode: ProtocolMode,
    /// Required when `mode = "file"`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: PoolOptions::default().max_connections,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files; stderr when unset.
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
        }
    }
}

impl AppConfig {
    /// Loads and validates a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates config text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let substituted = substitute_env_vars(content);
        let config: Self = toml::from_str(&substituted)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.target()?;
        if self.storage.pool.max_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "storage.pool.max_connections",
                message: "must be at least 1".to_string(),
            });
        }
        normalize_level(&self.logging.level).map_err(|message| ConfigError::Invalid {
            field: "logging.level",
            message,
        })?;
        if let Some(dir) = &self.logging.dir {
            if !Path::new(dir.trim()).is_absolute() {
                return Err(ConfigError::Invalid {
                    field: "logging.dir",
                    message: format!("must be an absolute path, got `{dir}`"),
                });
            }
        }
        Ok(())
    }
}

impl StorageConfig {
    /// Resolves the protocol section into a database target.
    pub fn target(&self) -> Result<DbTarget, ConfigError> {
        match self.protocol.mode {
            ProtocolMode::Memory => Ok(DbTarget::Memory),
            ProtocolMode::File => match &self.protocol.path {
                Some(path) if !path.as_os_str().is_empty() => Ok(DbTarget::File(path.clone())),
                _ => Err(ConfigError::Invalid {
                    field: "storage.protocol.path",
                    message: "required when storage.protocol.mode is `file`".to_string(),
                }),
            },
        }
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.pool.max_connections,
        }
    }
}

/// Replaces `${VAR}` with the variable's value; unknown variables stay as-is.
fn substitute_env_vars(content: &str) -> String {
    ENV_VAR_RE
        .replace_all(content, |caps: &Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
