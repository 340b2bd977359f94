//! Configuration management for sparkmcp
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.sparkmcp/config.toml

use crate::errors::{OrchestratorError, Result};
use crate::execution::{CoordinatorConfig, FailurePolicy};
use crate::security::{PermissionRule, PermissionTable, StaticTokenResolver, TokenEntry};
use crate::tools::RetryManager;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration for sparkmcp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub execution: ExecutionSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Permission rows; empty means the built-in table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<PermissionRule>,

    /// Static credentials for the token resolver
    #[serde(default = "StaticTokenResolver::default_entries")]
    pub tokens: Vec<TokenEntry>,
}

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub worker_limit: usize,
    pub step_timeout_secs: u64,
    pub failure_policy: FailurePolicy,
}

/// Result cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,

    /// Background expiry sweep; 0 disables it
    pub sweep_interval_secs: u64,
}

/// Retry configuration for retry-safe tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            execution: ExecutionSettings::default(),
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
            logging: LoggingSettings::default(),
            permissions: Vec::new(),
            tokens: StaticTokenResolver::default_entries(),
        }
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            worker_limit: 8,
            step_timeout_secs: 30,
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OrchestratorError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| OrchestratorError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Standard configuration location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".sparkmcp").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.execution.worker_limit == 0 {
            return Err(OrchestratorError::ConfigError(
                "worker_limit must be greater than 0".to_string(),
            ));
        }

        if self.execution.step_timeout_secs == 0 {
            return Err(OrchestratorError::ConfigError(
                "step_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.cache.ttl_secs == 0 {
            return Err(OrchestratorError::ConfigError(
                "ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(OrchestratorError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(OrchestratorError::ConfigError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        if self.tokens.iter().any(|entry| entry.token.is_empty()) {
            return Err(OrchestratorError::ConfigError(
                "token entries must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| {
            OrchestratorError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OrchestratorError::ConfigError(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| OrchestratorError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Coordinator settings derived from the configuration
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            worker_limit: self.execution.worker_limit,
            step_timeout: Duration::from_secs(self.execution.step_timeout_secs),
            failure_policy: self.execution.failure_policy,
            retry: RetryManager::with_config(self.retry.max_attempts, self.retry.base_delay_ms),
        }
    }

    /// Configured permission table, or the built-in one
    pub fn permission_table(&self) -> PermissionTable {
        if self.permissions.is_empty() {
            PermissionTable::from_rules(PermissionTable::default_rules())
        } else {
            PermissionTable::from_rules(self.permissions.iter().cloned())
        }
    }

    pub fn token_resolver(&self) -> StaticTokenResolver {
        StaticTokenResolver::new(self.tokens.iter().cloned())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Sweep interval, `None` when disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.cache.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
