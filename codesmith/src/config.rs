//! Pipeline configuration.
//!
//! Loaded from TOML (`--config`, or `~/.config/codesmith/config.toml` when
//! present) and injected into every component constructor. All fields have
//! defaults, so an empty file is a valid config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::RetryPolicy;
use crate::llm::Provider;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Model id per agent role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Reasoning model for architecture and edge cases.
    pub planner: String,
    /// Strongest coding model; also used for repairs.
    pub coder: String,
    /// Fast model for bulk test generation.
    pub tester: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            planner: "gemini-2.0-flash-thinking-exp".to_string(),
            coder: "gemini-2.5-pro".to_string(),
            tester: "gemini-2.0-flash".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2000,
            jitter_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}

/// How generated tests are executed. The test file name is appended to `args`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "pytest".to_string(), "-q".to_string()],
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset, e.g. `info` or `codesmith=debug`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Env-filter directive for the subscriber.
    pub fn directive(&self) -> String {
        if self.level.contains('=') {
            self.level.clone()
        } else {
            format!("codesmith={}", self.level)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub provider: Provider,
    /// Falls back to the provider's environment variable when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Where generated code and tests are written.
    pub output_dir: PathBuf,
    /// Test runs in the verify loop; fixes requested is one less.
    pub max_fix_attempts: u32,
    /// Model calls per agent request before accepting invalid syntax.
    pub max_syntax_attempts: u32,
    pub models: ModelConfig,
    pub retry: RetryConfig,
    pub runner: RunnerConfig,
    pub log: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_key: None,
            output_dir: PathBuf::from("generated"),
            max_fix_attempts: 3,
            max_syntax_attempts: 3,
            models: ModelConfig::default(),
            retry: RetryConfig::default(),
            runner: RunnerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(s: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&s, path)
    }

    /// Load the user config if it exists, otherwise defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Explicit key, else the provider's environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(self.provider.key_env()).ok())
    }
}

/// `~/.config/codesmith/config.toml` on Linux; platform equivalent elsewhere.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("codesmith").join("config.toml"))
}
