use crate::target::{Architecture, TargetDescription};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Configuration of a graph provider. Fixed at provider construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Whether built graphs may record speculative assumptions
    #[serde(default = "default_allow_assumptions")]
    pub allow_assumptions: bool,

    #[serde(default)]
    pub builder: GraphBuilderConfig,

    #[serde(default)]
    pub optimistic: OptimisticOptimizations,

    #[serde(default)]
    pub canonicalizer: PhaseContext,

    #[serde(default)]
    pub target: TargetDescription,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            allow_assumptions: default_allow_assumptions(),
            builder: GraphBuilderConfig::default(),
            optimistic: OptimisticOptimizations::default(),
            canonicalizer: PhaseContext::default(),
            target: TargetDescription::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.builder.max_bytecode_size == 0 {
            return Err(ConfigError::ValidationError(
                "builder.max_bytecode_size must be greater than zero".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" | "full" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, compact, full",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Settings for the bytecode parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphBuilderConfig {
    /// Methods with more instructions than this are rejected
    #[serde(default = "default_max_bytecode_size")]
    pub max_bytecode_size: usize,

    /// Reject `ReturnVoid` with values left on the operand stack
    #[serde(default)]
    pub strict_stack_discipline: bool,
}

impl Default for GraphBuilderConfig {
    fn default() -> Self {
        Self {
            max_bytecode_size: default_max_bytecode_size(),
            strict_stack_discipline: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimisticOptimizations {
    /// Turn virtual calls into direct calls under a recorded assumption
    #[serde(default = "default_true")]
    pub devirtualize_invokes: bool,
}

impl Default for OptimisticOptimizations {
    fn default() -> Self {
        Self {
            devirtualize_invokes: true,
        }
    }
}

impl OptimisticOptimizations {
    pub fn none() -> Self {
        Self {
            devirtualize_invokes: false,
        }
    }
}

/// Shared lowering and constant-folding settings for the canonicalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseContext {
    #[serde(default = "default_true")]
    pub fold_constants: bool,

    #[serde(default = "default_true")]
    pub algebraic_simplification: bool,

    #[serde(default = "default_true")]
    pub eliminate_dead_nodes: bool,
}

impl Default for PhaseContext {
    fn default() -> Self {
        Self {
            fold_constants: true,
            algebraic_simplification: true,
            eliminate_dead_nodes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "compact", "full"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_allow_assumptions() -> bool {
    true
}
fn default_true() -> bool {
    true
}
fn default_max_bytecode_size() -> usize {
    8000
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

/// Loads `ProviderConfig` from disk and the environment.
pub struct ConfigManager {
    config: ProviderConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (`PEGRAPH_*`)
    /// 2. Config file (`./.pegraph.toml`, then `~/.pegraph/config.toml`)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let (config, config_path) = Self::find_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load a specific config file, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(config: ProviderConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        config.validate()?;

        match config_path {
            Some(ref path) => info!("Loaded provider config from {}", path.display()),
            None => info!("No provider config file found, using defaults"),
        }
        info!(
            "allow_assumptions={} target={} devirtualize={}",
            config.allow_assumptions, config.target.arch, config.optimistic.devirtualize_invokes
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    fn find_config_file() -> Result<(ProviderConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".pegraph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".pegraph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((ProviderConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<ProviderConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        ProviderConfig::from_toml(&content)
    }

    fn apply_env_overrides(mut config: ProviderConfig) -> ProviderConfig {
        if let Ok(allow) = std::env::var("PEGRAPH_ALLOW_ASSUMPTIONS") {
            config.allow_assumptions = parse_flag(&allow);
        }
        if let Ok(devirt) = std::env::var("PEGRAPH_DEVIRTUALIZE") {
            config.optimistic.devirtualize_invokes = parse_flag(&devirt);
        }
        if let Ok(size) = std::env::var("PEGRAPH_MAX_BYTECODE_SIZE") {
            match size.parse() {
                Ok(n) => config.builder.max_bytecode_size = n,
                Err(_) => warn!("Ignoring PEGRAPH_MAX_BYTECODE_SIZE={}", size),
            }
        }
        if let Ok(arch) = std::env::var("PEGRAPH_TARGET_ARCH") {
            match arch.parse::<Architecture>() {
                Ok(a) => config.target.arch = a,
                Err(e) => warn!("Ignoring PEGRAPH_TARGET_ARCH: {}", e),
            }
        }
        if let Ok(level) = std::env::var("PEGRAPH_LOG_LEVEL") {
            config.logging.level = level;
        }
        config
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn into_config(self) -> ProviderConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let toml_str = ProviderConfig::default().to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}
