//! Parsing and validation for capa-rules.toml configuration files

use crate::error::ConfigError;
use crate::types::GlobPattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "capa-rules.toml";

/// Main configuration struct for capa-rules.toml
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where rules come from
    #[serde(default)]
    pub rules: RulesConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rules.paths.is_empty() {
            return Err(ConfigError::Validation(
                "No rule paths configured. Add paths to [rules] in capa-rules.toml.".to_string(),
            ));
        }

        for pattern in &self.rules.exclude {
            globset::Glob::new(pattern.as_str()).map_err(|e| {
                ConfigError::Validation(format!(
                    "Invalid exclude glob pattern '{}': {}",
                    pattern.as_str(),
                    e
                ))
            })?;
        }

        if let Some(tag) = &self.rules.tag
            && tag.is_empty()
        {
            return Err(ConfigError::Validation(
                "rules.tag must not be empty; remove it to disable filtering".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as TOML, as written by `capa-rules init`
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(format!("failed to serialize configuration: {e}")))
    }
}

/// Rules configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Rule files or directories holding `.yml`/`.yaml` rules
    #[serde(default = "default_paths")]
    pub paths: Vec<PathBuf>,

    /// Paths to leave out of discovery
    #[serde(default)]
    pub exclude: Vec<GlobPattern>,

    /// Only keep rules whose metadata mentions this tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

fn default_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("rules")]
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            paths: default_paths(),
            exclude: Vec::new(),
            tag: None,
        }
    }
}

/// Output configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Color output setting
    #[serde(default)]
    pub color: ColorOption,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Human,
            color: ColorOption::Auto,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON Lines format
    Jsonl,
}

/// Color output options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorOption {
    /// Auto-detect based on terminal capabilities
    #[default]
    Auto,
    /// Always use color
    Always,
    /// Never use color
    Never,
}
