//! Common helper functions shared across CLI commands
//!
//! This module provides shared functionality for loading configuration,
//! loading rule sets, and mapping errors to exit codes.

use crate::config::{ColorOption, Config, DEFAULT_CONFIG_FILE};
use crate::error::{CapaRulesError, ConfigError, RuleError};
use crate::rules::{RuleSet, get_rules};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_ERROR: i32 = 2;
pub const EXIT_INVALID_RULE: i32 = 3;

/// Options shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Explicit configuration file
    pub config: Option<PathBuf>,
    /// Color override from the command line
    pub color: Option<ColorOption>,
}

impl GlobalOptions {
    /// The effective color setting: command line first, then config
    pub fn color(&self, config: &Config) -> ColorOption {
        self.color.unwrap_or(config.output.color)
    }
}

/// Load capa-rules.toml
///
/// An explicit path must exist. Without one, `./capa-rules.toml` is used when
/// present and built-in defaults otherwise.
///
/// # Errors
///
/// Returns `ConfigError::Io` if an explicit file cannot be read.
/// Returns `ConfigError::Parse` or `ConfigError::Validation` if it is invalid.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        return Config::load(path);
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        Config::load(default_path)
    } else {
        debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
        Ok(Config::default())
    }
}

/// Load rules and assemble them into a rule set
///
/// `paths` overrides the configured rule paths and `tag` the configured
/// filter.
pub(crate) fn load_ruleset(
    config: &Config,
    paths: &[PathBuf],
    tag: Option<&str>,
) -> Result<RuleSet, CapaRulesError> {
    let paths = if paths.is_empty() {
        config.rules.paths.as_slice()
    } else {
        paths
    };

    let rules = get_rules(paths, &config.rules.exclude)?;
    debug!(rules = rules.len(), "loaded rule files");
    let ruleset = RuleSet::new(rules)?;

    match tag.or(config.rules.tag.as_deref()) {
        Some(tag) => Ok(ruleset.filter_rules_by_meta(tag)?),
        None => Ok(ruleset),
    }
}

/// Exit code for a failed command
///
/// Rejected rules and rule sets get their own code so callers can tell them
/// apart from environment problems.
pub(crate) fn exit_code_for(error: &CapaRulesError) -> i32 {
    match error {
        CapaRulesError::Rule(RuleError::InvalidRule(_) | RuleError::InvalidRuleWithPath { .. })
        | CapaRulesError::RuleSet(_) => EXIT_INVALID_RULE,
        CapaRulesError::Rule(_) | CapaRulesError::Config(_) | CapaRulesError::Io(_) => EXIT_ERROR,
    }
}

/// Print an error and map it to an exit code
pub(crate) fn report_error(error: &CapaRulesError) -> i32 {
    eprintln!("Error: {error}");
    exit_code_for(error)
}
