//! Error types for capa-rules
//!
//! This module defines the error types used throughout the crate, following
//! a hierarchical structure with specific error variants for different
//! error categories.

use std::path::PathBuf;

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration syntax
    #[error("Invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration parsed but failed validation
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Rule definition errors
///
/// Raised while compiling a single rule document. None of these are
/// recoverable: the rule is rejected as a whole.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Malformed statement, literal, or feature/scope combination
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A rule loaded from a file failed to compile
    #[error("invalid rule: {}: {message}", .path.display())]
    InvalidRuleWithPath { path: PathBuf, message: String },

    /// A rule file could not be read
    #[error("failed to read rule file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Rule directory traversal failed
    #[error("failed to walk rule directory: {0}")]
    Walk(#[from] ignore::Error),

    /// Invalid exclude glob
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        source: globset::Error,
    },
}

impl RuleError {
    /// Shorthand for the common `InvalidRule` case
    pub fn invalid(message: impl Into<String>) -> Self {
        RuleError::InvalidRule(message.into())
    }

    /// Attribute this error to the document at `path`
    ///
    /// Only definition errors are re-wrapped; errors that already carry a
    /// path are returned unchanged.
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            RuleError::InvalidRule(message) => RuleError::InvalidRuleWithPath {
                path: path.into(),
                message,
            },
            other => other,
        }
    }
}

/// Rule set integrity errors
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    /// Two rules share a name
    #[error("invalid rule set: duplicate rule name: {0}")]
    DuplicateRule(String),

    /// A `match` statement references a rule that is not in the set
    #[error("invalid rule set: rule \"{rule}\" depends on missing rule \"{dependency}\"")]
    MissingDependency { rule: String, dependency: String },

    /// A rule was requested by name but does not exist
    #[error("invalid rule set: unknown rule: {0}")]
    UnknownRule(String),

    /// Rules reference each other in a loop
    #[error("invalid rule set: dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// Nothing left after loading and filtering
    #[error("invalid rule set: no rules selected")]
    Empty,

    /// A rule synthesized during assembly could not be built
    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Top-level error type for capa-rules
#[derive(Debug, thiserror::Error)]
pub enum CapaRulesError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rule error
    #[error("{0}")]
    Rule(#[from] RuleError),

    /// Rule set error
    #[error("{0}")]
    RuleSet(#[from] RuleSetError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
