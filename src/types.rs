#![forbid(unsafe_code)]

//! Core domain types for capa-rules
//!
//! This module defines the fundamental types used throughout the crate.

use crate::error::RuleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity at which a rule's features are observed
///
/// Scopes nest: a file contains functions, a function contains basic blocks.
/// The derived ordering follows that nesting, from widest to narrowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "basic block")]
    BasicBlock,
}

impl Scope {
    /// Returns all scopes, widest first
    pub fn all() -> [Scope; 3] {
        [Scope::File, Scope::Function, Scope::BasicBlock]
    }

    /// Returns the scope name as used in rule documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::File => "file",
            Scope::Function => "function",
            Scope::BasicBlock => "basic block",
        }
    }

    /// Returns the only scope a subscope of this scope may be embedded in
    ///
    /// A `function` clause may only appear in a `file` rule and a
    /// `basic block` clause only in a `function` rule.
    pub fn enclosing(&self) -> Option<Scope> {
        match self {
            Scope::File => None,
            Scope::Function => Some(Scope::File),
            Scope::BasicBlock => Some(Scope::Function),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Scope::File),
            "function" => Ok(Scope::Function),
            "basic block" => Ok(Scope::BasicBlock),
            other => Err(RuleError::invalid(format!("unexpected scope: {other}"))),
        }
    }
}

/// A glob pattern for rule file matching
///
/// This is a simple wrapper around a string that will be used with the `globset` crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobPattern(String);

impl GlobPattern {
    /// Creates a new GlobPattern
    pub fn new(pattern: impl Into<String>) -> Self {
        GlobPattern(pattern.into())
    }

    /// Returns the pattern as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for GlobPattern {
    fn from(pattern: String) -> Self {
        GlobPattern(pattern)
    }
}

impl From<&str> for GlobPattern {
    fn from(pattern: &str) -> Self {
        GlobPattern(pattern.to_string())
    }
}
