#![forbid(unsafe_code)]

//! capa-rules: a compiler for capability rules
//!
//! Capability rules describe behaviors observable in a binary ("creates a
//! file", "decodes data with XOR in a loop") as boolean logic over extracted
//! features. This crate compiles rule documents into logic trees, extracts
//! nested subscopes into standalone rules, validates inter-rule dependencies,
//! and assembles dependency-ordered rule lists per scope.
//!
//! ```no_run
//! use capa_rules::{Rule, RuleSet};
//!
//! let rule = Rule::from_yaml(
//!     "rule:\n  meta:\n    name: create file\n  features:\n    - api: CreateFileA\n",
//! )?;
//! let ruleset = RuleSet::new(vec![rule])?;
//! assert_eq!(ruleset.function_rules().len(), 1);
//! # Ok::<(), capa_rules::CapaRulesError>(())
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod output;
pub mod rules;
pub mod types;

// Re-export error types for convenient access
pub use error::{CapaRulesError, ConfigError, RuleError, RuleSetError};

// Re-export core domain types for convenient access
pub use engine::{FeatureSet, LogicTree, Node, match_rules, topologically_order_rules};
pub use features::{Feature, FeatureKind, FeatureValue};
pub use rules::{Meta, Rule, RuleSet};
pub use types::{GlobPattern, Scope};
