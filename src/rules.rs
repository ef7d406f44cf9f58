#![forbid(unsafe_code)]

//! Rule compilation, validation, and assembly

pub mod builder;
pub mod dependencies;
pub mod format;
pub mod literals;
pub mod loader;
pub mod rule;
pub mod ruleset;

pub use builder::build_statements;
pub use dependencies::{
    ensure_rule_dependencies_are_met, ensure_rules_are_unique, get_rules_and_dependencies,
};
pub use format::{PREFERRED_META_ORDER, format_definition};
pub use loader::{get_rule_paths, get_rules};
pub use rule::{Meta, PARENT_KEY, Rule, SUBSCOPE_RULE_KEY};
pub use ruleset::RuleSet;
