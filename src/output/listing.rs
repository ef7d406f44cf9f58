#![forbid(unsafe_code)]

//! Rule listing formatters
//!
//! This module provides formatters for displaying assembled rule sets from
//! the `capa-rules list` and `capa-rules check` commands. It supports both
//! human-readable and JSONL output formats.

use crate::rules::{Rule, RuleSet};
use crate::types::Scope;
use serde::Serialize;
use std::io;
use termcolor::{Color, ColorSpec, WriteColor};

/// What gets reported about a single rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleListing {
    pub name: String,
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub lib: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub dependencies: Vec<String>,
}

impl RuleListing {
    pub fn from_rule(rule: &Rule) -> Self {
        Self {
            name: rule.name().to_string(),
            scope: rule.scope(),
            namespace: rule
                .meta()
                .get("namespace")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            lib: rule.is_lib(),
            parent: rule.parent().map(str::to_string),
            dependencies: rule.get_dependencies().into_iter().collect(),
        }
    }

    /// Every scope's evaluation list, file scope first, each in dependency order
    pub fn from_ruleset(ruleset: &RuleSet) -> Vec<Self> {
        Scope::all()
            .into_iter()
            .flat_map(|scope| ruleset.rules_for_scope(scope))
            .map(|rule| Self::from_rule(rule))
            .collect()
    }
}

/// Per-scope rule counts for an assembled set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleSetSummary {
    /// All rules, including unreferenced `lib` rules and synthesized ones
    pub total: usize,
    pub file: usize,
    pub function: usize,
    pub basic_block: usize,
}

impl RuleSetSummary {
    pub fn from_ruleset(ruleset: &RuleSet) -> Self {
        Self {
            total: ruleset.len(),
            file: ruleset.file_rules().len(),
            function: ruleset.function_rules().len(),
            basic_block: ruleset.basic_block_rules().len(),
        }
    }
}

/// Human-readable formatter, colored when the writer supports it
pub struct HumanFormatter;

impl HumanFormatter {
    /// Create a new human formatter
    pub fn new() -> Self {
        HumanFormatter
    }

    /// Write rules grouped under a heading per scope
    pub fn write_listings(&self, out: &mut dyn WriteColor, listings: &[RuleListing]) -> io::Result<()> {
        for scope in Scope::all() {
            let in_scope: Vec<&RuleListing> =
                listings.iter().filter(|l| l.scope == scope).collect();
            if in_scope.is_empty() {
                continue;
            }

            out.set_color(ColorSpec::new().set_bold(true))?;
            writeln!(out, "{} rules ({}):", scope, in_scope.len())?;
            out.reset()?;

            for listing in in_scope {
                write!(out, "  {}", listing.name)?;
                if listing.lib {
                    out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
                    write!(out, " [lib]")?;
                    out.reset()?;
                }
                if let Some(namespace) = &listing.namespace {
                    write!(out, " ({namespace})")?;
                }
                writeln!(out)?;

                if !listing.dependencies.is_empty() {
                    writeln!(out, "    depends on: {}", listing.dependencies.join(", "))?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Write the `check` summary
    pub fn write_summary(&self, out: &mut dyn WriteColor, summary: &RuleSetSummary) -> io::Result<()> {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
        write!(out, "✓")?;
        out.reset()?;
        writeln!(out, " {} rules loaded", summary.total)?;
        writeln!(out, "  file: {}", summary.file)?;
        writeln!(out, "  function: {}", summary.function)?;
        writeln!(out, "  basic block: {}", summary.basic_block)?;
        Ok(())
    }
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// JSONL formatter
pub struct JsonlFormatter;

impl JsonlFormatter {
    /// Create a new JSONL formatter
    pub fn new() -> Self {
        JsonlFormatter
    }

    /// One JSON object per rule
    pub fn format_listings(&self, listings: &[RuleListing]) -> String {
        let mut output = String::new();
        for listing in listings {
            if let Ok(json) = serde_json::to_string(listing) {
                output.push_str(&json);
                output.push('\n');
            }
        }
        output
    }

    /// A single summary object
    pub fn format_summary(&self, summary: &RuleSetSummary) -> String {
        match serde_json::to_string(summary) {
            Ok(json) => format!("{json}\n"),
            Err(_) => String::new(),
        }
    }
}

impl Default for JsonlFormatter {
    fn default() -> Self {
        Self::new()
    }
}
