#![forbid(unsafe_code)]

//! Rule set assembly
//!
//! A [`RuleSet`] is built once from a batch of compiled rules:
//!
//! 1. rule names must be unique
//! 2. subscopes are extracted into synthesized rules until none remain
//! 3. every `match` reference must resolve
//! 4. the set must not be empty
//! 5. each scope gets a dependency-ordered list of the rules worth evaluating
//!
//! Any failure rejects the whole batch. Once built, the set and its rules are
//! immutable and can be shared across threads.

use crate::engine::topologically_order_rules;
use crate::error::RuleSetError;
use crate::rules::dependencies::{
    ensure_rule_dependencies_are_met, ensure_rules_are_unique, get_rules_and_dependencies,
};
use crate::rules::{Meta, Rule};
use crate::types::Scope;
use indexmap::IndexMap;
use serde_yaml::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// A validated collection of rules, partitioned by scope
///
/// The per-scope lists hold every non-`lib` rule plus whatever those rules
/// transitively depend on, in an order where each rule follows its
/// dependencies. A `lib` rule that nothing references appears in no list but
/// can still be looked up by name.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: IndexMap<String, Arc<Rule>>,
    file_rules: Vec<Arc<Rule>>,
    function_rules: Vec<Arc<Rule>>,
    basic_block_rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    /// Assemble a rule set
    ///
    /// # Errors
    ///
    /// - `RuleSetError::DuplicateRule` if two rules share a name
    /// - `RuleSetError::MissingDependency` if a `match` names an absent rule
    /// - `RuleSetError::Empty` if `rules` is empty
    /// - `RuleSetError::DependencyCycle` if rules reference each other in a loop
    /// - `RuleSetError::Rule` if a synthesized subscope rule cannot be rendered
    pub fn new(rules: Vec<Rule>) -> Result<Self, RuleSetError> {
        ensure_rules_are_unique(&rules)?;

        let input_count = rules.len();
        let rules = extract_all_subscope_rules(rules)?;
        debug!(
            rules = input_count,
            synthesized = rules.len() - input_count,
            "extracted subscope rules"
        );

        ensure_rule_dependencies_are_met(&rules)?;

        if rules.is_empty() {
            return Err(RuleSetError::Empty);
        }

        let rules: Vec<Arc<Rule>> = rules.into_iter().map(Arc::new).collect();
        let ordered = topologically_order_rules(&rules)?;

        let mut reported: HashSet<&str> = HashSet::new();
        for rule in rules.iter().filter(|rule| !rule.is_lib()) {
            for dependency in get_rules_and_dependencies(&rules, rule.name())? {
                reported.insert(dependency.name());
            }
        }

        let for_scope = |scope: Scope| -> Vec<Arc<Rule>> {
            ordered
                .iter()
                .filter(|rule| rule.scope() == scope && reported.contains(rule.name()))
                .map(|rule| Arc::clone(rule))
                .collect()
        };
        let file_rules = for_scope(Scope::File);
        let function_rules = for_scope(Scope::Function);
        let basic_block_rules = for_scope(Scope::BasicBlock);

        debug!(
            file = file_rules.len(),
            function = function_rules.len(),
            basic_block = basic_block_rules.len(),
            "assembled rule set"
        );

        let rules = rules
            .iter()
            .map(|rule| (rule.name().to_string(), Arc::clone(rule)))
            .collect();

        Ok(Self {
            rules,
            file_rules,
            function_rules,
            basic_block_rules,
        })
    }

    /// Rules whose metadata mentions `tag`, plus their dependencies
    ///
    /// A rule matches when any string meta value, or any string inside a
    /// list-valued meta entry, contains `tag`. The result is assembled through
    /// [`RuleSet::new`], so it is validated like any other set.
    ///
    /// # Errors
    ///
    /// `RuleSetError::Empty` if no rule matches.
    pub fn filter_rules_by_meta(&self, tag: &str) -> Result<RuleSet, RuleSetError> {
        let rules: Vec<Arc<Rule>> = self.rules.values().cloned().collect();

        let mut selected: HashSet<&str> = HashSet::new();
        for rule in &rules {
            if !meta_mentions(rule.meta(), tag) {
                continue;
            }
            debug!(rule = rule.name(), tag, "selected rule by meta");
            for dependency in get_rules_and_dependencies(&rules, rule.name())? {
                selected.insert(dependency.name());
            }
        }

        let filtered = rules
            .iter()
            .filter(|rule| selected.contains(rule.name()))
            .map(|rule| Rule::clone(rule))
            .collect();
        RuleSet::new(filtered)
    }

    /// Look up any rule, `lib` and synthesized rules included
    pub fn get(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// All rules in the set, in assembly order
    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn file_rules(&self) -> &[Arc<Rule>] {
        &self.file_rules
    }

    pub fn function_rules(&self) -> &[Arc<Rule>] {
        &self.function_rules
    }

    pub fn basic_block_rules(&self) -> &[Arc<Rule>] {
        &self.basic_block_rules
    }

    /// The dependency-ordered rules to evaluate at `scope`
    pub fn rules_for_scope(&self, scope: Scope) -> &[Arc<Rule>] {
        match scope {
            Scope::File => &self.file_rules,
            Scope::Function => &self.function_rules,
            Scope::BasicBlock => &self.basic_block_rules,
        }
    }
}

/// Run subscope extraction to a fixpoint
///
/// Synthesized rules go back on the worklist: a subscope nested in another
/// only becomes reachable once the outer one has been peeled off. Generated
/// names never reuse an authored or previously generated name.
fn extract_all_subscope_rules(rules: Vec<Rule>) -> Result<Vec<Rule>, RuleSetError> {
    let mut taken: HashSet<String> = rules.iter().map(|rule| rule.name().to_string()).collect();
    let mut pending: VecDeque<Rule> = rules.into();
    let mut done = Vec::with_capacity(pending.len());

    while let Some(mut rule) = pending.pop_front() {
        pending.extend(rule.extract_subscope_rules_avoiding(&mut taken)?);
        done.push(rule);
    }

    Ok(done)
}

fn meta_mentions(meta: &Meta, tag: &str) -> bool {
    meta.values().any(|value| match value {
        Value::String(s) => s.contains(tag),
        Value::Sequence(items) => items
            .iter()
            .any(|item| item.as_str().is_some_and(|s| s.contains(tag))),
        _ => false,
    })
}
