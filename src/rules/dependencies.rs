#![forbid(unsafe_code)]

//! Integrity checks over rule collections

use crate::error::RuleSetError;
use crate::rules::Rule;
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};

/// Fail on the first rule name that appears twice
pub fn ensure_rules_are_unique<R: Borrow<Rule>>(rules: &[R]) -> Result<(), RuleSetError> {
    let mut seen = HashSet::with_capacity(rules.len());
    for rule in rules {
        let name = rule.borrow().name();
        if !seen.insert(name) {
            return Err(RuleSetError::DuplicateRule(name.to_string()));
        }
    }
    Ok(())
}

/// Fail if any rule references a rule that is not in `rules`
pub fn ensure_rule_dependencies_are_met<R: Borrow<Rule>>(rules: &[R]) -> Result<(), RuleSetError> {
    let names: HashSet<&str> = rules.iter().map(|rule| rule.borrow().name()).collect();
    for rule in rules {
        let rule = rule.borrow();
        for dependency in rule.get_dependencies() {
            if !names.contains(dependency.as_str()) {
                return Err(RuleSetError::MissingDependency {
                    rule: rule.name().to_string(),
                    dependency,
                });
            }
        }
    }
    Ok(())
}

/// Select the rule called `name` and everything it transitively depends on
///
/// The result keeps the input order of `rules`. Each rule is expanded at
/// most once, so reference loops terminate.
///
/// # Errors
///
/// - `RuleSetError::UnknownRule` if no rule is called `name`
/// - `RuleSetError::MissingDependency` if the closure reaches an absent rule
pub fn get_rules_and_dependencies<'a, R: Borrow<Rule>>(
    rules: &'a [R],
    name: &str,
) -> Result<Vec<&'a R>, RuleSetError> {
    let by_name: HashMap<&str, &Rule> = rules
        .iter()
        .map(|rule| (rule.borrow().name(), rule.borrow()))
        .collect();

    if !by_name.contains_key(name) {
        return Err(RuleSetError::UnknownRule(name.to_string()));
    }

    let mut wanted: HashSet<String> = HashSet::new();
    let mut pending = vec![name.to_string()];
    while let Some(current) = pending.pop() {
        if wanted.contains(&current) {
            continue;
        }

        let rule = by_name.get(current.as_str()).copied();
        let Some(rule) = rule else {
            // only reachable through a dependency edge; the root was checked above
            return Err(RuleSetError::UnknownRule(current));
        };

        for dependency in rule.get_dependencies() {
            if !by_name.contains_key(dependency.as_str()) {
                return Err(RuleSetError::MissingDependency {
                    rule: rule.name().to_string(),
                    dependency,
                });
            }
            pending.push(dependency);
        }
        wanted.insert(current);
    }

    Ok(rules
        .iter()
        .filter(|rule| wanted.contains(Borrow::<Rule>::borrow(*rule).name()))
        .collect())
}
