#![forbid(unsafe_code)]

//! Dependency ordering of rules
//!
//! Rules may `match` other rules, so a rule can only be evaluated after every
//! rule it references. This module orders a rule collection accordingly and
//! rejects collections where no such order exists.

use crate::error::RuleSetError;
use crate::rules::Rule;
use std::borrow::Borrow;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Order `rules` so that no rule precedes a rule it (transitively) references
///
/// The order is deterministic: rules are visited in input order and each
/// rule's dependencies in name order.
///
/// # Errors
///
/// - `RuleSetError::MissingDependency` if a referenced rule is not in `rules`
/// - `RuleSetError::DependencyCycle` if rules reference each other in a loop
pub fn topologically_order_rules<R: Borrow<Rule>>(rules: &[R]) -> Result<Vec<&R>, RuleSetError> {
    let by_name: HashMap<&str, &R> = rules
        .iter()
        .map(|rule| (rule.borrow().name(), rule))
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(rules.len());
    let mut path: Vec<&str> = Vec::new();
    let mut ordered: Vec<&R> = Vec::with_capacity(rules.len());

    for rule in rules {
        visit(
            rule.borrow().name(),
            &by_name,
            &mut marks,
            &mut path,
            &mut ordered,
        )?;
    }

    Ok(ordered)
}

fn visit<'a, R: Borrow<Rule>>(
    name: &'a str,
    by_name: &HashMap<&'a str, &'a R>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    ordered: &mut Vec<&'a R>,
) -> Result<(), RuleSetError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InProgress) => {
            let start = path.iter().position(|n| *n == name).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Err(RuleSetError::DependencyCycle(cycle));
        }
        None => {}
    }

    let rule = by_name
        .get(name)
        .copied()
        .ok_or_else(|| RuleSetError::UnknownRule(name.to_string()))?;

    marks.insert(name, Mark::InProgress);
    path.push(name);

    for dependency in rule.borrow().get_dependencies() {
        let (dependency_name, _) = by_name.get_key_value(dependency.as_str()).ok_or_else(|| {
            RuleSetError::MissingDependency {
                rule: name.to_string(),
                dependency: dependency.clone(),
            }
        })?;
        visit(*dependency_name, by_name, marks, path, ordered)?;
    }

    path.pop();
    marks.insert(name, Mark::Done);
    ordered.push(rule);
    Ok(())
}
