#![forbid(unsafe_code)]

//! Evaluating an ordered rule list against observed features

use crate::engine::statement::FeatureSet;
use crate::features::Feature;
use crate::rules::Rule;
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};

/// Rule name to the addresses it matched at
pub type MatchResults = BTreeMap<String, BTreeSet<u64>>;

/// Evaluate `rules` in order at `address`
///
/// Each matching rule contributes a `match` feature to the working feature
/// set, so later rules can reference earlier ones. `rules` must already be
/// dependency ordered, as the per-scope lists of a `RuleSet` are.
///
/// Returns the augmented feature set and the matches.
pub fn match_rules<R: Borrow<Rule>>(
    rules: &[R],
    features: &FeatureSet,
    address: u64,
) -> (FeatureSet, MatchResults) {
    let mut features = features.clone();
    let mut results = MatchResults::new();

    for rule in rules {
        let rule = rule.borrow();
        if rule.evaluate(&features) {
            results
                .entry(rule.name().to_string())
                .or_default()
                .insert(address);
            features.insert(Feature::matched_rule(rule.name()), address);
        }
    }

    (features, results)
}
