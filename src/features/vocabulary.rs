#![forbid(unsafe_code)]

//! Which features each scope may use
//!
//! Most feature kinds are allowed or disallowed wholesale per scope.
//! Characteristics are the exception: each named characteristic is only
//! meaningful at particular scopes (a `tight loop` is a basic-block notion,
//! `embedded pe` a file notion).

use super::{Feature, FeatureKind, FeatureValue};
use crate::error::RuleError;
use crate::types::Scope;

const FILE_KINDS: &[FeatureKind] = &[
    FeatureKind::MatchedRule,
    FeatureKind::Export,
    FeatureKind::Import,
    FeatureKind::Section,
    FeatureKind::String,
];

const FILE_CHARACTERISTICS: &[&str] = &["embedded pe"];

const FUNCTION_KINDS: &[FeatureKind] = &[
    FeatureKind::MatchedRule,
    FeatureKind::Api,
    FeatureKind::Number,
    FeatureKind::String,
    FeatureKind::Bytes,
    FeatureKind::Offset,
    FeatureKind::Mnemonic,
    FeatureKind::BasicBlocks,
];

const FUNCTION_CHARACTERISTICS: &[&str] = &[
    "switch",
    "nzxor",
    "peb access",
    "fs access",
    "gs access",
    "cross section flow",
    "stack string",
    "calls from",
    "calls to",
    "indirect call",
    "loop",
    "recursive call",
];

const BASIC_BLOCK_KINDS: &[FeatureKind] = &[
    FeatureKind::MatchedRule,
    FeatureKind::Api,
    FeatureKind::Number,
    FeatureKind::String,
    FeatureKind::Bytes,
    FeatureKind::Offset,
    FeatureKind::Mnemonic,
];

const BASIC_BLOCK_CHARACTERISTICS: &[&str] = &[
    "nzxor",
    "peb access",
    "fs access",
    "gs access",
    "cross section flow",
    "tight loop",
    "stack string",
    "indirect call",
];

/// Feature kinds (other than characteristics) legal at `scope`
pub fn supported_kinds(scope: Scope) -> &'static [FeatureKind] {
    match scope {
        Scope::File => FILE_KINDS,
        Scope::Function => FUNCTION_KINDS,
        Scope::BasicBlock => BASIC_BLOCK_KINDS,
    }
}

/// Characteristic names legal at `scope`
pub fn supported_characteristics(scope: Scope) -> &'static [&'static str] {
    match scope {
        Scope::File => FILE_CHARACTERISTICS,
        Scope::Function => FUNCTION_CHARACTERISTICS,
        Scope::BasicBlock => BASIC_BLOCK_CHARACTERISTICS,
    }
}

/// Whether `feature` may appear in a rule of the given scope
///
/// Characteristics are checked by name, their value is ignored; every other
/// feature is checked by kind.
pub fn is_feature_valid(scope: Scope, feature: &Feature) -> bool {
    match feature.value() {
        FeatureValue::Characteristic { name, .. } => {
            supported_characteristics(scope).contains(&name.as_str())
        }
        other => supported_kinds(scope).contains(&other.kind()),
    }
}

/// Like [`is_feature_valid`], failing with a rule-definition error
pub fn ensure_feature_valid_for_scope(scope: Scope, feature: &Feature) -> Result<(), RuleError> {
    if is_feature_valid(scope, feature) {
        Ok(())
    } else {
        Err(RuleError::invalid(format!(
            "feature {feature} not supported for scope {scope}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_not_allowed_at_file_scope() {
        let feature = Feature::api("CreateFileA");
        assert!(!is_feature_valid(Scope::File, &feature));
        assert!(is_feature_valid(Scope::Function, &feature));
        assert!(is_feature_valid(Scope::BasicBlock, &feature));
    }

    #[test]
    fn test_basic_blocks_only_at_function_scope() {
        let feature = Feature::basic_block();
        assert!(!is_feature_valid(Scope::File, &feature));
        assert!(is_feature_valid(Scope::Function, &feature));
        assert!(!is_feature_valid(Scope::BasicBlock, &feature));
    }

    #[test]
    fn test_characteristics_checked_by_name() {
        assert!(is_feature_valid(Scope::BasicBlock, &Feature::characteristic("tight loop")));
        assert!(!is_feature_valid(Scope::Function, &Feature::characteristic("tight loop")));
        assert!(is_feature_valid(Scope::File, &Feature::characteristic("embedded pe")));
        assert!(!is_feature_valid(Scope::File, &Feature::characteristic("nzxor")));
        assert!(!is_feature_valid(Scope::Function, &Feature::characteristic("unknown")));
    }

    #[test]
    fn test_characteristic_value_ignored() {
        let negated = Feature::new(FeatureValue::Characteristic {
            name: "loop".to_string(),
            value: false,
        });
        assert!(is_feature_valid(Scope::Function, &negated));
    }

    #[test]
    fn test_match_and_string_allowed_everywhere() {
        for scope in Scope::all() {
            assert!(is_feature_valid(scope, &Feature::matched_rule("x")));
            assert!(is_feature_valid(scope, &Feature::string("x")));
        }
    }

    #[test]
    fn test_ensure_reports_feature_and_scope() {
        let err = ensure_feature_valid_for_scope(Scope::File, &Feature::mnemonic("mov"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid rule: feature mnemonic(mov) not supported for scope file"
        );
    }
}
