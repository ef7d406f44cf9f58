#![forbid(unsafe_code)]

//! Compiles rule statements into logic trees
//!
//! Every statement is a mapping with exactly one key. The key selects the
//! construct:
//!
//! - `and`, `or`, `not`, `N or more`, `optional`: combinators over child statements
//! - `function`, `basic block`: subscopes, evaluated at a narrower scope
//! - `count(<feature>)`: how many times a feature occurs
//! - anything else names a feature kind, e.g. `api`, `number`, `characteristic(nzxor)`
//!
//! Each feature leaf is checked against the scope it appears in.

use crate::engine::{LogicTree, Node, NodeId, TreeBuilder};
use crate::error::RuleError;
use crate::features::{Feature, FeatureKind, FeatureValue, ensure_feature_valid_for_scope};
use crate::rules::literals::{
    SymbolLiteral, is_regex_literal, parse_int, parse_range, parse_regex, parse_symbol,
};
use crate::types::Scope;
use serde_yaml::Value;

/// The construct a statement key selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementKey<'a> {
    And,
    Or,
    Not,
    AtLeast(usize),
    Optional,
    Subscope(Scope),
    Count(&'a str),
    Feature(FeatureKind, Option<&'a str>),
}

impl<'a> StatementKey<'a> {
    fn parse(key: &'a str) -> Result<Self, RuleError> {
        let parsed = match key {
            "and" => StatementKey::And,
            "or" => StatementKey::Or,
            "not" => StatementKey::Not,
            // alias for `0 or more`, documents features that often accompany the others
            "optional" => StatementKey::Optional,
            "function" => StatementKey::Subscope(Scope::Function),
            "basic block" => StatementKey::Subscope(Scope::BasicBlock),
            _ => {
                if let Some(count) = key.strip_suffix(" or more") {
                    let count = count.trim().parse::<usize>().map_err(|_| {
                        RuleError::invalid(format!("unexpected statement: {key}"))
                    })?;
                    StatementKey::AtLeast(count)
                } else if let Some(term) = key
                    .strip_prefix("count(")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    StatementKey::Count(term)
                } else {
                    let (kind, characteristic) = FeatureKind::from_key(key)?;
                    StatementKey::Feature(kind, characteristic)
                }
            }
        };
        Ok(parsed)
    }
}

/// Compile one statement mapping, and everything beneath it, at `scope`
///
/// # Errors
///
/// Returns `RuleError::InvalidRule` describing the first offending construct.
pub fn build_statements(statement: &Value, scope: Scope) -> Result<LogicTree, RuleError> {
    let mut builder = TreeBuilder::new();
    let root = build_node(&mut builder, statement, scope)?;
    Ok(builder.build(root))
}

fn build_node(builder: &mut TreeBuilder, statement: &Value, scope: Scope) -> Result<NodeId, RuleError> {
    let (key, value) = single_entry(statement)?;

    let node = match StatementKey::parse(key)? {
        StatementKey::And => Node::And(build_children(builder, key, value, scope)?),
        StatementKey::Or => Node::Or(build_children(builder, key, value, scope)?),
        StatementKey::Not => {
            let children = child_statements(key, value)?;
            if children.len() != 1 {
                return Err(RuleError::invalid(
                    "not statement must have exactly one child statement",
                ));
            }
            Node::Not(build_node(builder, &children[0], scope)?)
        }
        StatementKey::AtLeast(count) => Node::Some {
            count,
            children: build_children(builder, key, value, scope)?,
        },
        StatementKey::Optional => Node::Some {
            count: 0,
            children: build_children(builder, key, value, scope)?,
        },
        StatementKey::Subscope(target) => {
            if target.enclosing() != Some(scope) {
                let required = target.enclosing().map_or("no", |s| s.as_str());
                return Err(RuleError::invalid(format!(
                    "{target} subscope supported only for {required} scope"
                )));
            }
            let children = child_statements(key, value)?;
            if children.len() != 1 {
                return Err(RuleError::invalid(
                    "subscope must have exactly one child statement",
                ));
            }
            Node::Subscope {
                scope: target,
                child: build_node(builder, &children[0], target)?,
            }
        }
        StatementKey::Count(term) => {
            let feature = parse_counted_feature(term, scope)?;
            let (min, max) = parse_count(value)?;
            Node::Range { feature, min, max }
        }
        StatementKey::Feature(kind, characteristic) => {
            build_feature_leaf(kind, characteristic, value, scope)?
        }
    };

    Ok(builder.add(node))
}

fn single_entry(statement: &Value) -> Result<(&str, &Value), RuleError> {
    let mapping = statement.as_mapping().ok_or_else(|| {
        RuleError::invalid(format!(
            "statement must be a mapping, found: {}",
            describe(statement)
        ))
    })?;

    if mapping.is_empty() {
        return Err(RuleError::invalid("empty statement"));
    }
    if mapping.len() != 1 {
        return Err(RuleError::invalid("too many statements"));
    }

    let (key, value) = mapping
        .iter()
        .next()
        .ok_or_else(|| RuleError::invalid("empty statement"))?;
    let key = key.as_str().ok_or_else(|| {
        RuleError::invalid(format!("statement key must be a string: {}", describe(key)))
    })?;
    Ok((key, value))
}

fn child_statements<'v>(key: &str, value: &'v Value) -> Result<&'v [Value], RuleError> {
    value.as_sequence().map(Vec::as_slice).ok_or_else(|| {
        RuleError::invalid(format!(
            "{key} statement must contain a list of child statements"
        ))
    })
}

fn build_children(
    builder: &mut TreeBuilder,
    key: &str,
    value: &Value,
    scope: Scope,
) -> Result<Vec<NodeId>, RuleError> {
    child_statements(key, value)?
        .iter()
        .map(|child| build_node(builder, child, scope))
        .collect()
}

fn build_feature_leaf(
    kind: FeatureKind,
    characteristic: Option<&str>,
    value: &Value,
    scope: Scope,
) -> Result<Node, RuleError> {
    let feature = match kind {
        FeatureKind::Characteristic => {
            let name = characteristic.unwrap_or_default();
            let present = value.as_bool().ok_or_else(|| {
                RuleError::invalid(format!(
                    "unexpected value: characteristic({name}) must be true or false, found: {}",
                    describe(value)
                ))
            })?;
            Feature::new(FeatureValue::Characteristic {
                name: name.to_string(),
                value: present,
            })
        }
        FeatureKind::Number | FeatureKind::Offset | FeatureKind::Bytes => {
            symbol_feature(kind, value)?
        }
        FeatureKind::String => {
            let text = scalar_text(kind, value)?;
            if is_regex_literal(&text) {
                ensure_feature_valid_for_scope(scope, &Feature::string(text.as_str()))?;
                return Ok(Node::Regex(parse_regex(&text)?));
            }
            Feature::string(text)
        }
        FeatureKind::BasicBlocks => {
            return Err(RuleError::invalid(
                "basic blocks feature may only be counted, e.g. count(basic blocks)",
            ));
        }
        FeatureKind::Api
        | FeatureKind::Mnemonic
        | FeatureKind::Export
        | FeatureKind::Import
        | FeatureKind::Section
        | FeatureKind::MatchedRule => text_feature(kind, &scalar_text(kind, value)?)?,
    };

    ensure_feature_valid_for_scope(scope, &feature)?;
    Ok(Node::Feature(feature))
}

/// A `number`, `offset`, or `bytes` feature from a document value
///
/// Plain YAML integers are accepted for the numeric kinds; everything else
/// goes through the symbol grammar.
fn symbol_feature(kind: FeatureKind, value: &Value) -> Result<Feature, RuleError> {
    match value {
        Value::String(text) => text_feature(kind, text),
        Value::Number(number) if kind != FeatureKind::Bytes => {
            let value = number
                .as_i64()
                .or_else(|| number.as_u64().map(|v| v as i64))
                .ok_or_else(|| {
                    RuleError::invalid(format!(
                        "unexpected value: \"{number}\", must begin with numerical value"
                    ))
                })?;
            Ok(Feature::new(int_value(kind, value)))
        }
        other => Err(RuleError::invalid(format!(
            "unexpected {kind} value: {}",
            describe(other)
        ))),
    }
}

/// Build a non-characteristic feature from its textual argument
fn text_feature(kind: FeatureKind, text: &str) -> Result<Feature, RuleError> {
    let feature = match kind {
        FeatureKind::Api => Feature::api(text),
        FeatureKind::String => Feature::string(text),
        FeatureKind::Mnemonic => Feature::mnemonic(text),
        FeatureKind::Export => Feature::export(text),
        FeatureKind::Import => Feature::import(text),
        FeatureKind::Section => Feature::section(text),
        FeatureKind::MatchedRule => Feature::matched_rule(text),
        FeatureKind::Number | FeatureKind::Offset | FeatureKind::Bytes => {
            let (literal, symbol) = parse_symbol(text, kind)?;
            let value = match literal {
                SymbolLiteral::Int(value) => int_value(kind, value),
                SymbolLiteral::Bytes(bytes) => FeatureValue::Bytes(bytes),
            };
            Feature::with_symbol(value, symbol)
        }
        FeatureKind::BasicBlocks => {
            return Err(RuleError::invalid(format!(
                "unexpected argument for basic blocks: {text}"
            )));
        }
        FeatureKind::Characteristic => {
            return Err(RuleError::invalid(format!(
                "unexpected characteristic argument: {text}"
            )));
        }
    };
    Ok(feature)
}

fn int_value(kind: FeatureKind, value: i64) -> FeatureValue {
    match kind {
        FeatureKind::Offset => FeatureValue::Offset(value),
        _ => FeatureValue::Number(value),
    }
}

/// The feature inside `count(...)`, e.g. `mnemonic(mov)` or `characteristic(nzxor)`
fn parse_counted_feature(term: &str, scope: Scope) -> Result<Feature, RuleError> {
    let feature = if term.starts_with("characteristic(") {
        // counting a characteristic means counting where it is present
        match FeatureKind::from_key(term)? {
            (FeatureKind::Characteristic, Some(name)) => Feature::characteristic(name),
            _ => return Err(RuleError::invalid(format!("unexpected count term: {term}"))),
        }
    } else {
        let (name, argument) = match term.split_once('(') {
            Some((name, rest)) => (name, rest.strip_suffix(')').unwrap_or(rest)),
            None => (term, ""),
        };
        let (kind, _) = FeatureKind::from_key(name)?;

        if argument.is_empty() {
            match kind {
                FeatureKind::BasicBlocks => Feature::basic_block(),
                _ => {
                    return Err(RuleError::invalid(format!(
                        "count({kind}) requires an argument, e.g. count({kind}(...))"
                    )));
                }
            }
        } else {
            text_feature(kind, argument)?
        }
    };

    ensure_feature_valid_for_scope(scope, &feature)?;
    Ok(feature)
}

/// Interpret the value attached to a `count(...)` key
///
/// - `N`: exactly N
/// - `N or more`, `N or fewer`: one-sided bounds
/// - `(min,max)`: inclusive range, either side optional
fn parse_count(value: &Value) -> Result<(Option<u64>, Option<u64>), RuleError> {
    let unexpected = || RuleError::invalid(format!("unexpected range: {}", describe(value)));

    match value {
        Value::Number(number) => {
            let count = number.as_u64().ok_or_else(unexpected)?;
            Ok((Some(count), Some(count)))
        }
        Value::String(text) => {
            if let Some(min) = text.strip_suffix(" or more") {
                Ok((Some(count_bound(min).ok_or_else(unexpected)?), None))
            } else if let Some(max) = text.strip_suffix(" or fewer") {
                Ok((None, Some(count_bound(max).ok_or_else(unexpected)?)))
            } else if text.starts_with('(') {
                parse_range(text)
            } else {
                Err(unexpected())
            }
        }
        _ => Err(unexpected()),
    }
}

fn count_bound(text: &str) -> Option<u64> {
    parse_int(text).ok().and_then(|v| u64::try_from(v).ok())
}

fn scalar_text(kind: FeatureKind, value: &Value) -> Result<String, RuleError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(RuleError::invalid(format!(
            "unexpected {kind} value: {}",
            describe(other)
        ))),
    }
}

/// Short rendering of a document value for error messages
fn describe(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().replace('\n', " "))
        .unwrap_or_else(|_| format!("{value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(yaml: &str, scope: Scope) -> Result<LogicTree, RuleError> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        build_statements(&value, scope)
    }

    fn error(yaml: &str, scope: Scope) -> String {
        build(yaml, scope).unwrap_err().to_string()
    }

    fn root(tree: &LogicTree) -> &Node {
        tree.root_node()
    }

    #[test]
    fn test_and_or_combinators() {
        let tree = build(
            "and:\n  - api: CreateFileA\n  - or:\n    - api: WriteFile\n    - api: WriteFileEx\n",
            Scope::Function,
        )
        .unwrap();
        match root(&tree) {
            Node::And(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(tree.node(children[1]), Node::Or(c) if c.len() == 2));
            }
            other => panic!("unexpected root: {other:?}"),
        }
    }

    #[test]
    fn test_not_requires_single_child() {
        let tree = build("not:\n  - api: a\n", Scope::Function).unwrap();
        assert!(matches!(root(&tree), Node::Not(_)));

        assert_eq!(
            error("not:\n  - api: a\n  - api: b\n", Scope::Function),
            "invalid rule: not statement must have exactly one child statement"
        );
    }

    #[test]
    fn test_n_or_more_and_optional() {
        let tree = build("2 or more:\n  - api: a\n  - api: b\n  - api: c\n", Scope::Function)
            .unwrap();
        assert!(matches!(root(&tree), Node::Some { count: 2, children } if children.len() == 3));

        let tree = build("optional:\n  - api: a\n", Scope::Function).unwrap();
        assert!(matches!(root(&tree), Node::Some { count: 0, .. }));
    }

    #[test]
    fn test_too_many_statements() {
        assert_eq!(
            error("api: a\nmnemonic: mov\n", Scope::Function),
            "invalid rule: too many statements"
        );
    }

    #[test]
    fn test_statement_must_be_mapping() {
        assert!(error("- api: a\n", Scope::Function).contains("statement must be a mapping"));
    }

    #[test]
    fn test_combinator_requires_list() {
        assert_eq!(
            error("and: foo\n", Scope::Function),
            "invalid rule: and statement must contain a list of child statements"
        );
    }

    #[test]
    fn test_function_subscope_only_in_file_scope() {
        let tree = build("function:\n  - api: a\n", Scope::File).unwrap();
        assert!(matches!(root(&tree), Node::Subscope { scope: Scope::Function, .. }));

        assert_eq!(
            error("function:\n  - api: a\n", Scope::Function),
            "invalid rule: function subscope supported only for file scope"
        );
    }

    #[test]
    fn test_basic_block_subscope_only_in_function_scope() {
        let tree = build("basic block:\n  - mnemonic: xor\n", Scope::Function).unwrap();
        assert!(matches!(
            root(&tree),
            Node::Subscope {
                scope: Scope::BasicBlock,
                ..
            }
        ));

        assert_eq!(
            error("basic block:\n  - mnemonic: xor\n", Scope::File),
            "invalid rule: basic block subscope supported only for function scope"
        );
    }

    #[test]
    fn test_subscope_requires_single_child() {
        assert_eq!(
            error("function:\n  - api: a\n  - api: b\n", Scope::File),
            "invalid rule: subscope must have exactly one child statement"
        );
    }

    #[test]
    fn test_subscope_children_validated_at_inner_scope() {
        // api is illegal at file scope but legal inside a function subscope
        assert!(build("function:\n  - api: a\n", Scope::File).is_ok());
        assert!(
            error(
                "function:\n  - characteristic(embedded pe): true\n",
                Scope::File
            )
            .contains("not supported for scope function")
        );
    }

    #[test]
    fn test_count_exact_and_bounds() {
        let cases: &[(&str, Option<u64>, Option<u64>)] = &[
            ("count(mnemonic(mov)): 3\n", Some(3), Some(3)),
            ("count(mnemonic(mov)): 2 or more\n", Some(2), None),
            ("count(mnemonic(mov)): 4 or fewer\n", None, Some(4)),
            ("count(mnemonic(mov)): (1,5)\n", Some(1), Some(5)),
            ("count(mnemonic(mov)): (,5)\n", None, Some(5)),
        ];
        for (yaml, expected_min, expected_max) in cases {
            let tree = build(yaml, Scope::Function).unwrap();
            match root(&tree) {
                Node::Range { feature, min, max } => {
                    assert_eq!(feature, &Feature::mnemonic("mov"));
                    assert_eq!(min, expected_min, "{yaml}");
                    assert_eq!(max, expected_max, "{yaml}");
                }
                other => panic!("unexpected root: {other:?}"),
            }
        }
    }

    #[test]
    fn test_count_rejects_bad_ranges() {
        assert!(error("count(mnemonic(mov)): lots\n", Scope::Function).contains("unexpected range"));
        assert!(error("count(mnemonic(mov)): \"3\"\n", Scope::Function).contains("unexpected range"));
        assert!(error("count(mnemonic(mov)): (5,1)\n", Scope::Function).contains("max less than min"));
    }

    #[test]
    fn test_count_characteristic_and_basic_blocks() {
        let tree = build("count(characteristic(nzxor)): 2 or more\n", Scope::Function).unwrap();
        assert!(matches!(root(&tree), Node::Range { feature, .. } if *feature == Feature::characteristic("nzxor")));

        let tree = build("count(basic blocks): (4,)\n", Scope::Function).unwrap();
        assert!(matches!(root(&tree), Node::Range { feature, .. } if *feature == Feature::basic_block()));
    }

    #[test]
    fn test_count_symbol_arguments() {
        let tree = build("count(number(0x100 = PAGE_SIZE)): 2\n", Scope::Function).unwrap();
        match root(&tree) {
            Node::Range { feature, .. } => {
                assert_eq!(feature, &Feature::number(0x100));
                assert_eq!(feature.symbol(), Some("PAGE_SIZE"));
            }
            other => panic!("unexpected root: {other:?}"),
        }

        let tree = build("count(offset(0xC)): 1\n", Scope::Function).unwrap();
        assert!(matches!(root(&tree), Node::Range { feature, .. } if *feature == Feature::offset(12)));
    }

    #[test]
    fn test_count_validates_scope() {
        assert!(
            error("count(basic blocks): 2\n", Scope::BasicBlock)
                .contains("not supported for scope basic block")
        );
        assert!(
            error("count(characteristic(tight loop)): 1\n", Scope::Function)
                .contains("not supported for scope function")
        );
    }

    #[test]
    fn test_count_requires_argument() {
        assert!(error("count(mnemonic): 2\n", Scope::Function).contains("requires an argument"));
    }

    #[test]
    fn test_number_with_symbol() {
        let tree = build("number: 0x4550 = IMAGE_DOS_SIGNATURE\n", Scope::Function).unwrap();
        match root(&tree) {
            Node::Feature(feature) => {
                assert_eq!(feature, &Feature::number(0x4550));
                assert_eq!(feature.symbol(), Some("IMAGE_DOS_SIGNATURE"));
            }
            other => panic!("unexpected root: {other:?}"),
        }
    }

    #[test]
    fn test_number_as_yaml_integer() {
        let tree = build("number: 37\n", Scope::Function).unwrap();
        assert!(matches!(root(&tree), Node::Feature(f) if *f == Feature::number(37)));
    }

    #[test]
    fn test_bytes_feature() {
        let tree = build("bytes: 4D 5A 90 00\n", Scope::Function).unwrap();
        assert!(matches!(root(&tree), Node::Feature(f) if *f == Feature::bytes(vec![0x4d, 0x5a, 0x90, 0x00])));
        assert!(error("bytes: 4D 5\n", Scope::Function).contains("valid hex sequence"));
    }

    #[test]
    fn test_characteristic_feature() {
        let tree = build("characteristic(nzxor): true\n", Scope::Function).unwrap();
        assert!(matches!(root(&tree), Node::Feature(f) if *f == Feature::characteristic("nzxor")));
        assert!(error("characteristic(nzxor): yes please\n", Scope::Function).contains("true or false"));
    }

    #[test]
    fn test_regex_string() {
        let tree = build("string: /VirtualAlloc(Ex)?/i\n", Scope::Function).unwrap();
        match root(&tree) {
            Node::Regex(pattern) => {
                assert_eq!(pattern.literal(), "/VirtualAlloc(Ex)?/i");
                assert!(pattern.is_match("virtualallocex"));
            }
            other => panic!("unexpected root: {other:?}"),
        }

        let tree = build("string: plain text\n", Scope::File).unwrap();
        assert!(matches!(root(&tree), Node::Feature(f) if *f == Feature::string("plain text")));
    }

    #[test]
    fn test_invalid_regex() {
        assert!(error("string: /foo(/\n", Scope::Function).contains("invalid regular expression"));
    }

    #[test]
    fn test_feature_scope_validation() {
        assert_eq!(
            error("api: CreateFileA\n", Scope::File),
            "invalid rule: feature api(CreateFileA) not supported for scope file"
        );
        assert!(build("export: DllMain\n", Scope::File).is_ok());
        assert!(error("export: DllMain\n", Scope::Function).contains("not supported"));
    }

    #[test]
    fn test_nested_leaves_are_validated() {
        assert!(
            error("and:\n  - or:\n    - mnemonic: mov\n", Scope::File).contains("not supported")
        );
    }

    #[test]
    fn test_unknown_statement() {
        assert_eq!(
            error("instruction: mov\n", Scope::Function),
            "invalid rule: unexpected statement: instruction"
        );
        assert!(error("many or more:\n  - api: a\n", Scope::Function).contains("unexpected statement"));
    }

    #[test]
    fn test_basic_blocks_must_be_counted() {
        assert!(error("basic blocks: 3\n", Scope::Function).contains("may only be counted"));
    }

    #[test]
    fn test_match_feature() {
        let tree = build("match: create file\n", Scope::File).unwrap();
        assert!(matches!(root(&tree), Node::Feature(f) if f.matched_rule_name() == Some("create file")));
    }
}
