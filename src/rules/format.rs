#![forbid(unsafe_code)]

//! Canonical re-serialization of rule documents
//!
//! Rules are written back out in a single house style:
//!
//! - within `rule`, `meta` and then `features` come last
//! - meta keys in [`PREFERRED_META_ORDER`], then the rest alphabetically
//! - block style throughout, lists indented two spaces below their parent
//! - `number` and `offset` integers in hex
//!
//! ```yaml
//! rule:
//!   meta:
//!     name: encrypt data using AES
//!     scope: function
//!   features:
//!     - or:
//!       - mnemonic: aesenc
//!       - mnemonic: aesdec
//! ```
//!
//! Comments in the source document are not carried over.

use crate::engine::{LogicTree, Node, NodeId};
use crate::error::RuleError;
use crate::features::{Feature, FeatureValue};
use serde_yaml::{Mapping, Value};

/// Meta keys that lead, in this order, when present
pub const PREFERRED_META_ORDER: [&str; 8] = [
    "name",
    "namespace",
    "rule-category",
    "author",
    "att&ck",
    "mbc",
    "examples",
    "scope",
];

const INDENT: &str = "  ";

/// Re-emit a rule document in canonical form
///
/// The result has no trailing newline.
///
/// # Errors
///
/// Returns `RuleError::InvalidRule` if the text is not YAML or lacks a
/// `rule.meta` mapping.
pub fn format_definition(definition: &str) -> Result<String, RuleError> {
    let document: Value = serde_yaml::from_str(definition)
        .map_err(|e| RuleError::invalid(format!("failed to parse rule document: {e}")))?;
    let document = canonicalize(&document)?;
    let rendered = render_yaml(&document)?;
    Ok(rendered.trim_end_matches('\n').to_string())
}

/// Reorder the `rule` section and its meta keys
pub fn canonicalize(document: &Value) -> Result<Value, RuleError> {
    let root = document
        .as_mapping()
        .ok_or_else(|| RuleError::invalid("rule document must be a mapping"))?;
    let rule = root
        .get("rule")
        .and_then(Value::as_mapping)
        .ok_or_else(|| RuleError::invalid("missing rule section"))?;
    let meta = rule
        .get("meta")
        .and_then(Value::as_mapping)
        .ok_or_else(|| RuleError::invalid("missing rule.meta section"))?;

    let mut reordered_rule = Mapping::new();
    for (key, value) in rule {
        if key.as_str() != Some("meta") && key.as_str() != Some("features") {
            reordered_rule.insert(key.clone(), value.clone());
        }
    }
    reordered_rule.insert(Value::from("meta"), Value::Mapping(order_meta(meta)));
    if let Some(features) = rule.get("features") {
        reordered_rule.insert(Value::from("features"), features.clone());
    }

    let mut reordered = Mapping::new();
    for (key, value) in root {
        if key.as_str() == Some("rule") {
            reordered.insert(key.clone(), Value::Mapping(reordered_rule.clone()));
        } else {
            reordered.insert(key.clone(), value.clone());
        }
    }
    Ok(Value::Mapping(reordered))
}

fn order_meta(meta: &Mapping) -> Mapping {
    let mut ordered = Mapping::new();
    for key in PREFERRED_META_ORDER {
        if let Some(value) = meta.get(key) {
            ordered.insert(Value::from(key), value.clone());
        }
    }

    let mut rest: Vec<(&Value, &Value)> = meta
        .iter()
        .filter(|(key, _)| {
            key.as_str()
                .is_none_or(|key| !PREFERRED_META_ORDER.contains(&key))
        })
        .collect();
    rest.sort_by_key(|(key, _)| sort_key(key));
    for (key, value) in rest {
        ordered.insert(key.clone(), value.clone());
    }
    ordered
}

fn sort_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => scalar(other).unwrap_or_default(),
    }
}

/// Render a document as block-style YAML, one trailing newline
pub fn render_yaml(value: &Value) -> Result<String, RuleError> {
    let lines = block_lines(value, false)?;
    let mut rendered = lines.join("\n");
    rendered.push('\n');
    Ok(rendered)
}

fn is_block(value: &Value) -> bool {
    match value {
        Value::Mapping(mapping) => !mapping.is_empty(),
        Value::Sequence(sequence) => !sequence.is_empty(),
        _ => false,
    }
}

/// Lines of `value`, relative to its own indentation
///
/// A mapping that is itself a list item keeps its nested lists level with
/// its keys, which puts their dashes two columns past the item's dash.
fn block_lines(value: &Value, list_item: bool) -> Result<Vec<String>, RuleError> {
    let mut lines = Vec::new();
    match value {
        Value::Mapping(mapping) if !mapping.is_empty() => {
            for (key, value) in mapping {
                let key_text = scalar(key)?;
                if is_block(value) {
                    let indent = if list_item && value.is_sequence() {
                        ""
                    } else {
                        INDENT
                    };
                    lines.push(format!("{key_text}:"));
                    lines.extend(
                        block_lines(value, false)?
                            .into_iter()
                            .map(|line| format!("{indent}{line}")),
                    );
                } else {
                    lines.push(format!("{key_text}: {}", entry_scalar(key, value)?));
                }
            }
        }
        Value::Sequence(sequence) if !sequence.is_empty() => {
            for item in sequence {
                let item_lines = if is_block(item) {
                    block_lines(item, true)?
                } else {
                    vec![scalar(item)?]
                };
                for (index, line) in item_lines.into_iter().enumerate() {
                    if index == 0 {
                        lines.push(format!("- {line}"));
                    } else {
                        lines.push(format!("{INDENT}{line}"));
                    }
                }
            }
        }
        other => lines.push(scalar(other)?),
    }
    Ok(lines)
}

/// A mapping value; plain integers under `number` and `offset` stay hex
fn entry_scalar(key: &Value, value: &Value) -> Result<String, RuleError> {
    if let (Some("number" | "offset"), Value::Number(number)) = (key.as_str(), value) {
        if let Some(unsigned) = number.as_u64() {
            return Ok(format!("0x{unsigned:X}"));
        }
        if let Some(signed) = number.as_i64() {
            return Ok(int_literal(signed));
        }
    }
    scalar(value)
}

/// Single-line rendering of a scalar or empty collection
fn scalar(value: &Value) -> Result<String, RuleError> {
    match value {
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Mapping(_) => Ok("{}".to_string()),
        Value::Sequence(_) => Ok("[]".to_string()),
        Value::String(s) => {
            let rendered = serde_yaml::to_string(value)
                .map_err(|e| RuleError::invalid(format!("failed to render string: {e}")))?;
            let rendered = rendered.trim_end_matches('\n');
            if rendered.contains('\n') {
                // multi-line strings become block scalars; keep them on one line
                serde_json::to_string(s)
                    .map_err(|e| RuleError::invalid(format!("failed to render string: {e}")))
            } else {
                Ok(rendered.to_string())
            }
        }
        Value::Tagged(_) => {
            let rendered = serde_yaml::to_string(value)
                .map_err(|e| RuleError::invalid(format!("failed to render value: {e}")))?;
            let rendered = rendered.trim_end_matches('\n');
            if rendered.contains('\n') {
                return Err(RuleError::invalid(format!(
                    "unsupported tagged value: {rendered}"
                )));
            }
            Ok(rendered.to_string())
        }
    }
}

/// Convert a compiled logic tree back into its statement mapping
///
/// Compiling the result at the same scope yields a structurally equal tree.
pub fn statement_to_value(tree: &LogicTree) -> Value {
    node_to_value(tree, tree.root())
}

fn node_to_value(tree: &LogicTree, id: NodeId) -> Value {
    let children = |tree: &LogicTree| -> Value {
        Value::Sequence(
            tree.children(id)
                .iter()
                .map(|child| node_to_value(tree, *child))
                .collect(),
        )
    };

    match tree.node(id) {
        Node::And(_) => single("and", children(tree)),
        Node::Or(_) => single("or", children(tree)),
        Node::Not(_) => single("not", children(tree)),
        Node::Some { count: 0, .. } => single("optional", children(tree)),
        Node::Some { count, .. } => single(&format!("{count} or more"), children(tree)),
        Node::Subscope { scope, .. } => single(scope.as_str(), children(tree)),
        Node::Regex(pattern) => single("string", Value::from(pattern.literal())),
        Node::Range { feature, min, max } => {
            single(&format!("count({})", counted_term(feature)), range_value(*min, *max))
        }
        Node::Feature(feature) => feature_entry(feature),
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut mapping = Mapping::new();
    mapping.insert(Value::from(key), value);
    Value::Mapping(mapping)
}

fn feature_entry(feature: &Feature) -> Value {
    match feature.value() {
        FeatureValue::Characteristic { name, value } => {
            single(&format!("characteristic({name})"), Value::Bool(*value))
        }
        FeatureValue::BasicBlock => single("count(basic blocks)", range_value(Some(1), None)),
        _ => single(feature.kind().as_str(), Value::from(argument_text(feature))),
    }
}

/// The textual argument of a feature, symbol included
fn argument_text(feature: &Feature) -> String {
    let literal = match feature.value() {
        FeatureValue::Number(v) | FeatureValue::Offset(v) => int_literal(*v),
        FeatureValue::Bytes(bytes) => bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" "),
        FeatureValue::Api(s)
        | FeatureValue::String(s)
        | FeatureValue::Mnemonic(s)
        | FeatureValue::Export(s)
        | FeatureValue::Import(s)
        | FeatureValue::Section(s)
        | FeatureValue::MatchedRule(s) => s.clone(),
        FeatureValue::Characteristic { name, .. } => name.clone(),
        FeatureValue::BasicBlock => String::new(),
    };

    match feature.symbol() {
        Some(symbol) => format!("{literal} = {symbol}"),
        None => literal,
    }
}

fn int_literal(value: i64) -> String {
    if value < 0 {
        value.to_string()
    } else {
        format!("0x{value:X}")
    }
}

fn counted_term(feature: &Feature) -> String {
    match feature.value() {
        FeatureValue::Characteristic { name, .. } => format!("characteristic({name})"),
        FeatureValue::BasicBlock => "basic blocks".to_string(),
        _ => format!("{}({})", feature.kind(), argument_text(feature)),
    }
}

fn range_value(min: Option<u64>, max: Option<u64>) -> Value {
    match (min, max) {
        (Some(min), Some(max)) if min == max => Value::from(min),
        (Some(min), None) => Value::from(format!("{min} or more")),
        (None, Some(max)) => Value::from(format!("{max} or fewer")),
        (min, max) => {
            let min = min.map_or(String::new(), |v| v.to_string());
            let max = max.map_or(String::new(), |v| v.to_string());
            Value::from(format!("({min},{max})"))
        }
    }
}
