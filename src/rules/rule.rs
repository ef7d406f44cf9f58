#![forbid(unsafe_code)]

//! Compiled capability rules

use crate::engine::{FeatureSet, LogicTree, Node, NodeId};
use crate::error::RuleError;
use crate::features::Feature;
use crate::rules::builder::build_statements;
use crate::rules::format::{format_definition, render_yaml, statement_to_value};
use crate::types::Scope;
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Author-supplied metadata, in document order
pub type Meta = IndexMap<String, Value>;

/// Meta key marking a rule synthesized from a subscope
pub const SUBSCOPE_RULE_KEY: &str = "capa/subscope-rule";

/// Meta key naming the rule a subscope rule was extracted from
pub const PARENT_KEY: &str = "capa/parent";

/// A named logic tree evaluated at one scope
///
/// Rules are compiled from documents of the form:
///
/// ```yaml
/// rule:
///   meta:
///     name: create file
///     scope: function
///   features:
///     - or:
///       - api: CreateFileA
///       - api: CreateFileW
/// ```
///
/// The root statement is never a subscope. Subscopes nested deeper are
/// replaced by `match` references when [`Rule::extract_subscope_rules`] runs.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    scope: Scope,
    statement: LogicTree,
    meta: Meta,
    definition: String,
}

impl Rule {
    /// Assemble a rule from already compiled parts
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidRule` if the root statement is a subscope.
    pub fn new(
        name: impl Into<String>,
        scope: Scope,
        statement: LogicTree,
        meta: Meta,
        definition: impl Into<String>,
    ) -> Result<Self, RuleError> {
        if statement.root_node().is_subscope() {
            return Err(RuleError::invalid("top level statement may not be a subscope"));
        }

        Ok(Self {
            name: name.into(),
            scope,
            statement,
            meta,
            definition: definition.into(),
        })
    }

    /// Compile a parsed rule document
    ///
    /// `definition` is the source text, kept for re-serialization.
    pub fn from_value(document: &Value, definition: impl Into<String>) -> Result<Self, RuleError> {
        let rule = document
            .get("rule")
            .ok_or_else(|| RuleError::invalid("missing rule section"))?;
        let meta = rule
            .get("meta")
            .and_then(Value::as_mapping)
            .ok_or_else(|| RuleError::invalid("rule is missing a meta section"))?;
        let meta = meta_from_mapping(meta)?;

        let name = meta
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RuleError::invalid("rule meta must have a string name"))?
            .to_string();

        if meta.get("lib").is_some_and(|lib| !lib.is_bool()) {
            return Err(RuleError::invalid("rule lib flag must be true or false"));
        }

        let scope = match meta.get("scope") {
            None => Scope::Function,
            Some(Value::String(scope)) => scope.parse()?,
            Some(_) => return Err(RuleError::invalid("rule scope must be a string")),
        };

        let statements = rule
            .get("features")
            .and_then(Value::as_sequence)
            .filter(|statements| statements.len() == 1)
            .ok_or_else(|| RuleError::invalid("rule must begin with a single top level statement"))?;

        let statement = build_statements(&statements[0], scope)?;
        Rule::new(name, scope, statement, meta, definition)
    }

    /// Compile a rule from YAML text
    pub fn from_yaml(text: &str) -> Result<Self, RuleError> {
        let document: Value = serde_yaml::from_str(text)
            .map_err(|e| RuleError::invalid(format!("failed to parse rule document: {e}")))?;
        Self::from_value(&document, text)
    }

    /// Read and compile a rule file
    ///
    /// Compilation errors are attributed to `path`.
    pub fn from_yaml_file(path: &Path) -> Result<Self, RuleError> {
        let text = fs::read_to_string(path).map_err(|source| RuleError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|e| e.with_path(path))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn statement(&self) -> &LogicTree {
        &self.statement
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// The source text this rule was compiled from
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Whether the rule only exists to be referenced by other rules
    pub fn is_lib(&self) -> bool {
        matches!(self.meta.get("lib"), Some(Value::Bool(true)))
    }

    /// Whether the rule was synthesized from another rule's subscope
    pub fn is_subscope_rule(&self) -> bool {
        matches!(self.meta.get(SUBSCOPE_RULE_KEY), Some(Value::Bool(true)))
    }

    /// The rule a subscope rule was extracted from
    pub fn parent(&self) -> Option<&str> {
        self.meta.get(PARENT_KEY).and_then(Value::as_str)
    }

    /// Names of the rules this rule references through `match`
    pub fn get_dependencies(&self) -> BTreeSet<String> {
        self.statement
            .features()
            .into_iter()
            .filter_map(Feature::matched_rule_name)
            .map(str::to_string)
            .collect()
    }

    /// Evaluate the rule's statement against observed features
    pub fn evaluate(&self, features: &FeatureSet) -> bool {
        self.statement.evaluate(features)
    }

    /// Replace each subscope directly reachable from the root with a
    /// `match` reference, returning the rules synthesized for them
    ///
    /// Synthesized rules are named `<parent>/subscope-<path>`, where the path
    /// lists child indices from the root, and are marked `lib` so they are
    /// only evaluated on behalf of their parent. A subscope nested inside
    /// another subscope travels with the outer one and is extracted when the
    /// synthesized rule is itself processed.
    pub fn extract_subscope_rules(&mut self) -> Result<Vec<Rule>, RuleError> {
        self.extract_subscope_rules_avoiding(&mut HashSet::new())
    }

    /// Like [`Rule::extract_subscope_rules`], never reusing a name in `taken`
    ///
    /// A generated name that is already taken gets a `-2`, `-3`, ... suffix.
    /// Every name handed out is added to `taken`.
    pub fn extract_subscope_rules_avoiding(
        &mut self,
        taken: &mut HashSet<String>,
    ) -> Result<Vec<Rule>, RuleError> {
        taken.insert(self.name.clone());

        let mut extraction = Extraction {
            parent: &self.name,
            path: Vec::new(),
            taken,
            extracted: Vec::new(),
        };
        let root = self.statement.root();
        extraction.visit(&mut self.statement, root)?;
        Ok(extraction.extracted)
    }

    /// Canonical re-serialization of the rule's definition
    pub fn to_yaml(&self) -> Result<String, RuleError> {
        format_definition(&self.definition)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule(name={}, scope={})", self.name, self.scope)
    }
}

fn meta_from_mapping(mapping: &Mapping) -> Result<Meta, RuleError> {
    mapping
        .iter()
        .map(|(key, value)| {
            let key = key
                .as_str()
                .ok_or_else(|| RuleError::invalid("rule meta keys must be strings"))?;
            Ok((key.to_string(), value.clone()))
        })
        .collect()
}

struct Extraction<'a> {
    parent: &'a str,
    path: Vec<usize>,
    taken: &'a mut HashSet<String>,
    extracted: Vec<Rule>,
}

impl Extraction<'_> {
    fn visit(&mut self, tree: &mut LogicTree, id: NodeId) -> Result<(), RuleError> {
        let children = tree.children(id).to_vec();
        for (index, child) in children.into_iter().enumerate() {
            self.path.push(index);

            if let &Node::Subscope { scope, child: inner } = tree.node(child) {
                let name = self.claim_name();
                let mut statement = tree.subtree(inner);
                if statement.root_node().is_subscope() {
                    // keep the root a combinator; the inner subscope is peeled on a later pass
                    statement.wrap_root_in_and();
                }

                let reference =
                    tree.add_node(Node::Feature(Feature::matched_rule(name.as_str())));
                tree.replace_child(id, child, reference);

                debug!(parent = self.parent, rule = %name, %scope, "extracted subscope rule");
                self.extracted
                    .push(synthesize(name, scope, statement, self.parent)?);
            } else {
                self.visit(tree, child)?;
            }

            self.path.pop();
        }
        Ok(())
    }

    fn claim_name(&mut self) -> String {
        let base = subscope_rule_name(self.parent, &self.path);
        let mut name = base.clone();
        let mut suffix = 2;
        while self.taken.contains(&name) {
            name = format!("{base}-{suffix}");
            suffix += 1;
        }
        self.taken.insert(name.clone());
        name
    }
}

fn subscope_rule_name(parent: &str, path: &[usize]) -> String {
    let path: Vec<String> = path.iter().map(usize::to_string).collect();
    format!("{parent}/subscope-{}", path.join("."))
}

fn synthesize(
    name: String,
    scope: Scope,
    statement: LogicTree,
    parent: &str,
) -> Result<Rule, RuleError> {
    let mut meta = Meta::new();
    meta.insert("name".to_string(), Value::from(name.as_str()));
    meta.insert("scope".to_string(), Value::from(scope.as_str()));
    meta.insert("lib".to_string(), Value::Bool(true));
    meta.insert(SUBSCOPE_RULE_KEY.to_string(), Value::Bool(true));
    meta.insert(PARENT_KEY.to_string(), Value::from(parent));

    let definition = synthesized_definition(&meta, &statement)?;
    Ok(Rule {
        name,
        scope,
        statement,
        meta,
        definition,
    })
}

/// Document text for a synthesized rule, so it re-serializes like any other
fn synthesized_definition(meta: &Meta, statement: &LogicTree) -> Result<String, RuleError> {
    let meta: Mapping = meta
        .iter()
        .map(|(key, value)| (Value::from(key.as_str()), value.clone()))
        .collect();

    let mut rule = Mapping::new();
    rule.insert(Value::from("meta"), Value::Mapping(meta));
    rule.insert(
        Value::from("features"),
        Value::Sequence(vec![statement_to_value(statement)]),
    );
    let mut document = Mapping::new();
    document.insert(Value::from("rule"), Value::Mapping(rule));

    render_yaml(&Value::Mapping(document))
}
