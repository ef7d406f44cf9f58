#![forbid(unsafe_code)]

//! Arena-backed logic trees
//!
//! A rule's compiled statement is stored as a flat vector of [`Node`]s that
//! refer to their children by [`NodeId`]. Rewrites (replacing a subscope with
//! a `match` reference) are index updates on the parent node rather than
//! pointer surgery, so a tree can be edited while it is being walked by id.

use crate::features::{Feature, FeatureValue};
use crate::types::Scope;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::warn;

/// Handle to a node inside a [`LogicTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A compiled regular expression leaf, keeping its `/.../` source form
#[derive(Debug, Clone)]
pub struct RegexPattern {
    literal: String,
    regex: Regex,
}

impl RegexPattern {
    pub fn new(literal: impl Into<String>, regex: Regex) -> Self {
        Self {
            literal: literal.into(),
            regex,
        }
    }

    /// The literal as written in the rule, e.g. `/create\s+file/i`
    pub fn literal(&self) -> &str {
        &self.literal
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

impl PartialEq for RegexPattern {
    fn eq(&self, other: &Self) -> bool {
        self.literal == other.literal
    }
}

/// One node of a logic tree
#[derive(Debug, Clone)]
pub enum Node {
    And(Vec<NodeId>),
    Or(Vec<NodeId>),
    Not(NodeId),
    /// At least `count` children must hold; `count == 0` always holds
    Some {
        count: usize,
        children: Vec<NodeId>,
    },
    /// The number of observations of `feature` lies within the bounds
    Range {
        feature: Feature,
        min: Option<u64>,
        max: Option<u64>,
    },
    Regex(RegexPattern),
    /// Transient marker for a clause evaluated at a narrower scope
    Subscope {
        scope: Scope,
        child: NodeId,
    },
    Feature(Feature),
}

impl Node {
    pub fn is_subscope(&self) -> bool {
        matches!(self, Node::Subscope { .. })
    }

    fn children(&self) -> &[NodeId] {
        match self {
            Node::And(children) | Node::Or(children) | Node::Some { children, .. } => children,
            Node::Not(child) | Node::Subscope { child, .. } => std::slice::from_ref(child),
            Node::Range { .. } | Node::Regex(_) | Node::Feature(_) => &[],
        }
    }

    fn replace_child(&mut self, old: NodeId, new: NodeId) -> bool {
        match self {
            Node::And(children) | Node::Or(children) | Node::Some { children, .. } => {
                match children.iter_mut().find(|child| **child == old) {
                    Some(slot) => {
                        *slot = new;
                        true
                    }
                    None => false,
                }
            }
            Node::Not(child) | Node::Subscope { child, .. } if *child == old => {
                *child = new;
                true
            }
            _ => false,
        }
    }

    fn with_children(&self, children: Vec<NodeId>) -> Node {
        match self {
            Node::And(_) => Node::And(children),
            Node::Or(_) => Node::Or(children),
            Node::Some { count, .. } => Node::Some {
                count: *count,
                children,
            },
            Node::Not(_) => Node::Not(children[0]),
            Node::Subscope { scope, .. } => Node::Subscope {
                scope: *scope,
                child: children[0],
            },
            leaf => leaf.clone(),
        }
    }
}

/// Incrementally assembles a [`LogicTree`] bottom-up
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node whose children have already been added
    pub fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn build(self, root: NodeId) -> LogicTree {
        LogicTree {
            nodes: self.nodes,
            root,
        }
    }
}

/// A rule's logic tree
///
/// Nodes that become unreachable after a rewrite stay in the arena; every
/// traversal starts from the root, so they are never observed.
#[derive(Debug, Clone)]
pub struct LogicTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl LogicTree {
    /// A tree made of a single node
    pub fn leaf(node: Node) -> Self {
        let mut builder = TreeBuilder::new();
        let root = builder.add(node);
        builder.build(root)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn root_node(&self) -> &Node {
        self.node(self.root)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).children()
    }

    /// Append a detached node, to be linked in with [`LogicTree::replace_child`]
    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Point `parent` at `new` where it used to point at `old`
    ///
    /// Returns false when `old` is not a child of `parent`.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> bool {
        self.nodes[parent.0].replace_child(old, new)
    }

    /// Put the current root under a new one-child `and` node
    pub fn wrap_root_in_and(&mut self) {
        let old_root = self.root;
        self.root = self.add_node(Node::And(vec![old_root]));
    }

    /// Copy the subtree rooted at `id` into a fresh, compact tree
    pub fn subtree(&self, id: NodeId) -> LogicTree {
        let mut builder = TreeBuilder::new();
        let root = self.copy_into(id, &mut builder);
        builder.build(root)
    }

    fn copy_into(&self, id: NodeId, builder: &mut TreeBuilder) -> NodeId {
        let node = self.node(id);
        let children: Vec<NodeId> = node
            .children()
            .iter()
            .map(|child| self.copy_into(*child, builder))
            .collect();
        builder.add(node.with_children(children))
    }

    /// Reachable node ids in pre-order
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        order
    }

    /// Whether any reachable node is a subscope marker
    pub fn contains_subscope(&self) -> bool {
        self.walk().into_iter().any(|id| self.node(id).is_subscope())
    }

    /// Feature leaves reachable from the root, including counted features
    pub fn features(&self) -> Vec<&Feature> {
        self.walk()
            .into_iter()
            .filter_map(|id| match self.node(id) {
                Node::Feature(feature) | Node::Range { feature, .. } => Some(feature),
                _ => None,
            })
            .collect()
    }

    /// Evaluate the tree against the observed features
    pub fn evaluate(&self, features: &FeatureSet) -> bool {
        self.evaluate_node(self.root, features)
    }

    fn evaluate_node(&self, id: NodeId, features: &FeatureSet) -> bool {
        match self.node(id) {
            Node::And(children) => children.iter().all(|c| self.evaluate_node(*c, features)),
            Node::Or(children) => children.iter().any(|c| self.evaluate_node(*c, features)),
            Node::Not(child) => !self.evaluate_node(*child, features),
            Node::Some { count, children } => {
                let satisfied = children
                    .iter()
                    .filter(|c| self.evaluate_node(**c, features))
                    .count();
                satisfied >= *count
            }
            Node::Range { feature, min, max } => {
                let observed = features.count(feature) as u64;
                min.is_none_or(|min| observed >= min) && max.is_none_or(|max| observed <= max)
            }
            Node::Regex(pattern) => features.iter().any(|(feature, _)| {
                matches!(feature.value(), FeatureValue::String(s) if pattern.is_match(s))
            }),
            Node::Subscope { scope, .. } => {
                warn!(%scope, "subscope statement evaluated directly; treating as unmatched");
                false
            }
            Node::Feature(feature) => match feature.value() {
                FeatureValue::Bytes(pattern) => features.iter().any(|(observed, _)| {
                    matches!(observed.value(), FeatureValue::Bytes(b) if b.starts_with(pattern))
                }),
                _ => features.contains(feature),
            },
        }
    }

    fn same_shape(&self, id: NodeId, other: &LogicTree, other_id: NodeId) -> bool {
        let (a, b) = (self.node(id), other.node(other_id));
        let leaves_equal = match (a, b) {
            (Node::And(_), Node::And(_))
            | (Node::Or(_), Node::Or(_))
            | (Node::Not(_), Node::Not(_)) => true,
            (Node::Some { count: x, .. }, Node::Some { count: y, .. }) => x == y,
            (Node::Subscope { scope: x, .. }, Node::Subscope { scope: y, .. }) => x == y,
            (
                Node::Range {
                    feature: f1,
                    min: min1,
                    max: max1,
                },
                Node::Range {
                    feature: f2,
                    min: min2,
                    max: max2,
                },
            ) => f1 == f2 && min1 == min2 && max1 == max2,
            (Node::Regex(x), Node::Regex(y)) => x == y,
            (Node::Feature(x), Node::Feature(y)) => x == y,
            _ => false,
        };

        leaves_equal
            && a.children().len() == b.children().len()
            && a.children()
                .iter()
                .zip(b.children())
                .all(|(x, y)| self.same_shape(*x, other, *y))
    }
}

/// Structural equality: same shape and leaves, regardless of arena layout
impl PartialEq for LogicTree {
    fn eq(&self, other: &Self) -> bool {
        self.same_shape(self.root, other, other.root)
    }
}

impl fmt::Display for LogicTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn render(tree: &LogicTree, id: NodeId, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let indent = "  ".repeat(depth);
            match tree.node(id) {
                Node::And(_) => writeln!(f, "{indent}and:")?,
                Node::Or(_) => writeln!(f, "{indent}or:")?,
                Node::Not(_) => writeln!(f, "{indent}not:")?,
                Node::Some { count, .. } => writeln!(f, "{indent}{count} or more:")?,
                Node::Subscope { scope, .. } => writeln!(f, "{indent}{scope}:")?,
                Node::Range { feature, min, max } => {
                    let min = min.map_or(String::new(), |v| v.to_string());
                    let max = max.map_or(String::new(), |v| v.to_string());
                    writeln!(f, "{indent}count({feature}): ({min},{max})")?
                }
                Node::Regex(pattern) => writeln!(f, "{indent}string: {}", pattern.literal())?,
                Node::Feature(feature) => writeln!(f, "{indent}{feature}")?,
            }
            for child in tree.children(id) {
                render(tree, *child, depth + 1, f)?;
            }
            Ok(())
        }

        render(self, self.root, 0, f)
    }
}

/// Features observed at one location, each with the addresses it was seen at
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    features: HashMap<Feature, BTreeSet<u64>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: Feature, address: u64) {
        self.features.entry(feature).or_default().insert(address);
    }

    pub fn contains(&self, feature: &Feature) -> bool {
        self.features.contains_key(feature)
    }

    pub fn addresses(&self, feature: &Feature) -> Option<&BTreeSet<u64>> {
        self.features.get(feature)
    }

    /// Number of addresses `feature` was observed at
    pub fn count(&self, feature: &Feature) -> usize {
        self.features.get(feature).map_or(0, BTreeSet::len)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Feature, &BTreeSet<u64>)> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FromIterator<(Feature, u64)> for FeatureSet {
    fn from_iter<T: IntoIterator<Item = (Feature, u64)>>(iter: T) -> Self {
        let mut set = FeatureSet::new();
        for (feature, address) in iter {
            set.insert(feature, address);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_set(features: &[Feature]) -> FeatureSet {
        features.iter().cloned().map(|f| (f, 0x1000)).collect()
    }

    fn and_of(leaves: Vec<Feature>) -> LogicTree {
        let mut builder = TreeBuilder::new();
        let children = leaves
            .into_iter()
            .map(|f| builder.add(Node::Feature(f)))
            .collect();
        let root = builder.add(Node::And(children));
        builder.build(root)
    }

    #[test]
    fn test_and_or_not() {
        let tree = and_of(vec![Feature::api("CreateFileA"), Feature::api("WriteFile")]);
        assert!(tree.evaluate(&feature_set(&[
            Feature::api("CreateFileA"),
            Feature::api("WriteFile")
        ])));
        assert!(!tree.evaluate(&feature_set(&[Feature::api("CreateFileA")])));

        let mut builder = TreeBuilder::new();
        let leaf = builder.add(Node::Feature(Feature::mnemonic("xor")));
        let root = builder.add(Node::Not(leaf));
        let not = builder.build(root);
        assert!(not.evaluate(&FeatureSet::new()));
        assert!(!not.evaluate(&feature_set(&[Feature::mnemonic("xor")])));
    }

    #[test]
    fn test_some_counts_satisfied_children() {
        let mut builder = TreeBuilder::new();
        let a = builder.add(Node::Feature(Feature::api("a")));
        let b = builder.add(Node::Feature(Feature::api("b")));
        let c = builder.add(Node::Feature(Feature::api("c")));
        let root = builder.add(Node::Some {
            count: 2,
            children: vec![a, b, c],
        });
        let tree = builder.build(root);

        assert!(!tree.evaluate(&feature_set(&[Feature::api("a")])));
        assert!(tree.evaluate(&feature_set(&[Feature::api("a"), Feature::api("c")])));
    }

    #[test]
    fn test_optional_always_holds() {
        let mut builder = TreeBuilder::new();
        let a = builder.add(Node::Feature(Feature::api("a")));
        let root = builder.add(Node::Some {
            count: 0,
            children: vec![a],
        });
        assert!(builder.build(root).evaluate(&FeatureSet::new()));
    }

    #[test]
    fn test_range_counts_addresses() {
        let tree = LogicTree::leaf(Node::Range {
            feature: Feature::mnemonic("mov"),
            min: Some(2),
            max: Some(3),
        });

        let mut features = FeatureSet::new();
        features.insert(Feature::mnemonic("mov"), 1);
        assert!(!tree.evaluate(&features));
        features.insert(Feature::mnemonic("mov"), 2);
        assert!(tree.evaluate(&features));
        features.insert(Feature::mnemonic("mov"), 3);
        features.insert(Feature::mnemonic("mov"), 4);
        assert!(!tree.evaluate(&features));
    }

    #[test]
    fn test_unbounded_range() {
        let tree = LogicTree::leaf(Node::Range {
            feature: Feature::basic_block(),
            min: None,
            max: Some(1),
        });
        assert!(tree.evaluate(&FeatureSet::new()));
    }

    #[test]
    fn test_regex_matches_strings() {
        let pattern = RegexPattern::new("/hello/i", Regex::new("(?i)hello").unwrap());
        let tree = LogicTree::leaf(Node::Regex(pattern));
        assert!(tree.evaluate(&feature_set(&[Feature::string("say HELLO")])));
        assert!(!tree.evaluate(&feature_set(&[Feature::api("hello")])));
    }

    #[test]
    fn test_bytes_match_by_prefix() {
        let tree = LogicTree::leaf(Node::Feature(Feature::bytes(vec![0x4d, 0x5a])));
        assert!(tree.evaluate(&feature_set(&[Feature::bytes(vec![0x4d, 0x5a, 0x90])])));
        assert!(!tree.evaluate(&feature_set(&[Feature::bytes(vec![0x4d])])));
    }

    #[test]
    fn test_replace_child_and_subtree() {
        let mut builder = TreeBuilder::new();
        let mov = builder.add(Node::Feature(Feature::mnemonic("mov")));
        let subscope = builder.add(Node::Subscope {
            scope: Scope::BasicBlock,
            child: mov,
        });
        let root = builder.add(Node::And(vec![subscope]));
        let mut tree = builder.build(root);
        assert!(tree.contains_subscope());

        let extracted = tree.subtree(mov);
        assert_eq!(extracted, LogicTree::leaf(Node::Feature(Feature::mnemonic("mov"))));

        let reference = tree.add_node(Node::Feature(Feature::matched_rule("child")));
        assert!(tree.replace_child(root, subscope, reference));
        assert!(!tree.replace_child(root, subscope, reference));
        assert!(!tree.contains_subscope());
        assert_eq!(tree.features(), vec![&Feature::matched_rule("child")]);
    }

    #[test]
    fn test_structural_equality_ignores_layout() {
        let first = and_of(vec![Feature::api("a"), Feature::api("b")]);

        let mut builder = TreeBuilder::new();
        builder.add(Node::Feature(Feature::api("unused")));
        let a = builder.add(Node::Feature(Feature::api("a")));
        let b = builder.add(Node::Feature(Feature::api("b")));
        let root = builder.add(Node::And(vec![a, b]));
        let second = builder.build(root);

        assert_eq!(first, second);
        assert_ne!(first, and_of(vec![Feature::api("b"), Feature::api("a")]));
    }

    #[test]
    fn test_wrap_root_in_and() {
        let mut tree = LogicTree::leaf(Node::Feature(Feature::api("a")));
        tree.wrap_root_in_and();
        assert!(matches!(tree.root_node(), Node::And(children) if children.len() == 1));
    }

    #[test]
    fn test_display_renders_tree() {
        let tree = and_of(vec![Feature::api("a")]);
        assert_eq!(tree.to_string(), "and:\n  api(a)\n");
    }
}
