//! Logic evaluation engine
//!
//! Arena logic trees, their evaluation against observed features, and the
//! dependency ordering rules are evaluated in.

pub mod matcher;
pub mod ordering;
pub mod statement;

pub use matcher::{MatchResults, match_rules};
pub use ordering::topologically_order_rules;
pub use statement::{FeatureSet, LogicTree, Node, NodeId, RegexPattern, TreeBuilder};
