#![forbid(unsafe_code)]

//! Feature model
//!
//! A feature is an atomic observation about a binary: an API call, a
//! constant, a string, a byte sequence, a structural characteristic, and so
//! on. Rules are trees over these features; extractors produce them.

pub mod vocabulary;

pub use vocabulary::{ensure_feature_valid_for_scope, is_feature_valid};

use crate::error::RuleError;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Largest byte sequence a `bytes` feature may describe
pub const MAX_BYTES_FEATURE_SIZE: usize = 0x100;

/// The closed set of feature kinds a rule may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureKind {
    Api,
    String,
    Bytes,
    Number,
    Offset,
    Mnemonic,
    BasicBlocks,
    Characteristic,
    Export,
    Import,
    Section,
    MatchedRule,
}

impl FeatureKind {
    /// Resolve a statement key to a feature kind
    ///
    /// Characteristics embed their name in the key, e.g. `characteristic(nzxor)`;
    /// the name is returned alongside the kind.
    pub fn from_key(key: &str) -> Result<(FeatureKind, Option<&str>), RuleError> {
        if let Some(name) = key
            .strip_prefix("characteristic(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return Ok((FeatureKind::Characteristic, Some(name)));
        }

        let kind = match key {
            "api" => FeatureKind::Api,
            "string" => FeatureKind::String,
            "bytes" => FeatureKind::Bytes,
            "number" => FeatureKind::Number,
            "offset" => FeatureKind::Offset,
            "mnemonic" => FeatureKind::Mnemonic,
            "basic blocks" => FeatureKind::BasicBlocks,
            "export" => FeatureKind::Export,
            "import" => FeatureKind::Import,
            "section" => FeatureKind::Section,
            "match" => FeatureKind::MatchedRule,
            _ => return Err(RuleError::invalid(format!("unexpected statement: {key}"))),
        };
        Ok((kind, None))
    }

    /// Returns the key used for this kind in rule documents
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Api => "api",
            FeatureKind::String => "string",
            FeatureKind::Bytes => "bytes",
            FeatureKind::Number => "number",
            FeatureKind::Offset => "offset",
            FeatureKind::Mnemonic => "mnemonic",
            FeatureKind::BasicBlocks => "basic blocks",
            FeatureKind::Characteristic => "characteristic",
            FeatureKind::Export => "export",
            FeatureKind::Import => "import",
            FeatureKind::Section => "section",
            FeatureKind::MatchedRule => "match",
        }
    }

    /// Whether values of this kind use the `<literal> = <symbol>` grammar
    pub fn takes_symbol(&self) -> bool {
        matches!(
            self,
            FeatureKind::Number | FeatureKind::Offset | FeatureKind::Bytes
        )
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identifying value of a feature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureValue {
    Api(String),
    String(String),
    Bytes(Vec<u8>),
    Number(i64),
    Offset(i64),
    Mnemonic(String),
    BasicBlock,
    Characteristic { name: String, value: bool },
    Export(String),
    Import(String),
    Section(String),
    MatchedRule(String),
}

impl FeatureValue {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureValue::Api(_) => FeatureKind::Api,
            FeatureValue::String(_) => FeatureKind::String,
            FeatureValue::Bytes(_) => FeatureKind::Bytes,
            FeatureValue::Number(_) => FeatureKind::Number,
            FeatureValue::Offset(_) => FeatureKind::Offset,
            FeatureValue::Mnemonic(_) => FeatureKind::Mnemonic,
            FeatureValue::BasicBlock => FeatureKind::BasicBlocks,
            FeatureValue::Characteristic { .. } => FeatureKind::Characteristic,
            FeatureValue::Export(_) => FeatureKind::Export,
            FeatureValue::Import(_) => FeatureKind::Import,
            FeatureValue::Section(_) => FeatureKind::Section,
            FeatureValue::MatchedRule(_) => FeatureKind::MatchedRule,
        }
    }
}

/// A feature plus an optional human-readable symbol
///
/// The symbol (e.g. `IMAGE_DOS_SIGNATURE` for `0x4550`) is documentation
/// only: two features are equal when their values are equal.
#[derive(Debug, Clone)]
pub struct Feature {
    value: FeatureValue,
    symbol: Option<String>,
}

impl Feature {
    pub fn new(value: FeatureValue) -> Self {
        Self {
            value,
            symbol: None,
        }
    }

    pub fn with_symbol(value: FeatureValue, symbol: Option<String>) -> Self {
        Self { value, symbol }
    }

    pub fn api(name: impl Into<String>) -> Self {
        Self::new(FeatureValue::Api(name.into()))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(FeatureValue::String(value.into()))
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::new(FeatureValue::Bytes(value.into()))
    }

    pub fn number(value: i64) -> Self {
        Self::new(FeatureValue::Number(value))
    }

    pub fn offset(value: i64) -> Self {
        Self::new(FeatureValue::Offset(value))
    }

    pub fn mnemonic(value: impl Into<String>) -> Self {
        Self::new(FeatureValue::Mnemonic(value.into()))
    }

    pub fn basic_block() -> Self {
        Self::new(FeatureValue::BasicBlock)
    }

    /// A characteristic that is present
    pub fn characteristic(name: impl Into<String>) -> Self {
        Self::new(FeatureValue::Characteristic {
            name: name.into(),
            value: true,
        })
    }

    pub fn export(name: impl Into<String>) -> Self {
        Self::new(FeatureValue::Export(name.into()))
    }

    pub fn import(name: impl Into<String>) -> Self {
        Self::new(FeatureValue::Import(name.into()))
    }

    pub fn section(name: impl Into<String>) -> Self {
        Self::new(FeatureValue::Section(name.into()))
    }

    pub fn matched_rule(name: impl Into<String>) -> Self {
        Self::new(FeatureValue::MatchedRule(name.into()))
    }

    pub fn value(&self) -> &FeatureValue {
        &self.value
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn kind(&self) -> FeatureKind {
        self.value.kind()
    }

    /// Name of the referenced rule, if this is a `match` feature
    pub fn matched_rule_name(&self) -> Option<&str> {
        match &self.value {
            FeatureValue::MatchedRule(name) => Some(name),
            _ => None,
        }
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Feature {}

impl Hash for Feature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

fn write_int(f: &mut fmt::Formatter<'_>, value: i64) -> fmt::Result {
    if value < 0 {
        write!(f, "-0x{:X}", value.unsigned_abs())
    } else {
        write!(f, "0x{value:X}")
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match &self.value {
            FeatureValue::Api(s)
            | FeatureValue::String(s)
            | FeatureValue::Mnemonic(s)
            | FeatureValue::Export(s)
            | FeatureValue::Import(s)
            | FeatureValue::Section(s)
            | FeatureValue::MatchedRule(s) => write!(f, "{kind}({s})")?,
            FeatureValue::Number(v) | FeatureValue::Offset(v) => {
                write!(f, "{kind}(")?;
                write_int(f, *v)?;
                f.write_str(")")?;
            }
            FeatureValue::Bytes(bytes) => {
                let rendered: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
                write!(f, "bytes({})", rendered.join(" "))?;
            }
            FeatureValue::BasicBlock => f.write_str("basic block")?,
            FeatureValue::Characteristic { name, value } => {
                write!(f, "characteristic({name})")?;
                if !value {
                    f.write_str(" = false")?;
                }
            }
        }

        if let Some(symbol) = &self.symbol {
            write!(f, " = {symbol}")?;
        }
        Ok(())
    }
}
