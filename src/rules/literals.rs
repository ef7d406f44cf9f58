#![forbid(unsafe_code)]

//! Small grammars for the literal forms rule documents embed in strings
//!
//! - integers: decimal, or hexadecimal with a `0x` prefix
//! - ranges: `(min,max)` with either side optional
//! - symbols: `0x4550 = IMAGE_DOS_SIGNATURE`, `4D 5A = dos header`
//! - regexes: `/pattern/` or `/pattern/i`

use crate::engine::RegexPattern;
use crate::error::RuleError;
use crate::features::{FeatureKind, MAX_BYTES_FEATURE_SIZE};
use regex::RegexBuilder;

/// Literal half of a `<literal> = <symbol>` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolLiteral {
    Int(i64),
    Bytes(Vec<u8>),
}

/// Parse a decimal or `0x`-prefixed hexadecimal integer
///
/// Hexadecimal literals denote 64-bit patterns, so `0xFFFFFFFFFFFFFFFF`
/// is `-1`.
pub fn parse_int(s: &str) -> Result<i64, RuleError> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).map(|v| v as i64).ok(),
        None => s.parse::<i64>().ok(),
    };
    parsed.ok_or_else(|| RuleError::invalid(format!("unexpected integer: \"{s}\"")))
}

/// Parse `(min,max)` into inclusive bounds; an empty side is unbounded
pub fn parse_range(s: &str) -> Result<(Option<u64>, Option<u64>), RuleError> {
    // braces would be read as a mapping, hence parentheses
    let inner = s
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| RuleError::invalid(format!("invalid range: {s}")))?;

    let (min, max) = inner.split_once(',').unwrap_or((inner, ""));
    let min = parse_bound(min, "min")?;
    let max = parse_bound(max, "max")?;

    if let (Some(min), Some(max)) = (min, max)
        && max < min
    {
        return Err(RuleError::invalid("range max less than min"));
    }

    Ok((min, max))
}

fn parse_bound(s: &str, which: &str) -> Result<Option<u64>, RuleError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    let value = parse_int(s)?;
    u64::try_from(value)
        .map(Some)
        .map_err(|_| RuleError::invalid(format!("range {which} less than zero")))
}

/// Split `<literal> = <symbol>` and parse the literal according to `kind`
///
/// `bytes` literals are hex with whitespace ignored; `number` and `offset`
/// literals are integers.
pub fn parse_symbol(s: &str, kind: FeatureKind) -> Result<(SymbolLiteral, Option<String>), RuleError> {
    let (value, symbol) = match s.split_once('=') {
        Some((value, symbol)) => {
            let symbol = symbol.trim();
            if symbol.is_empty() {
                return Err(RuleError::invalid(format!(
                    "unexpected value: \"{s}\", symbol name cannot be empty"
                )));
            }
            (value.trim(), Some(symbol.to_string()))
        }
        None => (s.trim(), None),
    };

    let literal = match kind {
        FeatureKind::Bytes => SymbolLiteral::Bytes(parse_bytes(value)?),
        _ => SymbolLiteral::Int(parse_int(value).map_err(|_| {
            RuleError::invalid(format!(
                "unexpected value: \"{value}\", must begin with numerical value"
            ))
        })?),
    };

    Ok((literal, symbol))
}

/// Decode a hex byte literal such as `4D 5A 90 00`
pub fn parse_bytes(s: &str) -> Result<Vec<u8>, RuleError> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&compact).map_err(|_| {
        RuleError::invalid(format!(
            "unexpected bytes value: \"{s}\", must be a valid hex sequence"
        ))
    })?;

    if bytes.len() > MAX_BYTES_FEATURE_SIZE {
        return Err(RuleError::invalid(format!(
            "unexpected bytes value: byte sequences must be no larger than {MAX_BYTES_FEATURE_SIZE} bytes"
        )));
    }

    Ok(bytes)
}

/// Whether a `string` value is written as a regex literal
pub fn is_regex_literal(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('/') && (s.ends_with('/') || s.ends_with("/i"))
}

/// Compile a `/pattern/` or `/pattern/i` literal
pub fn parse_regex(literal: &str) -> Result<RegexPattern, RuleError> {
    if !is_regex_literal(literal) {
        return Err(RuleError::invalid(format!(
            "invalid regular expression literal: {literal}"
        )));
    }

    let (pattern, case_insensitive) = match literal.strip_suffix("/i") {
        Some(rest) if !rest.is_empty() => (&rest[1..], true),
        _ => (&literal[1..literal.len() - 1], false),
    };

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|_| {
            let shown = literal.strip_suffix('i').unwrap_or(literal);
            RuleError::invalid(format!(
                "invalid regular expression: {shown} it should use the Rust regex crate syntax, \
                 verify the pattern's dialect"
            ))
        })?;

    Ok(RegexPattern::new(literal, regex))
}
