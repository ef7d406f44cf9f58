//! Test utilities for capa-rules integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Result type alias for tests
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Extract Ok value or panic with context
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("assertion failed: expected Ok, got Err({:?})", e),
        }
    };
    ($expr:expr, $msg:literal) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Extract Some value or panic with context
#[macro_export]
macro_rules! assert_some {
    ($expr:expr) => {
        match $expr {
            Some(v) => v,
            None => panic!("assertion failed: expected Some, got None"),
        }
    };
    ($expr:expr, $msg:literal) => {
        match $expr {
            Some(v) => v,
            None => panic!("{}: got None", $msg),
        }
    };
}

/// A rule document with the given meta lines and a single top-level statement
///
/// `features` is the statement as it appears under `features:`, indented by
/// two spaces per level starting at column zero.
pub fn rule_yaml(name: &str, extra_meta: &[&str], features: &str) -> String {
    let mut text = format!("rule:\n  meta:\n    name: {name}\n");
    for line in extra_meta {
        text.push_str("    ");
        text.push_str(line);
        text.push('\n');
    }
    text.push_str("  features:\n");
    for line in features.lines() {
        text.push_str("    ");
        text.push_str(line);
        text.push('\n');
    }
    text
}

/// Write `content` to `dir/relative`, creating parent directories
pub fn write_file(dir: &Path, relative: &str, content: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Path to a file under tests/fixtures
pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}
