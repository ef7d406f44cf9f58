//! Integration tests for configuration parsing
//!
//! This module contains integration tests that verify:
//! - Config loading from fixture files
//! - Defaults for omitted sections
//! - Rejection of invalid syntax, empty paths, and bad globs

use capa_rules::config::{ColorOption, Config, OutputFormat};
use capa_rules::error::ConfigError;
use std::path::{Path, PathBuf};

// Helper to get fixture path
fn fixture_path(filename: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("config")
        .join(filename)
}

#[test]
fn test_config_load_valid_minimal() {
    let config = Config::load(fixture_path("valid_minimal.toml")).unwrap();

    assert_eq!(config.rules.paths, vec![PathBuf::from("rules")]);
    assert!(config.rules.exclude.is_empty());
    assert_eq!(config.rules.tag, None);
    assert_eq!(config.output.format, OutputFormat::Human);
    assert_eq!(config.output.color, ColorOption::Auto);
}

#[test]
fn test_config_load_valid_full() {
    let config = Config::load(fixture_path("valid_full.toml")).unwrap();

    assert_eq!(config.rules.paths, vec![Path::new("tests/fixtures/rules")]);
    assert_eq!(config.rules.exclude.len(), 1);
    assert_eq!(config.rules.exclude[0].as_str(), "**/nursery/**");
    assert_eq!(config.rules.tag.as_deref(), Some("anti-analysis"));
    assert_eq!(config.output.format, OutputFormat::Jsonl);
    assert_eq!(config.output.color, ColorOption::Never);
}

#[test]
fn test_config_invalid_syntax() {
    let result = Config::load(fixture_path("invalid_syntax.toml"));
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_config_invalid_glob() {
    match Config::load(fixture_path("invalid_glob.toml")) {
        Err(ConfigError::Validation(message)) => assert!(message.contains("[unclosed")),
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn test_config_empty_paths() {
    let result = Config::load(fixture_path("empty_paths.toml"));
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_config_missing_file() {
    let result = Config::load(fixture_path("does_not_exist.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = Config::load(fixture_path("valid_full.toml")).unwrap();
    let text = config.to_toml_string().unwrap();
    assert_eq!(Config::parse(&text).unwrap(), config);
}
