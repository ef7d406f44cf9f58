#![forbid(unsafe_code)]

//! Rule file discovery and loading
//!
//! Rule directories are walked with the `ignore` crate, so hidden entries and
//! gitignored paths are skipped. Only `.yml` and `.yaml` files are rules.
//! Files are compiled in parallel; the first failure aborts the batch.

use crate::error::RuleError;
use crate::rules::Rule;
use crate::types::GlobPattern;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RULE_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Whether `path` names a rule document
pub fn is_rule_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| RULE_EXTENSIONS.contains(&ext))
}

/// Compile exclude patterns into a single matcher
pub fn build_globset(patterns: &[GlobPattern]) -> Result<GlobSet, RuleError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern.as_str()).map_err(|source| RuleError::InvalidGlob {
            pattern: pattern.as_str().to_string(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| RuleError::InvalidGlob {
        pattern: "<globset>".to_string(),
        source,
    })
}

/// Collect rule files under `paths`
///
/// Files given directly are taken as-is. Directories are searched
/// recursively. Paths matching an `exclude` pattern are dropped. The result
/// is sorted and free of duplicates.
///
/// # Errors
///
/// - `RuleError::Read` if a path does not exist
/// - `RuleError::Walk` if a directory cannot be traversed
/// - `RuleError::InvalidGlob` for malformed exclude patterns
pub fn get_rule_paths(paths: &[PathBuf], exclude: &[GlobPattern]) -> Result<Vec<PathBuf>, RuleError> {
    let exclude_set = build_globset(exclude)?;
    let mut found = Vec::new();

    for root in paths {
        if root.is_file() {
            found.push(root.clone());
            continue;
        }
        if !root.is_dir() {
            return Err(RuleError::Read {
                path: root.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
            });
        }

        for entry in WalkBuilder::new(root).hidden(true).build() {
            let entry = entry?;
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            if exclude_set.is_match(path) {
                debug!(path = %path.display(), "excluded rule path");
                continue;
            }
            if !is_rule_file(path) {
                if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
                    warn!(path = %path.display(), "skipping non-.yml file");
                }
                continue;
            }

            found.push(path.to_path_buf());
        }
    }

    found.sort();
    found.dedup();
    debug!(count = found.len(), "discovered rule files");
    Ok(found)
}

/// Discover and compile every rule under `paths`
///
/// Rules are returned in path order.
pub fn get_rules(paths: &[PathBuf], exclude: &[GlobPattern]) -> Result<Vec<Rule>, RuleError> {
    let rule_paths = get_rule_paths(paths, exclude)?;
    load_rule_files(&rule_paths)
}

/// Compile the given rule files in parallel
pub fn load_rule_files(paths: &[PathBuf]) -> Result<Vec<Rule>, RuleError> {
    paths
        .par_iter()
        .map(|path| Rule::from_yaml_file(path))
        .collect()
}
