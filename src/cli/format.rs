//! Format command implementation
//!
//! Rewrites rule files in canonical form. Each file is compiled first, so
//! only valid rules are ever rewritten.

use crate::cli::common::{EXIT_FAILURE, EXIT_SUCCESS, report_error};
use crate::error::{CapaRulesError, RuleError};
use crate::rules::Rule;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// What to do with the canonical text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    /// Print to stdout
    Print,
    /// Report files that differ
    Check,
    /// Overwrite files that differ
    InPlace,
}

/// Run the format command
///
/// # Returns
///
/// Exit code:
/// - 0: Success
/// - 1: `--check` found files that are not canonical
/// - 2: Error (I/O error)
/// - 3: A file is not a valid rule
pub fn run_format(files: &[PathBuf], mode: FormatMode) -> i32 {
    match run_format_inner(files, mode) {
        Ok(0) => EXIT_SUCCESS,
        Ok(_) => EXIT_FAILURE,
        Err(e) => report_error(&e),
    }
}

/// Returns the number of files that were not canonical
fn run_format_inner(files: &[PathBuf], mode: FormatMode) -> Result<usize, CapaRulesError> {
    let mut unformatted = 0;

    for path in files {
        let (original, canonical) = canonical_text(path)?;

        match mode {
            FormatMode::Print => print!("{canonical}"),
            FormatMode::Check => {
                if original != canonical {
                    eprintln!("{} is not canonically formatted", path.display());
                    unformatted += 1;
                }
            }
            FormatMode::InPlace => {
                if original != canonical {
                    fs::write(path, &canonical)?;
                    info!(path = %path.display(), "reformatted rule");
                }
            }
        }
    }

    Ok(unformatted)
}

/// The file's current text and its canonical form, newline-terminated
pub fn canonical_text(path: &Path) -> Result<(String, String), RuleError> {
    let original = fs::read_to_string(path).map_err(|source| RuleError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rule = Rule::from_yaml(&original).map_err(|e| e.with_path(path))?;
    let mut canonical = rule.to_yaml().map_err(|e| e.with_path(path))?;
    canonical.push('\n');
    Ok((original, canonical))
}
