//! Check command implementation
//!
//! This module implements the `capa-rules check` command, which:
//! - Loads configuration from capa-rules.toml
//! - Loads and compiles every rule file
//! - Assembles the rule set, running every integrity check
//! - Reports per-scope rule counts (human or JSONL)

use crate::cli::common::{EXIT_SUCCESS, GlobalOptions, load_config, load_ruleset, report_error};
use crate::config::OutputFormat;
use crate::error::CapaRulesError;
use crate::output::{HumanFormatter, JsonlFormatter, RuleSetSummary, stdout_stream};
use std::path::PathBuf;

/// Run the check command
///
/// # Returns
///
/// Exit code:
/// - 0: Success (all rules compiled and the rule set is consistent)
/// - 2: Error (configuration/I/O error)
/// - 3: Invalid rule or rule set
pub fn run_check(options: &GlobalOptions, paths: &[PathBuf], tag: Option<&str>) -> i32 {
    match run_check_inner(options, paths, tag) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => report_error(&e),
    }
}

fn run_check_inner(
    options: &GlobalOptions,
    paths: &[PathBuf],
    tag: Option<&str>,
) -> Result<(), CapaRulesError> {
    let config = load_config(options.config.as_deref())?;
    let ruleset = load_ruleset(&config, paths, tag)?;
    let summary = RuleSetSummary::from_ruleset(&ruleset);

    match config.output.format {
        OutputFormat::Human => {
            let mut stdout = stdout_stream(options.color(&config));
            HumanFormatter::new().write_summary(&mut stdout, &summary)?;
        }
        OutputFormat::Jsonl => print!("{}", JsonlFormatter::new().format_summary(&summary)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::common::EXIT_ERROR;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_check_valid_rules() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a.yml"),
            "rule:\n  meta:\n    name: a\n  features:\n    - api: a\n",
        )
        .unwrap();
        let code = run_check(&GlobalOptions::default(), &[dir.path().to_path_buf()], None);
        assert_eq!(code, EXIT_SUCCESS);
    }

    #[test]
    fn test_check_missing_path() {
        let dir = TempDir::new().unwrap();
        let code = run_check(&GlobalOptions::default(), &[dir.path().join("nope")], None);
        assert_eq!(code, EXIT_ERROR);
    }
}
