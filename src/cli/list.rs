//! List command implementation
//!
//! This module implements the `capa-rules list` command, which prints every
//! scope's rules in the order they would be evaluated, with their `lib`
//! flag, parent rule, and direct dependencies.

use crate::cli::common::{EXIT_SUCCESS, GlobalOptions, load_config, load_ruleset, report_error};
use crate::config::OutputFormat;
use crate::error::CapaRulesError;
use crate::output::{HumanFormatter, JsonlFormatter, RuleListing, stdout_stream};
use std::path::PathBuf;

/// Run the list command
///
/// `format` overrides the configured output format.
///
/// # Returns
///
/// Exit code:
/// - 0: Success
/// - 2: Error (configuration/I/O error)
/// - 3: Invalid rule or rule set
pub fn run_list(
    options: &GlobalOptions,
    paths: &[PathBuf],
    tag: Option<&str>,
    format: Option<OutputFormat>,
) -> i32 {
    match run_list_inner(options, paths, tag, format) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => report_error(&e),
    }
}

fn run_list_inner(
    options: &GlobalOptions,
    paths: &[PathBuf],
    tag: Option<&str>,
    format: Option<OutputFormat>,
) -> Result<(), CapaRulesError> {
    let config = load_config(options.config.as_deref())?;
    let ruleset = load_ruleset(&config, paths, tag)?;
    let listings = RuleListing::from_ruleset(&ruleset);

    match format.unwrap_or(config.output.format) {
        OutputFormat::Human => {
            let mut stdout = stdout_stream(options.color(&config));
            HumanFormatter::new().write_listings(&mut stdout, &listings)?;
        }
        OutputFormat::Jsonl => print!("{}", JsonlFormatter::new().format_listings(&listings)),
    }

    Ok(())
}
