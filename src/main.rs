//! capa-rules CLI entry point

use capa_rules::cli::common::EXIT_ERROR;
use capa_rules::cli::format::FormatMode;
use capa_rules::cli::{Cli, Command, GlobalOptions};
use clap::Parser;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise -v turns on debug output for this crate
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("capa_rules=debug")
    } else {
        EnvFilter::new("capa_rules=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    debug!("Logging initialized (verbose={})", cli.verbose);

    let options = GlobalOptions {
        config: cli.config,
        color: cli.color.map(Into::into),
    };

    let exit_code = match cli.command {
        Command::Init { force } => match capa_rules::cli::init::run_init(force) {
            Ok(result) => {
                for created in &result.created {
                    println!("Created {created}");
                }
                for overwritten in &result.overwritten {
                    println!("Overwrote {overwritten}");
                }
                for skipped in &result.skipped {
                    println!("Skipped {skipped} (already exists, use --force to overwrite)");
                }
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                EXIT_ERROR
            }
        },
        Command::Check { paths, tag } => {
            capa_rules::cli::check::run_check(&options, &paths, tag.as_deref())
        }
        Command::List { paths, tag, format } => capa_rules::cli::list::run_list(
            &options,
            &paths,
            tag.as_deref(),
            format.map(Into::into),
        ),
        Command::Format {
            files,
            check,
            in_place,
        } => {
            let mode = if check {
                FormatMode::Check
            } else if in_place {
                FormatMode::InPlace
            } else {
                FormatMode::Print
            };
            capa_rules::cli::format::run_format(&files, mode)
        }
    };

    process::exit(exit_code);
}
