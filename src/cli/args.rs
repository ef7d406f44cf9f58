//! CLI argument parsing using clap

use crate::config;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for listing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON Lines format (one JSON object per line)
    Jsonl,
}

impl From<OutputFormat> for config::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => config::OutputFormat::Human,
            OutputFormat::Jsonl => config::OutputFormat::Jsonl,
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Automatically detect if terminal supports color
    Auto,
    /// Always use color
    Always,
    /// Never use color
    Never,
}

impl From<ColorChoice> for config::ColorOption {
    fn from(choice: ColorChoice) -> Self {
        match choice {
            ColorChoice::Auto => config::ColorOption::Auto,
            ColorChoice::Always => config::ColorOption::Always,
            ColorChoice::Never => config::ColorOption::Never,
        }
    }
}

/// capa-rules CLI main entry point
#[derive(Parser, Debug)]
#[command(name = "capa-rules")]
#[command(about = "Compile, validate, and format capability rules")]
#[command(version)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./capa-rules.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output coloring (overrides the configuration file)
    #[arg(long, global = true)]
    pub color: Option<ColorChoice>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available capa-rules subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and assemble rules, reporting per-scope counts
    Check {
        /// Rule files or directories (defaults to the configured paths)
        paths: Vec<PathBuf>,

        /// Only keep rules whose metadata mentions this tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// List each scope's rules in evaluation order
    List {
        /// Rule files or directories (defaults to the configured paths)
        paths: Vec<PathBuf>,

        /// Only keep rules whose metadata mentions this tag
        #[arg(long)]
        tag: Option<String>,

        /// Output format (overrides the configuration file)
        #[arg(short, long)]
        format: Option<OutputFormat>,
    },

    /// Rewrite rule files in canonical form
    Format {
        /// Rule files to format
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Report files that are not canonical instead of printing them
        #[arg(long, conflicts_with = "in_place")]
        check: bool,

        /// Overwrite files with their canonical form
        #[arg(long)]
        in_place: bool,
    },

    /// Write a default capa-rules.toml
    Init {
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
}
