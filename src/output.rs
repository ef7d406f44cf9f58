//! Output formatters (human and JSONL)

pub mod listing;

pub use listing::{HumanFormatter, JsonlFormatter, RuleListing, RuleSetSummary};

use crate::config::ColorOption;
use std::io::IsTerminal;
use termcolor::{ColorChoice, StandardStream};

impl ColorOption {
    /// Resolve to a termcolor choice for stdout
    ///
    /// `auto` only colors when stdout is a terminal.
    pub fn color_choice(self) -> ColorChoice {
        match self {
            ColorOption::Always => ColorChoice::Always,
            ColorOption::Never => ColorChoice::Never,
            ColorOption::Auto if std::io::stdout().is_terminal() => ColorChoice::Auto,
            ColorOption::Auto => ColorChoice::Never,
        }
    }
}

/// Stdout stream honoring the color setting
pub fn stdout_stream(color: ColorOption) -> StandardStream {
    StandardStream::stdout(color.color_choice())
}
