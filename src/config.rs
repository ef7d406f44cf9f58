//! Configuration file parsing and validation

pub mod settings;

pub use settings::{
    ColorOption, Config, DEFAULT_CONFIG_FILE, OutputConfig, OutputFormat, RulesConfig,
};
