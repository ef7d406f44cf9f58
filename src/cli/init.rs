//! Initialize a capa-rules project
//!
//! Creates the configuration file and the default rules directory.

use crate::config::DEFAULT_CONFIG_FILE;
use std::fs;
use std::path::Path;

/// Default content for capa-rules.toml
const DEFAULT_CONFIG_TOML: &str = r#"[rules]
# Rule files or directories holding .yml/.yaml rules
paths = ["rules"]

# Paths to leave out of discovery
# exclude = ["**/nursery/**"]

# Only keep rules whose metadata mentions this tag
# tag = "anti-analysis"

[output]
format = "human"
color = "auto"
"#;

/// Default rules directory
const DEFAULT_RULES_DIR: &str = "rules";

/// Error type for init command
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Path error
    #[error("Path error: {0}")]
    Path(String),
}

/// Result of init command
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InitResult {
    /// Files that were created
    pub created: Vec<String>,
    /// Files that were skipped (already existed)
    pub skipped: Vec<String>,
    /// Files that were overwritten
    pub overwritten: Vec<String>,
}

/// Run the init command in the current directory
pub fn run_init(force: bool) -> Result<InitResult, InitError> {
    run_init_in(Path::new("."), force)
}

/// Run the init command in `root`
///
/// Creates:
/// - capa-rules.toml (main configuration)
/// - rules/ (directory for rule files)
///
/// # Arguments
/// * `force` - If true, overwrite existing files. If false, skip existing files.
pub fn run_init_in(root: &Path, force: bool) -> Result<InitResult, InitError> {
    let mut result = InitResult::default();

    handle_file(
        root,
        DEFAULT_CONFIG_FILE,
        DEFAULT_CONFIG_TOML,
        force,
        &mut result,
    )?;
    create_directory(root, DEFAULT_RULES_DIR, &mut result)?;

    Ok(result)
}

/// Handle creation of a single file
fn handle_file(
    root: &Path,
    name: &str,
    content: &str,
    force: bool,
    result: &mut InitResult,
) -> Result<(), InitError> {
    let path = root.join(name);

    if path.exists() {
        if force {
            fs::write(&path, content)?;
            result.overwritten.push(name.to_string());
        } else {
            result.skipped.push(name.to_string());
        }
    } else {
        fs::write(&path, content)?;
        result.created.push(name.to_string());
    }

    Ok(())
}

/// Create a directory if it doesn't exist
fn create_directory(root: &Path, name: &str, result: &mut InitResult) -> Result<(), InitError> {
    let dir_path = root.join(name);

    if dir_path.exists() {
        if dir_path.is_dir() {
            Ok(())
        } else {
            Err(InitError::Path(format!(
                "Path '{}' exists but is not a directory",
                dir_path.display()
            )))
        }
    } else {
        fs::create_dir_all(&dir_path)?;
        result.created.push(format!("{name}/"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::parse(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_init_creates_files() {
        let dir = TempDir::new().unwrap();
        let result = run_init_in(dir.path(), false).unwrap();

        assert_eq!(result.created, vec![DEFAULT_CONFIG_FILE, "rules/"]);
        assert!(result.skipped.is_empty());
        assert!(dir.path().join(DEFAULT_CONFIG_FILE).is_file());
        assert!(dir.path().join("rules").is_dir());
    }

    #[test]
    fn test_init_skips_existing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "# mine\n").unwrap();

        let result = run_init_in(dir.path(), false).unwrap();
        assert_eq!(result.skipped, vec![DEFAULT_CONFIG_FILE]);
        assert_eq!(
            fs::read_to_string(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap(),
            "# mine\n"
        );
    }

    #[test]
    fn test_init_force_overwrites() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "# mine\n").unwrap();

        let result = run_init_in(dir.path(), true).unwrap();
        assert_eq!(result.overwritten, vec![DEFAULT_CONFIG_FILE]);
        assert_eq!(
            fs::read_to_string(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap(),
            DEFAULT_CONFIG_TOML
        );
    }

    #[test]
    fn test_init_rules_path_is_a_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("rules"), "").unwrap();
        assert!(matches!(
            run_init_in(dir.path(), false),
            Err(InitError::Path(_))
        ));
    }
}
