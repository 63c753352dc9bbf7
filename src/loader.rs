//! Config and script discovery.

use crate::config::SuiteConfig;
use crate::error::LoadError;
use std::path::{Path, PathBuf};

/// Config file names looked up in the starting directory, in order.
pub const SUITE_CONFIG_FILENAMES: [&str; 3] =
    ["sessiontest.yaml", "sessiontest.yml", "sessiontest.toml"];

/// Extension of test scripts found when a directory is given.
pub const SCRIPT_EXTENSION: &str = "in";

/// Load a suite config from an explicit path.
pub fn load_config(path: &Path) -> Result<SuiteConfig, LoadError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match ext {
        "yaml" | "yml" => Ok(serde_yaml::from_str(&contents)?),
        "toml" => Ok(toml::from_str(&contents)?),
        other => Err(LoadError::UnsupportedFormat(other.to_string())),
    }
}

/// Load the suite config from `dir`, if one is present.
pub fn load_suite_config(dir: &Path) -> Result<Option<SuiteConfig>, LoadError> {
    for name in SUITE_CONFIG_FILENAMES {
        let path = dir.join(name);
        if path.is_file() {
            tracing::debug!(config = %path.display(), "loading suite config");
            return load_config(&path).map(Some);
        }
    }
    Ok(None)
}

/// Expand the given paths into script files.
///
/// Files are taken as given, in order. Directories are searched recursively
/// for `*.in` files, which are added in sorted order.
pub fn find_scripts(paths: &[PathBuf]) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut scripts = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            collect_scripts_recursive(path, &mut found)?;
            found.sort();
            scripts.extend(found);
        } else {
            scripts.push(path.clone());
        }
    }
    Ok(scripts)
}

fn collect_scripts_recursive(dir: &Path, scripts: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_scripts_recursive(&path, scripts)?;
        } else if path.extension().is_some_and(|e| e == SCRIPT_EXTENSION) {
            scripts.push(path);
        }
    }
    Ok(())
}
