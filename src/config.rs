//! Suite configuration.
//!
//! An optional `sessiontest.yaml` (or `.yml` / `.toml`) in the directory the
//! harness is started from supplies defaults for every script. Command-line
//! flags take precedence over it.

use crate::process::Subject;
use crate::runner::{DEFAULT_TIMEOUT_SECS, RunConfig, seconds};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Suite-level configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    /// Default timeout in seconds for every subject invocation.
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Invocation prefix placed before each `>` operand, e.g. `java app.Main`.
    #[serde(default)]
    pub subject: Option<String>,

    /// Directory prepended to the subject's `PATH`.
    #[serde(default)]
    pub progdir: Option<PathBuf>,

    /// Directory holding reference files for `+` and `=` (default: `src`).
    #[serde(default)]
    pub reference_dir: Option<PathBuf>,

    /// Directory in which per-script scratch directories are created (default: `.`).
    #[serde(default)]
    pub work_root: Option<PathBuf>,

    /// Keep scratch directories after each script.
    #[serde(default)]
    pub keep: bool,
}

/// Values given on the command line; `None` defers to the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub timeout: Option<f64>,
    pub subject: Option<String>,
    pub progdir: Option<PathBuf>,
    pub reference_dir: Option<PathBuf>,
    pub work_root: Option<PathBuf>,
    pub keep: bool,
}

impl SuiteConfig {
    /// Merge command-line overrides over this file and the built-in defaults.
    pub fn resolve(&self, cli: &Overrides) -> Result<RunConfig, String> {
        let defaults = RunConfig::default();
        let timeout = cli.timeout.or(self.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS);
        if !timeout.is_finite() || timeout < 0.0 {
            return Err(format!("bad timeout: {timeout}"));
        }

        Ok(RunConfig {
            subject: Subject {
                prefix: cli
                    .subject
                    .clone()
                    .or_else(|| self.subject.clone())
                    .unwrap_or_default(),
                progdir: cli.progdir.clone().or_else(|| self.progdir.clone()),
            },
            reference_dir: cli
                .reference_dir
                .clone()
                .or_else(|| self.reference_dir.clone())
                .unwrap_or(defaults.reference_dir),
            work_root: cli
                .work_root
                .clone()
                .or_else(|| self.work_root.clone())
                .unwrap_or(defaults.work_root),
            timeout: seconds(timeout),
            keep: cli.keep || self.keep,
        })
    }
}

/// Generate the JSON Schema for the suite configuration file.
pub fn generate_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(SuiteConfig)
}
