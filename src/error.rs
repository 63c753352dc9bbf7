//! Error types.
//!
//! A script ends in at most one of these. `ScriptError` means the script or
//! its environment is broken; `Failure` means the subject misbehaved.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for interpreter operations.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Authoring and environment errors. These make a script "faulty".
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("could not read script: {0}")]
    Read(#[source] io::Error),

    #[error("bad test line: {0}")]
    Malformed(usize),

    #[error("bad time: {0}")]
    BadTimeout(String),

    #[error("unterminated command: {0}")]
    Unterminated(String),

    #[error("undefined substitution: ${{{0}}}")]
    UndefinedVariable(String),

    #[error("nonexistent group: {{{0}}}")]
    MissingGroup(String),

    #[error("file {src} could not be copied to {dest}")]
    Copy {
        src: String,
        dest: String,
        #[source]
        source: io::Error,
    },

    #[error("reference file {0} not found")]
    MissingReference(String),

    #[error("could not create temp directory for {0}")]
    WorkDir(String),

    #[error("could not start subject: {0}")]
    Spawn(#[source] io::Error),

    #[error("lost track of subject: {0}")]
    Wait(#[source] io::Error),
}

/// Subject-behaviour failures. These make a script "fail".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    #[error("subject exited with code {0}")]
    ExitCode(i32),

    #[error("subject terminated by signal {0}")]
    Signal(i32),

    #[error("timeout")]
    Timeout,

    #[error("incorrect output")]
    IncorrectOutput { detail: String },

    #[error("file {0} has incorrect content")]
    FileContent(String),

    #[error("file {0} present")]
    FilePresent(String),

    #[error("file or directory {0} not present")]
    FileMissing(String),
}

/// Error loading a suite configuration file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported file format: {0} (expected .yaml, .yml, or .toml)")]
    UnsupportedFormat(String),
}
