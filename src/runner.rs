//! Script execution engine.
//!
//! Runs each script in its own scratch directory and reduces it to a single
//! verdict.

use crate::compare::{Comparison, compare_output};
use crate::error::{Failure, Result, ScriptError};
use crate::process::{RunOutcome, Subject};
use crate::script::{Instruction, ScriptReader};
use crate::vars::Variables;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Default timeout per subject invocation in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;

/// How many suffixed names are tried when creating a scratch directory.
pub const MAX_WORKDIR_ATTEMPTS: usize = 100;

/// Settings shared by every script of a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub subject: Subject,
    /// Directory that `+` and `=` reference names are resolved against.
    pub reference_dir: PathBuf,
    /// Directory in which scratch directories are created.
    pub work_root: PathBuf,
    /// Initial timeout; `T` overrides it for the rest of a script.
    pub timeout: Duration,
    /// Keep scratch directories after the script finishes.
    pub keep: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            subject: Subject::default(),
            reference_dir: PathBuf::from("src"),
            work_root: PathBuf::from("."),
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            keep: false,
        }
    }
}

/// Result of running one script.
#[derive(Debug)]
pub struct ScriptResult {
    pub name: String,
    pub path: PathBuf,
    pub verdict: Verdict,
    pub duration: Duration,
    /// Scratch directory left behind when `keep` is set.
    pub kept_dir: Option<PathBuf>,
}

/// The single outcome of a script.
#[derive(Debug)]
pub enum Verdict {
    Passed,
    /// The subject misbehaved at `line`.
    Failed { line: usize, failure: Failure },
    /// The script or its environment is broken at `line` (0 if unreadable).
    Faulty { line: usize, error: ScriptError },
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            Verdict::Passed => None,
            Verdict::Failed { line, .. } | Verdict::Faulty { line, .. } => Some(*line),
        }
    }
}

/// Run the script at `path`.
pub fn run_script(path: &Path, config: &RunConfig) -> ScriptResult {
    let start = Instant::now();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let (verdict, kept_dir) = match fs::read_to_string(path) {
        Ok(text) => run_text(&name, &text, config),
        Err(e) => (
            Verdict::Faulty {
                line: 0,
                error: ScriptError::Read(e),
            },
            None,
        ),
    };

    ScriptResult {
        name,
        path: path.to_path_buf(),
        verdict,
        duration: start.elapsed(),
        kept_dir,
    }
}

/// Run script `text` in a fresh scratch directory named after `name`.
pub fn run_text(name: &str, text: &str, config: &RunConfig) -> (Verdict, Option<PathBuf>) {
    let scratch = match ScratchDir::create(&config.work_root, name, config.keep) {
        Ok(scratch) => scratch,
        Err(error) => return (Verdict::Faulty { line: 0, error }, None),
    };
    tracing::debug!(script = name, dir = %scratch.path().display(), "testing directory");

    let verdict = Session::new(config, scratch.path()).execute(text);
    (verdict, scratch.finish())
}

/// Scratch working directory, removed on drop unless kept.
struct ScratchDir {
    dir: tempfile::TempDir,
    keep: bool,
}

impl ScratchDir {
    /// Create `<root>/<stem>_<n>` for the first free `n`.
    fn create(root: &Path, stem: &str, keep: bool) -> Result<Self> {
        for n in 0..MAX_WORKDIR_ATTEMPTS {
            match tempfile::Builder::new()
                .prefix(&format!("{stem}_{n}"))
                .rand_bytes(0)
                .tempdir_in(root)
            {
                Ok(dir) => return Ok(Self { dir, keep }),
                Err(e) => tracing::trace!("{stem}_{n} unavailable: {e}"),
            }
        }
        Err(ScriptError::WorkDir(stem.to_string()))
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Release the directory: kept and returned, or deleted.
    fn finish(self) -> Option<PathBuf> {
        if self.keep {
            let path = self.dir.keep();
            tracing::info!(dir = %path.display(), "keeping test directory");
            Some(path)
        } else {
            let path = self.dir.path().to_path_buf();
            if let Err(e) = self.dir.close() {
                tracing::warn!("failed to remove {}: {e}", path.display());
            }
            None
        }
    }
}

/// Per-script interpreter state.
struct Session<'a> {
    config: &'a RunConfig,
    work: &'a Path,
    timeout: Duration,
    vars: Variables,
}

impl<'a> Session<'a> {
    fn new(config: &'a RunConfig, work: &'a Path) -> Self {
        Self {
            config,
            work,
            timeout: config.timeout,
            vars: Variables::new(),
        }
    }

    /// Dispatch instructions until the script ends or one halts it.
    fn execute(&mut self, text: &str) -> Verdict {
        let mut reader = ScriptReader::new(text);
        loop {
            let vars = &self.vars;
            let instruction = match reader.next_instruction(|line| vars.substitute(line)) {
                Ok(Some(instruction)) => instruction,
                Ok(None) => return Verdict::Passed,
                Err(error) => {
                    return Verdict::Faulty {
                        line: reader.line(),
                        error,
                    };
                }
            };

            let line = reader.line();
            tracing::debug!(line, ?instruction, "dispatch");
            match self.apply(instruction) {
                Ok(None) => {}
                Ok(Some(failure)) => return Verdict::Failed { line, failure },
                Err(error) => return Verdict::Faulty { line, error },
            }
        }
    }

    fn apply(&mut self, instruction: Instruction) -> Result<Option<Failure>> {
        match instruction {
            Instruction::Comment => {}
            Instruction::SetTimeout(secs) => self.timeout = seconds(secs),
            Instruction::CopyFile { dest, src } => self.copy_reference(&dest, &src)?,
            Instruction::DeleteFile(name) => self.delete(&name),
            Instruction::RunAndCheck {
                command,
                expected,
                mode,
            } => {
                let outcome = self.config.subject.run(&command, self.work, self.timeout)?;
                let output = match outcome {
                    RunOutcome::Success(output) => output,
                    RunOutcome::Timeout => return Ok(Some(Failure::Timeout)),
                    RunOutcome::NonZeroExit { code, signal } => {
                        return Ok(Some(match (code, signal) {
                            (None, Some(signal)) => Failure::Signal(signal),
                            (code, _) => Failure::ExitCode(code.unwrap_or(-1)),
                        }));
                    }
                };

                match compare_output(&expected, &output, mode) {
                    Comparison::Matched { captures } => {
                        if let Some(captures) = captures {
                            self.vars.record_captures(captures);
                        }
                    }
                    mismatch => {
                        return Ok(Some(Failure::IncorrectOutput {
                            detail: mismatch.describe(),
                        }));
                    }
                }
            }
            Instruction::CheckFileContent { name, reference } => {
                let expected = read_normalized(&self.config.reference_dir.join(&reference))
                    .ok_or(ScriptError::MissingReference(reference))?;
                if read_normalized(&self.work.join(&name)).as_ref() != Some(&expected) {
                    return Ok(Some(Failure::FileContent(name)));
                }
            }
            Instruction::CheckFileAbsent(name) => {
                if self.work.join(&name).exists() {
                    return Ok(Some(Failure::FilePresent(name)));
                }
            }
            Instruction::CheckFileExists(name) => {
                if !self.work.join(&name).exists() {
                    return Ok(Some(Failure::FileMissing(name)));
                }
            }
            Instruction::DefineVariable { name, value } => self.vars.define(&name, &value)?,
        }
        Ok(None)
    }

    fn copy_reference(&self, dest: &str, src: &str) -> Result<()> {
        self.delete(dest);
        fs::copy(self.config.reference_dir.join(src), self.work.join(dest))
            .map(|_| ())
            .map_err(|source| ScriptError::Copy {
                src: src.to_string(),
                dest: dest.to_string(),
                source,
            })
    }

    fn delete(&self, name: &str) {
        let _ = fs::remove_file(self.work.join(name));
    }
}

/// Convert a validated seconds value, saturating on overflow.
pub fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// File contents with carriage returns removed, or `None` if unreadable.
fn read_normalized(path: &Path) -> Option<Vec<u8>> {
    let mut bytes = fs::read(path).ok()?;
    bytes.retain(|&b| b != b'\r');
    Some(bytes)
}
