//! Subject process invocation with a wall-clock deadline.

use crate::error::{Result, ScriptError};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// How often the runner polls a running child.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How one subject invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Exit status zero; carries stdout and stderr interleaved.
    Success(String),
    /// Non-zero exit status. `code` is `None` when a signal ended the process.
    NonZeroExit {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// The deadline expired and the process was killed.
    Timeout,
}

/// Builds and runs subject command lines.
#[derive(Debug, Clone, Default)]
pub struct Subject {
    /// Fixed invocation prefix placed before every operand string.
    pub prefix: String,
    /// Directory prepended to the child's `PATH`.
    pub progdir: Option<PathBuf>,
}

impl Subject {
    /// The shell command line for `operands`.
    pub fn command_line(&self, operands: &str) -> String {
        let prefix = self.prefix.trim();
        if prefix.is_empty() {
            operands.trim().to_string()
        } else {
            format!("{prefix} {}", operands.trim())
        }
    }

    /// Run the subject with `operands` inside `dir`, killing it after `timeout`.
    ///
    /// The working directory is handed to the child; the interpreter's own
    /// current directory is never changed.
    pub fn run(&self, operands: &str, dir: &Path, timeout: Duration) -> Result<RunOutcome> {
        let line = self.command_line(operands);
        tracing::debug!(command = %line, dir = %dir.display(), ?timeout, "invoking subject");

        let (mut reader, writer) = os_pipe::pipe().map_err(ScriptError::Spawn)?;
        let writer_err = writer.try_clone().map_err(ScriptError::Spawn)?;

        let mut cmd = shell_command(&line);
        cmd.current_dir(dir)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(writer_err);
        if let Some(progdir) = &self.progdir {
            cmd.env("PATH", prepend_path(progdir));
        }

        let child = cmd.spawn().map_err(ScriptError::Spawn)?;
        // Our copies of the pipe's write end live in `cmd`; close them so the
        // reader sees EOF once the child exits.
        drop(cmd);

        let (tx, output) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });

        wait_with_deadline(child, output, timeout)
    }
}

fn wait_with_deadline(
    mut child: Child,
    output: mpsc::Receiver<Vec<u8>>,
    timeout: Duration,
) -> Result<RunOutcome> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    #[cfg(unix)]
                    let signal = {
                        use std::os::unix::process::ExitStatusExt;
                        status.signal()
                    };
                    #[cfg(not(unix))]
                    let signal = None;

                    return Ok(RunOutcome::NonZeroExit {
                        code: status.code(),
                        signal,
                    });
                }
                // A background child of the subject may still hold the pipe
                // open, so draining it counts against the same deadline.
                let Ok(output) = output.recv_timeout(timeout.saturating_sub(start.elapsed()))
                else {
                    tracing::debug!(?timeout, "subject output still open at deadline");
                    return Ok(RunOutcome::Timeout);
                };
                let text = String::from_utf8_lossy(&output).to_string();
                tracing::debug!(output = %text, "subject finished");
                return Ok(RunOutcome::Success(text));
            }
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::debug!(?timeout, "subject timed out");
                    // The reader thread is left to finish on its own.
                    return Ok(RunOutcome::Timeout);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ScriptError::Wait(e));
            }
        }
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut c = Command::new("sh");
    c.arg("-c").arg(format!("exec {line}"));
    c
}

#[cfg(not(unix))]
fn shell_command(line: &str) -> Command {
    let mut c = Command::new("cmd");
    c.arg("/C").arg(line);
    c
}

fn prepend_path(dir: &Path) -> std::ffi::OsString {
    let existing = std::env::var_os("PATH").unwrap_or_default();
    let paths = std::iter::once(dir.to_path_buf()).chain(std::env::split_paths(&existing));
    std::env::join_paths(paths).unwrap_or(existing)
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    fn subject(prefix: &str) -> Subject {
        Subject {
            prefix: prefix.to_string(),
            progdir: None,
        }
    }

    #[test]
    fn command_line_joins_prefix_and_operands() {
        assert_eq!(
            subject("java app.Main").command_line(" init "),
            "java app.Main init"
        );
        assert_eq!(subject("").command_line("echo hi"), "echo hi");
    }

    #[test]
    fn captures_stdout() {
        let dir = tempdir().unwrap();
        let outcome = subject("echo")
            .run("hello alice", dir.path(), timeout())
            .unwrap();
        assert_eq!(outcome, RunOutcome::Success("hello alice\n".to_string()));
    }

    #[test]
    fn merges_stderr_into_output() {
        let dir = tempdir().unwrap();
        let outcome = Subject::default()
            .run("sh -c 'echo out; echo err >&2'", dir.path(), timeout())
            .unwrap();
        let RunOutcome::Success(text) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert!(text.contains("out\n"));
        assert!(text.contains("err\n"));
    }

    #[test]
    fn runs_in_given_directory() {
        let dir = tempdir().unwrap();
        let before = std::env::current_dir().unwrap();
        Subject::default()
            .run("touch created.txt", dir.path(), timeout())
            .unwrap();
        assert!(dir.path().join("created.txt").exists());
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn stdin_is_empty() {
        let dir = tempdir().unwrap();
        let outcome = subject("cat").run("", dir.path(), timeout()).unwrap();
        assert_eq!(outcome, RunOutcome::Success(String::new()));
    }

    #[test]
    fn reports_nonzero_exit() {
        let dir = tempdir().unwrap();
        let outcome = Subject::default().run("sh -c 'exit 3'", dir.path(), timeout()).unwrap();
        assert_eq!(
            outcome,
            RunOutcome::NonZeroExit {
                code: Some(3),
                signal: None
            }
        );
    }

    #[test]
    fn kills_on_timeout() {
        let dir = tempdir().unwrap();
        let start = Instant::now();
        let outcome = subject("sleep")
            .run("10", dir.path(), Duration::from_millis(200))
            .unwrap();
        assert_eq!(outcome, RunOutcome::Timeout);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn background_child_cannot_outlive_deadline() {
        let dir = tempdir().unwrap();
        let start = Instant::now();
        let outcome = Subject::default()
            .run("sh -c 'echo hi; sleep 4 &'", dir.path(), Duration::from_millis(500))
            .unwrap();
        assert_eq!(outcome, RunOutcome::Timeout);
        assert!(start.elapsed() < Duration::from_secs(3), "{:?}", start.elapsed());
    }

    #[test]
    fn progdir_is_searched_first() {
        let bin = tempdir().unwrap();
        let work = tempdir().unwrap();
        let subject = Subject {
            prefix: String::new(),
            progdir: Some(bin.path().to_path_buf()),
        };
        let outcome = subject
            .run("sh -c 'echo \"$PATH\"'", work.path(), timeout())
            .unwrap();
        let RunOutcome::Success(path) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        let first = path.trim().split(':').next().unwrap().to_string();
        assert_eq!(first, bin.path().display().to_string());
    }
}
