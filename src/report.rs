//! Result reporting.

use crate::runner::{ScriptResult, Verdict};
use std::fmt::Write as _;

/// How many failing scripts get a full listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowLimit {
    Count(usize),
    All,
}

impl std::str::FromStr for ShowLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(ShowLimit::All);
        }
        s.parse()
            .map(ShowLimit::Count)
            .map_err(|_| format!("expected a number or \"all\", got {s:?}"))
    }
}

/// Totals over a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Summary {
    pub passed: usize,
    /// Scripts whose subject misbehaved.
    pub failed: usize,
    /// Scripts that are malformed or could not run.
    pub faulty: usize,
}

impl Summary {
    pub fn record(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed { .. } => self.failed += 1,
            Verdict::Faulty { .. } => self.faulty += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.faulty
    }

    /// Process exit status: the number of unsuccessful scripts, capped at 255.
    pub fn exit_code(&self) -> i32 {
        i32::try_from((self.failed + self.faulty).min(255)).unwrap_or(255)
    }
}

/// The one-line status shown after a script's name.
pub fn status_line(result: &ScriptResult) -> String {
    match &result.verdict {
        Verdict::Passed => "OK".to_string(),
        Verdict::Failed { failure, .. } => format!("ERROR ({failure})"),
        Verdict::Faulty { error, .. } => format!("FAILED ({error})"),
    }
}

/// Extra detail for a failing script, if the failure carries any.
pub fn failure_detail(result: &ScriptResult) -> Option<String> {
    match &result.verdict {
        Verdict::Failed {
            failure: crate::error::Failure::IncorrectOutput { detail },
            ..
        } => Some(detail.clone()),
        _ => None,
    }
}

/// Numbered listing of a script with the failing line pointed out.
pub fn format_details(result: &ScriptResult, source: &str) -> String {
    let base = result
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| result.name.clone());
    let lines: Vec<&str> = source.lines().collect();
    let width = lines.len().to_string().len();

    let mut out = String::new();
    if let Some(line) = result.verdict.line().filter(|&line| line > 0) {
        let _ = writeln!(out, "    Error on line {line} of {base}");
    }
    let rule = "-".repeat(20);
    let _ = writeln!(out, "{rule} {base} {rule}");
    for (index, text) in lines.iter().enumerate() {
        let marker = if Some(index + 1) == result.verdict.line() { '>' } else { ' ' };
        let _ = writeln!(out, "{marker}{:>width$}. {text}", index + 1);
    }
    let _ = writeln!(out, "{}", "-".repeat(42 + base.len()));
    out
}

/// JSON record for one script.
pub fn to_json(result: &ScriptResult) -> serde_json::Value {
    let (status, line, message) = match &result.verdict {
        Verdict::Passed => ("passed", None, None),
        Verdict::Failed { line, failure } => ("failed", Some(*line), Some(failure.to_string())),
        Verdict::Faulty { line, error } => ("faulty", Some(*line), Some(error.to_string())),
    };
    serde_json::json!({
        "name": result.name,
        "file": result.path.display().to_string(),
        "status": status,
        "line": line,
        "message": message,
        "detail": failure_detail(result),
        "duration": result.duration.as_secs_f64(),
        "kept_dir": result.kept_dir.as_ref().map(|p| p.display().to_string()),
    })
}

/// Final summary line for human output.
pub fn summary_line(summary: &Summary) -> String {
    let mut line = format!(
        "Ran {} tests. {} passed, {} failed",
        summary.total(),
        summary.passed,
        summary.failed
    );
    if summary.faulty > 0 {
        let _ = write!(line, ", {} faulty test file(s)", summary.faulty);
    }
    line.push('.');
    line
}
