//! Expected-vs-actual output comparison.

use crate::matcher::{Captures, edit_distance, try_match};

/// Largest per-line edit distance still accepted in fuzzy mode.
pub const OUTPUT_TOLERANCE: usize = 2;

/// How expected lines are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Each line must be within [`OUTPUT_TOLERANCE`] edits of the actual line.
    Fuzzy,
    /// Each line is a regex that must match the whole actual line.
    Regex,
}

/// Result of comparing one command's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// Output accepted. In regex mode with at least one line, `captures`
    /// holds the groups of the last line's match.
    Matched { captures: Option<Captures> },
    /// Different number of non-blank lines.
    LineCount { expected: usize, actual: usize },
    /// Line `index` (0-based) did not match.
    LineMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Matched { .. })
    }

    /// One-line description of a mismatch, empty for a match.
    pub fn describe(&self) -> String {
        match self {
            Comparison::Matched { .. } => String::new(),
            Comparison::LineCount { expected, actual } => {
                format!("expected {expected} line(s), got {actual}")
            }
            Comparison::LineMismatch {
                index,
                expected,
                actual,
            } => format!(
                "line {}: expected {expected:?}, got {actual:?}",
                index + 1
            ),
        }
    }
}

/// Compare `expected` lines against the captured `actual` text.
///
/// Trailing blank lines on either side are ignored. Lines are compared with
/// surrounding whitespace trimmed.
pub fn compare_output(expected: &[String], actual: &str, mode: MatchMode) -> Comparison {
    let actual: Vec<&str> = actual
        .trim_end_matches(['\n', '\r'])
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();

    let expected_len = significant_len(expected);
    let actual_len = significant_len(&actual);
    if expected_len != actual_len {
        return Comparison::LineCount {
            expected: expected_len,
            actual: actual_len,
        };
    }

    let mut captures = None;
    for (index, (e, a)) in expected.iter().zip(&actual).take(expected_len).enumerate() {
        let (e, a) = (e.trim(), a.trim());
        let ok = match mode {
            MatchMode::Regex => match try_match(&format!("{e}$"), a) {
                Some(groups) => {
                    captures = Some(groups);
                    true
                }
                None => false,
            },
            MatchMode::Fuzzy => edit_distance(e, a) <= OUTPUT_TOLERANCE,
        };
        if !ok {
            return Comparison::LineMismatch {
                index,
                expected: e.to_string(),
                actual: a.to_string(),
            };
        }
    }

    Comparison::Matched { captures }
}

/// Number of lines left after dropping trailing all-whitespace lines.
fn significant_len<S: AsRef<str>>(lines: &[S]) -> usize {
    lines
        .iter()
        .rposition(|line| !line.as_ref().trim().is_empty())
        .map_or(0, |last| last + 1)
}
