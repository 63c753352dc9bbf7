//! Script grammar.
//!
//! Scripts are read one instruction at a time. Every instruction occupies one
//! line except `>`, which also consumes its expected-output block up to the
//! `<<<` (fuzzy) or `<<<*` (regex) terminator.
//!
//! ```text
//! # comment
//! T 2.5
//! + dest.txt reference.txt
//! - name
//! > command args
//! expected line
//! <<<
//! = name reference.txt
//! * absent.txt
//! E present.txt
//! D VAR "value"
//! ```

use crate::compare::MatchMode;
use crate::error::{Result, ScriptError};
use regex::Regex;
use std::iter::Enumerate;
use std::str::Lines;
use std::sync::LazyLock;

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*#").unwrap());
static BLANK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*$").unwrap());
static TIMEOUT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^T\s*(\S+)").unwrap());
static COPY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+\s*(\S+)\s+(\S+)").unwrap());
static DELETE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-\s*(\S+)").unwrap());
static RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^>\s*(.*)").unwrap());
static SAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^=\s*(\S+)\s+(\S+)").unwrap());
static ABSENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\*\s*(\S+)").unwrap());
static EXISTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^E\s*(\S+)").unwrap());
static DEFINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^D\s*([a-zA-Z_][a-zA-Z_0-9]*)\s*"(.*)"\s*$"#).unwrap());

/// One parsed script instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Comment or blank line.
    Comment,
    /// `T secs`
    SetTimeout(f64),
    /// `+ dest src`
    CopyFile { dest: String, src: String },
    /// `- name`
    DeleteFile(String),
    /// `> command` plus its expected-output block.
    RunAndCheck {
        command: String,
        expected: Vec<String>,
        mode: MatchMode,
    },
    /// `= name reference`
    CheckFileContent { name: String, reference: String },
    /// `* name`
    CheckFileAbsent(String),
    /// `E name`
    CheckFileExists(String),
    /// `D name "value"`
    DefineVariable { name: String, value: String },
}

/// Incremental reader over a script's text.
pub struct ScriptReader<'a> {
    lines: Enumerate<Lines<'a>>,
    line: usize,
}

impl<'a> ScriptReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
            line: 0,
        }
    }

    /// 1-based number of the last line consumed.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Read the next instruction, or `None` at end of input.
    ///
    /// `expand` is applied to every non-comment line before it is parsed,
    /// including each expected-output line of a `>` block.
    pub fn next_instruction<F>(&mut self, mut expand: F) -> Result<Option<Instruction>>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let Some(raw) = self.advance() else {
            return Ok(None);
        };
        if COMMENT.is_match(raw) {
            return Ok(Some(Instruction::Comment));
        }
        let line = expand(raw)?;
        if BLANK.is_match(&line) {
            return Ok(Some(Instruction::Comment));
        }

        if let Some(c) = TIMEOUT.captures(&line) {
            return parse_timeout(&c[1]).map(Some);
        }
        if let Some(c) = COPY.captures(&line) {
            return Ok(Some(Instruction::CopyFile {
                dest: c[1].to_string(),
                src: c[2].to_string(),
            }));
        }
        if let Some(c) = DELETE.captures(&line) {
            return Ok(Some(Instruction::DeleteFile(c[1].to_string())));
        }
        if let Some(c) = RUN.captures(&line) {
            let command = c[1].trim_end().to_string();
            return self.read_block(command, expand).map(Some);
        }
        if let Some(c) = SAME.captures(&line) {
            return Ok(Some(Instruction::CheckFileContent {
                name: c[1].to_string(),
                reference: c[2].to_string(),
            }));
        }
        if let Some(c) = ABSENT.captures(&line) {
            return Ok(Some(Instruction::CheckFileAbsent(c[1].to_string())));
        }
        if let Some(c) = EXISTS.captures(&line) {
            return Ok(Some(Instruction::CheckFileExists(c[1].to_string())));
        }
        if let Some(c) = DEFINE.captures(&line) {
            return Ok(Some(Instruction::DefineVariable {
                name: c[1].to_string(),
                value: c[2].to_string(),
            }));
        }
        Err(ScriptError::Malformed(self.line))
    }

    fn advance(&mut self) -> Option<&'a str> {
        let (index, raw) = self.lines.next()?;
        self.line = index + 1;
        Some(raw)
    }

    fn read_block<F>(&mut self, command: String, mut expand: F) -> Result<Instruction>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let mut expected = Vec::new();
        loop {
            let Some(raw) = self.advance() else {
                return Err(ScriptError::Unterminated(command));
            };
            let raw = raw.trim_end();
            let mode = match raw {
                "<<<" => Some(MatchMode::Fuzzy),
                "<<<*" => Some(MatchMode::Regex),
                _ => None,
            };
            if let Some(mode) = mode {
                return Ok(Instruction::RunAndCheck {
                    command,
                    expected,
                    mode,
                });
            }
            expected.push(expand(raw)?);
        }
    }
}

fn parse_timeout(text: &str) -> Result<Instruction> {
    match text.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(Instruction::SetTimeout(secs)),
        _ => Err(ScriptError::BadTimeout(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(s: &str) -> Result<String> {
        Ok(s.to_string())
    }

    fn parse_all(text: &str) -> Result<Vec<Instruction>> {
        let mut reader = ScriptReader::new(text);
        let mut out = Vec::new();
        while let Some(instr) = reader.next_instruction(literal)? {
            out.push(instr);
        }
        Ok(out)
    }

    fn parse_one(line: &str) -> Instruction {
        let mut all = parse_all(line).unwrap();
        assert_eq!(all.len(), 1, "{all:?}");
        all.remove(0)
    }

    #[test]
    fn parses_single_line_instructions() {
        assert_eq!(parse_one("# note ${UNDEFINED}"), Instruction::Comment);
        assert_eq!(parse_one("   "), Instruction::Comment);
        assert_eq!(parse_one("T 2.5"), Instruction::SetTimeout(2.5));
        assert_eq!(
            parse_one("+ wug.txt notwug.txt"),
            Instruction::CopyFile {
                dest: "wug.txt".to_string(),
                src: "notwug.txt".to_string()
            }
        );
        assert_eq!(parse_one("- wug.txt"), Instruction::DeleteFile("wug.txt".to_string()));
        assert_eq!(
            parse_one("= wug.txt wug.txt"),
            Instruction::CheckFileContent {
                name: "wug.txt".to_string(),
                reference: "wug.txt".to_string()
            }
        );
        assert_eq!(parse_one("* gone.txt"), Instruction::CheckFileAbsent("gone.txt".to_string()));
        assert_eq!(parse_one("E .gitlet"), Instruction::CheckFileExists(".gitlet".to_string()));
        assert_eq!(
            parse_one(r#"D UID "[a-f0-9]+""#),
            Instruction::DefineVariable {
                name: "UID".to_string(),
                value: "[a-f0-9]+".to_string()
            }
        );
    }

    #[test]
    fn parses_run_block_fuzzy() {
        let instr = parse_one("> log --oneline\nline one\nline two\n<<<\n");
        assert_eq!(
            instr,
            Instruction::RunAndCheck {
                command: "log --oneline".to_string(),
                expected: vec!["line one".to_string(), "line two".to_string()],
                mode: MatchMode::Fuzzy,
            }
        );
    }

    #[test]
    fn parses_run_block_regex_and_empty() {
        let all = parse_all("> status\n(\\d+) files\n<<<*\n> init\n<<<\n").unwrap();
        assert_eq!(all.len(), 2);
        let Instruction::RunAndCheck { mode, expected, .. } = &all[0] else {
            panic!("unexpected instruction: {:?}", all[0]);
        };
        assert_eq!(*mode, MatchMode::Regex);
        assert_eq!(expected.len(), 1);
        let Instruction::RunAndCheck { mode, expected, .. } = &all[1] else {
            panic!("unexpected instruction: {:?}", all[1]);
        };
        assert_eq!(*mode, MatchMode::Fuzzy);
        assert!(expected.is_empty());
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let err = parse_all("> init\nexpected\n").unwrap_err();
        assert!(matches!(err, ScriptError::Unterminated(ref c) if c == "init"));
    }

    #[test]
    fn bad_timeout_is_an_error() {
        assert!(matches!(parse_all("T soon"), Err(ScriptError::BadTimeout(_))));
        assert!(matches!(parse_all("T -1"), Err(ScriptError::BadTimeout(_))));
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let err = parse_all("# ok\n\n? what\n").unwrap_err();
        assert!(matches!(err, ScriptError::Malformed(3)));
    }

    #[test]
    fn define_requires_quotes() {
        assert!(matches!(parse_all("D NAME alice"), Err(ScriptError::Malformed(1))));
    }

    #[test]
    fn reader_tracks_line_numbers() {
        let mut reader = ScriptReader::new("# a\n> cmd\nx\n<<<\nE f\n");
        reader.next_instruction(literal).unwrap();
        assert_eq!(reader.line(), 1);
        reader.next_instruction(literal).unwrap();
        assert_eq!(reader.line(), 4);
        reader.next_instruction(literal).unwrap();
        assert_eq!(reader.line(), 5);
        assert!(reader.next_instruction(literal).unwrap().is_none());
    }

    #[test]
    fn expand_applies_to_block_lines_but_not_comments() {
        let mut seen = Vec::new();
        let mut reader = ScriptReader::new("# ${X}\n> hi\nhello ${X}\n<<<\n");
        let mut expand = |s: &str| -> Result<String> {
            seen.push(s.to_string());
            Ok(s.replace("${X}", "bob"))
        };
        reader.next_instruction(&mut expand).unwrap();
        let instr = reader.next_instruction(&mut expand).unwrap().unwrap();
        assert_eq!(seen, vec!["> hi".to_string(), "hello ${X}".to_string()]);
        let Instruction::RunAndCheck { expected, .. } = instr else {
            panic!("unexpected instruction: {instr:?}");
        };
        assert_eq!(expected, vec!["hello bob".to_string()]);
    }
}
