//! Variable environment and `${...}` substitution.

use crate::error::{Result, ScriptError};
use crate::matcher::Captures;
use std::collections::HashMap;

/// Upper bound on substitution passes over a single line.
///
/// Values may themselves contain `${...}` references, so substitution is
/// repeated until the line stops changing. A line still containing references
/// after this many passes is returned as it stands.
pub const MAX_SUBSTITUTION_PASSES: usize = 10;

/// Named definitions plus the capture groups of the last regex-mode match.
#[derive(Debug, Default, Clone)]
pub struct Variables {
    defs: HashMap<String, String>,
    captures: Captures,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `name`, substituting existing variables into `raw` first.
    pub fn define(&mut self, name: &str, raw: &str) -> Result<()> {
        let value = self.substitute(raw)?;
        self.defs.insert(name.to_string(), value);
        Ok(())
    }

    /// Replace the capture groups that `${N}` refers to.
    pub fn record_captures(&mut self, captures: Captures) {
        self.captures = captures;
    }

    /// Expand `${name}` and `${N}` references in `line` up to a fixed point.
    pub fn substitute(&self, line: &str) -> Result<String> {
        let mut current = line.to_string();
        for _ in 0..MAX_SUBSTITUTION_PASSES {
            let next = self.substitute_once(&current)?;
            if next == current {
                break;
            }
            current = next;
        }
        Ok(current)
    }

    /// One left-to-right pass. An unclosed `${` is kept literally.
    fn substitute_once(&self, s: &str) -> Result<String> {
        let mut result = String::with_capacity(s.len());
        let mut rest = s;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                result.push_str(&rest[start..]);
                return Ok(result);
            };
            result.push_str(&self.lookup(&after[..end])?);
            rest = &after[end + 1..];
        }
        result.push_str(rest);
        Ok(result)
    }

    fn lookup(&self, key: &str) -> Result<String> {
        if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
            return key
                .parse::<usize>()
                .ok()
                .and_then(|n| self.captures.get(n))
                .cloned()
                .ok_or_else(|| ScriptError::MissingGroup(key.to_string()));
        }
        self.defs
            .get(key)
            .cloned()
            .ok_or_else(|| ScriptError::UndefinedVariable(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        let vars = Variables::new();
        assert_eq!(vars.substitute("no vars here").unwrap(), "no vars here");
        assert_eq!(vars.substitute("").unwrap(), "");
        assert_eq!(vars.substitute("cost: $5 {x}").unwrap(), "cost: $5 {x}");
    }

    #[test]
    fn definitions_build_on_each_other() {
        let mut vars = Variables::new();
        vars.define("A", "x").unwrap();
        vars.define("B", "${A}y").unwrap();
        assert_eq!(vars.defs.get("B").map(String::as_str), Some("xy"));
        assert_eq!(vars.substitute("${A}${B}").unwrap(), "xxy");
        assert_eq!(vars.substitute("pre_${A}_post").unwrap(), "pre_x_post");
    }

    #[test]
    fn nested_references_expand_in_later_passes() {
        let mut vars = Variables::new();
        vars.define("INNER", "value").unwrap();
        // Stored literally, then expanded when substituted.
        vars.defs.insert("OUTER".to_string(), "<${INNER}>".to_string());
        assert_eq!(vars.substitute("${OUTER}").unwrap(), "<value>");
    }

    #[test]
    fn cyclic_definition_stops_at_bound() {
        let mut vars = Variables::new();
        vars.defs.insert("X".to_string(), "a${X}".to_string());
        let out = vars.substitute("${X}").unwrap();
        assert!(out.contains("${X}"));
        assert_eq!(out.matches('a').count(), MAX_SUBSTITUTION_PASSES);
    }

    #[test]
    fn undefined_variable_is_named() {
        let vars = Variables::new();
        let err = vars.substitute("hello ${Z}").unwrap_err();
        assert!(matches!(&err, ScriptError::UndefinedVariable(name) if name == "Z"));
        assert!(err.to_string().contains("${Z}"));
    }

    #[test]
    fn numeric_references_use_captures() {
        let mut vars = Variables::new();
        vars.record_captures(vec!["id=42".to_string(), "42".to_string()]);
        assert_eq!(vars.substitute("${1}").unwrap(), "42");
        assert_eq!(vars.substitute("[${0}]").unwrap(), "[id=42]");
    }

    #[test]
    fn out_of_range_group_is_an_error() {
        let mut vars = Variables::new();
        vars.record_captures(vec!["x".to_string()]);
        let err = vars.substitute("${3}").unwrap_err();
        assert!(matches!(err, ScriptError::MissingGroup(ref k) if k == "3"));
    }

    #[test]
    fn no_captures_before_first_regex_match() {
        let vars = Variables::new();
        assert!(vars.captures.is_empty());
        assert!(vars.substitute("${0}").is_err());
    }

    #[test]
    fn unclosed_reference_is_literal() {
        let mut vars = Variables::new();
        vars.define("A", "x").unwrap();
        assert_eq!(vars.substitute("${A} ${UNCLOSED").unwrap(), "x ${UNCLOSED");
    }
}
