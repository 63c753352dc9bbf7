//! Line matchers used by the output comparator.
//!
//! Two flavours: a Levenshtein distance for near-exact comparison, and an
//! anchored regex match that hands back its capture groups.

use regex::Regex;

/// Ordered capture groups of one successful match. Index 0 is the whole match.
pub type Captures = Vec<String>;

/// Compute the Levenshtein (edit) distance between two strings.
///
/// Counts single-character insertions, deletions and substitutions. Works on
/// `char`s, so a multi-byte character is one edit.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut dist = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for (i, row) in dist.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in dist[0].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            dist[i][j] = (dist[i - 1][j] + 1)
                .min(dist[i][j - 1] + 1)
                .min(dist[i - 1][j - 1] + cost);
        }
    }
    dist[a.len()][b.len()]
}

/// Match `pattern` against the start of `candidate`.
///
/// The match is anchored at the beginning only; callers wanting a full-line
/// match append `$` themselves. Groups that did not participate in the match
/// come back as empty strings. An invalid pattern never matches.
pub fn try_match(pattern: &str, candidate: &str) -> Option<Captures> {
    let re = match Regex::new(&format!("^(?:{pattern})")) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("invalid pattern {pattern:?}: {e}");
            return None;
        }
    };

    let caps = re.captures(candidate)?;
    Some(
        caps.iter()
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect(),
    )
}
