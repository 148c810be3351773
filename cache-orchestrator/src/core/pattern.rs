//! Key pattern helpers
//!
//! Glob patterns over cache keys: `*` matches any run of characters
//! (including none), `?` matches exactly one. Keys are namespaced as
//! `{namespace}:{rest}`.

use super::error::{OrchestratorError, Result};

/// Check whether `key` matches the glob `pattern`
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();

    let (mut pi, mut ki) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ki;
            pi += 1;
        } else if let Some(s) = star {
            // Backtrack: let the last star absorb one more char
            pi = s + 1;
            mark += 1;
            ki = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }

    pi == p.len()
}

/// Literal prefix of a pattern (everything before the first wildcard)
pub fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?']) {
        Some(idx) => &pattern[..idx],
        None => pattern,
    }
}

/// Namespace of a key or pattern, if its first segment is literal
pub fn namespace_of(key: &str) -> Option<&str> {
    let (namespace, _) = key.split_once(':')?;
    if namespace.is_empty() || namespace.contains(['*', '?']) {
        return None;
    }
    Some(namespace)
}

/// Reject patterns that would be meaningless against the store
pub fn validate(pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(OrchestratorError::InvalidPattern(
            "pattern must not be empty".to_string(),
        ));
    }
    Ok(())
}
