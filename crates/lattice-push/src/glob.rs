//! Push rule globs.
//!
//! Globs support `*` (any run), `?` (any single character) and character
//! classes (`[abc]`, `[a-z]`, `[!abc]`). Everything else is literal. Matching
//! is case-insensitive.
//!
//! Compiled expressions are kept in a [`GlobCache`] owned by the processor and
//! live as long as it does.

use std::collections::HashMap;

use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use crate::errors::{PushError, Result};

/// Translate a glob into an unanchored regular expression body.
#[must_use]
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    let mut rest = glob;
    while let Some(c) = rest.chars().next() {
        rest = &rest[c.len_utf8()..];
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match rest.find(']') {
                Some(end) => {
                    let mut class = &rest[..end];
                    rest = &rest[end + 1..];
                    out.push('[');
                    if let Some(negated) = class.strip_prefix('!') {
                        out.push('^');
                        class = negated;
                    }
                    for c in class.chars() {
                        if matches!(c, '\\' | '[' | '^' | '&' | '~') {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                    out.push(']');
                }
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out
}

/// Full expression for a glob.
///
/// With `word_boundary` the glob may match anywhere between non-word
/// characters (used for `content.body`); otherwise it must match the whole
/// value.
#[must_use]
pub fn glob_expression(glob: &str, word_boundary: bool) -> String {
    let body = glob_to_regex(glob);
    if word_boundary {
        format!(r"(?i)(^|\W){body}(\W|$)")
    } else {
        format!("(?i)^{body}$")
    }
}

/// Cache of compiled globs keyed by pattern and anchoring.
#[derive(Debug, Default)]
pub struct GlobCache {
    compiled: Mutex<HashMap<(String, bool), Regex>>,
}

impl GlobCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The compiled expression for `glob`, compiling it on first use.
    pub fn regex(&self, glob: &str, word_boundary: bool) -> Result<Regex> {
        let key = (glob.to_owned(), word_boundary);
        if let Some(re) = self.compiled.lock().get(&key) {
            return Ok(re.clone());
        }

        let re = Regex::new(&glob_expression(glob, word_boundary)).map_err(|source| {
            PushError::InvalidGlob {
                pattern: glob.to_owned(),
                source,
            }
        })?;
        debug!(glob, word_boundary, "compiled push glob");
        let _ = self.compiled.lock().insert(key, re.clone());
        Ok(re)
    }

    /// Whether `value` matches `glob`.
    pub fn is_match(&self, glob: &str, word_boundary: bool, value: &str) -> Result<bool> {
        Ok(self.regex(glob, word_boundary)?.is_match(value))
    }

    /// Number of compiled globs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.compiled.lock().len()
    }

    /// Whether nothing has been compiled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compiled.lock().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
