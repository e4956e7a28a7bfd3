//! Ignore pattern normalization and matching.
//!
//! Raw lines come from the caller (typically a settings document). Each kept
//! pattern is stored twice: once bare and once with `/*` appended, so a rule
//! such as `node_modules` excludes both the entry and everything beneath it.
//!
//! Matching uses shell-glob semantics where `*` also crosses `/`.

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Component, Path};
use tracing::warn;

use crate::error::EngineError;

const DIR_WILDCARD: &str = "/*";

/// A compiled, normalized set of ignore patterns.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<String>,
    matcher: GlobSet,
}

impl IgnoreRules {
    /// Normalize and compile raw pattern lines.
    pub fn new<I, S>(lines: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = normalize_patterns(lines).into_iter().collect();

        let mut builder = GlobSetBuilder::new();
        for glob in patterns.iter().filter_map(|p| compile_pattern(p)) {
            builder.add(glob);
        }
        let matcher = builder
            .build()
            .map_err(|source| EngineError::InvalidPatterns { source })?;

        Ok(IgnoreRules { patterns, matcher })
    }

    /// Build rules from a newline-delimited block of text.
    pub fn from_text(text: &str) -> Result<Self, EngineError> {
        Self::new(text.lines())
    }

    /// Rules that ignore nothing.
    pub fn empty() -> Self {
        IgnoreRules {
            patterns: Vec::new(),
            matcher: GlobSet::empty(),
        }
    }

    /// The normalized patterns, sorted.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True if any rule matches `candidate` verbatim.
    pub fn matches(&self, candidate: &str) -> bool {
        self.matcher.is_match(candidate)
    }

    /// Decide whether `path` (somewhere under `source_root`) is excluded.
    ///
    /// Every prefix of the relative path is tested, so an ignored ancestor
    /// excludes all of its descendants. The root itself is never ignored.
    pub fn should_ignore(&self, path: &Path, source_root: &Path) -> bool {
        if self.is_empty() {
            return false;
        }

        let relative = path.strip_prefix(source_root).unwrap_or(path);
        let mut current = String::new();

        for component in relative.components() {
            let segment = match component {
                Component::Normal(part) => part.to_string_lossy(),
                _ => continue,
            };

            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(&segment);

            if self.matches(&segment)
                || self.matches(&current)
                || self.matches(&format!("{}{}", current, DIR_WILDCARD))
            {
                return true;
            }

            if source_root.join(&current).is_dir() && self.matches(&format!("{}/", current)) {
                return true;
            }
        }

        false
    }
}

/// Turn raw lines into the normalized pattern set.
///
/// Blank lines and `#` comments are dropped, one trailing `/` is stripped and
/// every pattern not already ending in `/*` gains a `/*` sibling.
pub fn normalize_patterns<I, S>(lines: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized = BTreeSet::new();

    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let pattern = line.strip_suffix('/').unwrap_or(line);
        if pattern.is_empty() {
            continue;
        }

        if pattern.ends_with(DIR_WILDCARD) {
            normalized.insert(pattern.to_string());
        } else {
            normalized.insert(pattern.to_string());
            normalized.insert(format!("{}{}", pattern, DIR_WILDCARD));
        }
    }

    normalized
}

fn compile_pattern(pattern: &str) -> Option<Glob> {
    let build = |text: &str| {
        GlobBuilder::new(text)
            .literal_separator(false)
            .backslash_escape(false)
            .build()
    };

    match build(pattern) {
        Ok(glob) => Some(glob),
        Err(err) => {
            warn!(pattern, error = %err, "ignore pattern is not a valid glob, matching it literally");
            build(&globset::escape(pattern)).ok()
        }
    }
}
