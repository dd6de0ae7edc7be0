//! Glob-style pattern matching for action and resource identifiers
//!
//! The only special character is `*`, which matches zero or more characters
//! of any kind (including `:` and `/`). Everything else is literal. Matching
//! is anchored to the whole candidate and case-sensitive:
//!
//! - `storage:GetObject` matches only `storage:GetObject`
//! - `storage:*` matches `storage:GetObject` and `storage:` but not `Storage:Get`
//! - `*` matches every candidate, including the empty string
//! - the empty pattern matches only the empty string
//!
//! Patterns are compiled once when a statement is loaded; exact patterns
//! never touch the regex engine.

use regex::{Regex, RegexBuilder};
use std::fmt;
use tracing::warn;

/// Compiled size limit for a single wildcard pattern
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// A compiled action or resource pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    /// `*` (or a run of `*`): matches everything
    Any,
    /// No wildcard: plain string equality
    Exact,
    /// Literal segments joined by wildcards
    Glob(Regex),
    /// Could not be compiled; never matches
    Never,
}

impl Pattern {
    /// Compile a pattern string
    ///
    /// Never fails. Should the regex engine refuse the translated pattern
    /// (size limits), the pattern is kept but matches nothing; see
    /// [`Pattern::is_compiled`].
    pub fn compile(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();

        let kind = if !raw.is_empty() && raw.chars().all(|c| c == '*') {
            PatternKind::Any
        } else if !raw.contains('*') {
            PatternKind::Exact
        } else {
            match RegexBuilder::new(&Self::translate(&raw))
                .size_limit(PATTERN_SIZE_LIMIT)
                .build()
            {
                Ok(regex) => PatternKind::Glob(regex),
                Err(e) => {
                    warn!("Pattern '{}' could not be compiled, it will never match: {}", raw, e);
                    PatternKind::Never
                }
            }
        };

        Self { raw, kind }
    }

    /// Translate a glob into an anchored regex source
    fn translate(pattern: &str) -> String {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        // (?s) lets `.` cross newlines so `*` really means "any characters"
        format!("(?s)^{}$", body)
    }

    /// Check whether the whole candidate matches this pattern
    pub fn matches(&self, candidate: &str) -> bool {
        match &self.kind {
            PatternKind::Any => true,
            PatternKind::Exact => self.raw == candidate,
            PatternKind::Glob(regex) => regex.is_match(candidate),
            PatternKind::Never => false,
        }
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains no wildcard
    pub fn is_exact(&self) -> bool {
        matches!(self.kind, PatternKind::Exact)
    }

    /// False when the pattern could not be compiled and never matches
    pub fn is_compiled(&self) -> bool {
        !matches!(self.kind, PatternKind::Never)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// One-shot match without keeping the compiled pattern around
pub fn matches(pattern: &str, candidate: &str) -> bool {
    Pattern::compile(pattern).matches(candidate)
}

/// Check a candidate against a list of compiled patterns (any may match)
pub fn matches_any(patterns: &[Pattern], candidate: &str) -> bool {
    patterns.iter().any(|p| p.matches(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches("storage:GetObject", "storage:GetObject"));
        assert!(!matches("storage:GetObject", "storage:GetObjects"));
        assert!(!matches("storage:GetObject", "xstorage:GetObject"));
        assert!(Pattern::compile("storage:GetObject").is_exact());
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!matches("storage:GetObject", "storage:getobject"));
        assert!(!matches("Storage:*", "storage:GetObject"));
    }

    #[test]
    fn test_star_matches_everything() {
        assert!(matches("*", ""));
        assert!(matches("*", "storage:GetObject"));
        assert!(matches("*", "bucket:raw/a/b/c.txt"));
        assert!(matches("***", "anything"));
    }

    #[test]
    fn test_empty_pattern() {
        assert!(matches("", ""));
        assert!(!matches("", "a"));
    }

    #[test]
    fn test_trailing_wildcard() {
        assert!(matches("bucket:raw/*", "bucket:raw/file.txt"));
        assert!(matches("bucket:raw/*", "bucket:raw/nested/dir/file.txt"));
        assert!(matches("bucket:raw/*", "bucket:raw/"));
        assert!(!matches("bucket:raw/*", "bucket:raw"));
        assert!(!matches("bucket:raw/*", "bucket:processed/file.txt"));
    }

    #[test]
    fn test_wildcards_in_the_middle() {
        assert!(matches("*:Get*", "storage:GetObject"));
        assert!(matches("*:Get*", "compute:GetInstance"));
        assert!(!matches("*:Get*", "storage:PutObject"));
        assert!(matches("bucket:*/file-*.log", "bucket:logs/file-2024.log"));
        assert!(!matches("bucket:*/file-*.log", "bucket:logs/file-2024.txt"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("bucket:a.b", "bucket:a.b"));
        assert!(!matches("bucket:a.b*", "bucket:axb"));
        assert!(matches("fn:(x)+[y]*", "fn:(x)+[y]z"));
        assert!(!matches("fn:?", "fn:a"));
    }

    #[test]
    fn test_wildcard_crosses_newlines() {
        assert!(matches("a*b", "a\nb"));
    }

    #[test]
    fn test_oversized_pattern_never_matches() {
        let huge = "a*".repeat(100_000);
        let pattern = Pattern::compile(huge.clone());
        assert!(!pattern.is_compiled());
        assert!(!pattern.matches(&huge));
        assert!(Pattern::compile("bucket:*/file-*").is_compiled());
    }

    #[test]
    fn test_matches_any() {
        let patterns = vec![
            Pattern::compile("storage:GetObject"),
            Pattern::compile("storage:List*"),
        ];
        assert!(matches_any(&patterns, "storage:ListBuckets"));
        assert!(!matches_any(&patterns, "storage:PutObject"));
        assert!(!matches_any(&[], "storage:PutObject"));
    }
}
