//! Filter engine: decides, per filesystem entry, whether it belongs in the digest.
//!
//! Patterns are glob-style and matched case-sensitively against the path relative
//! to the repository root, always using `/` as separator:
//!
//! - a pattern without `/` (`*.bin`, `.*`, `node_modules`) matches the entry's
//!   base name at any depth;
//! - a pattern containing `/` (`src/*.rs`, `docs/**`) matches the whole relative
//!   path; `*` and `?` stay within one segment while `**` spans segments;
//! - a trailing `/` (`build/`) restricts the pattern to directories.
//!
//! A pattern that matches a directory also matches everything beneath it.
//! Patterns that do not compile as globs are compared literally instead of
//! failing the run.

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::config::FilterSpec;
use crate::contract::EntryKind;
use crate::error::IngestError;

/// Outcome of evaluating one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Included,
    ExcludedByPattern,
    ExcludedBySize,
}

impl FilterDecision {
    pub fn is_included(self) -> bool {
        self == FilterDecision::Included
    }
}

/// A validated [`FilterSpec`] with its patterns compiled once per run.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    max_file_size_bytes: u64,
    include: PatternSet,
    exclude: PatternSet,
}

impl CompiledFilter {
    /// Validates the spec and compiles its patterns. This never touches the
    /// filesystem, so configuration errors surface before any IO happens.
    pub fn compile(spec: &FilterSpec) -> Result<Self, IngestError> {
        spec.validate()?;
        let max_file_size_bytes = u64::try_from(spec.max_file_size_bytes).map_err(|_| {
            IngestError::FilterConfig(format!(
                "max_file_size_bytes must not be negative, got {}",
                spec.max_file_size_bytes
            ))
        })?;
        Ok(Self {
            max_file_size_bytes,
            include: PatternSet::new(&spec.include_patterns),
            exclude: PatternSet::new(&spec.exclude_patterns),
        })
    }

    /// Full decision for an entry, distinguishing why it was dropped.
    pub fn evaluate(&self, relative_path: &str, kind: EntryKind, size_bytes: u64) -> FilterDecision {
        match kind {
            // Directories are only ever pruned by exclusion, never by size or
            // by the include set: included files may live underneath them.
            EntryKind::Directory => {
                if !relative_path.is_empty() && self.exclude.matches(relative_path, true) {
                    FilterDecision::ExcludedByPattern
                } else {
                    FilterDecision::Included
                }
            }
            EntryKind::File => {
                let wanted =
                    self.include.is_empty() || self.include.matches(relative_path, false);
                if !wanted || self.exclude.matches(relative_path, false) {
                    FilterDecision::ExcludedByPattern
                } else if size_bytes > self.max_file_size_bytes {
                    FilterDecision::ExcludedBySize
                } else {
                    FilterDecision::Included
                }
            }
        }
    }

    pub fn is_included(&self, relative_path: &str, kind: EntryKind, size_bytes: u64) -> bool {
        self.evaluate(relative_path, kind, size_bytes).is_included()
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_bytes
    }
}

/// One-shot form of [`CompiledFilter::is_included`]. An invalid spec includes nothing.
pub fn is_included(relative_path: &str, kind: EntryKind, size_bytes: u64, spec: &FilterSpec) -> bool {
    match CompiledFilter::compile(spec) {
        Ok(filter) => filter.is_included(relative_path, kind, size_bytes),
        Err(e) => {
            debug!(error = %e, "Rejecting entry under invalid filter spec");
            false
        }
    }
}

/// Splits a user-supplied pattern string on commas and whitespace.
///
/// `"*.py, docs/  *.md"` becomes `["*.py", "docs/", "*.md"]`.
pub fn parse_pattern_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default)]
struct PatternSet {
    patterns: Vec<Pattern>,
}

#[derive(Debug, Clone)]
struct Pattern {
    matcher: Matcher,
    basename_only: bool,
    dir_only: bool,
}

#[derive(Debug, Clone)]
enum Matcher {
    Glob(GlobMatcher),
    Literal(String),
}

impl PatternSet {
    fn new(raw: &[String]) -> Self {
        Self {
            patterns: raw.iter().filter_map(|p| Pattern::parse(p)).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True if any pattern matches the entry or one of its ancestor directories.
    fn matches(&self, relative_path: &str, is_dir: bool) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        if self.matches_one(relative_path, is_dir) {
            return true;
        }
        let mut ancestor = relative_path;
        while let Some(idx) = ancestor.rfind('/') {
            ancestor = &ancestor[..idx];
            if self.matches_one(ancestor, true) {
                return true;
            }
        }
        false
    }

    fn matches_one(&self, path: &str, is_dir: bool) -> bool {
        self.patterns.iter().any(|p| p.matches(path, is_dir))
    }
}

impl Pattern {
    fn parse(raw: &str) -> Option<Self> {
        let mut text = raw.trim();
        text = text.strip_prefix("./").unwrap_or(text);
        let dir_only = text.ends_with('/');
        let text = text.trim_end_matches('/');
        let anchored = text.starts_with('/');
        let text = text.trim_start_matches('/');
        if text.is_empty() {
            return None;
        }
        let basename_only = !anchored && !text.contains('/');
        let matcher = match GlobBuilder::new(text).literal_separator(true).build() {
            Ok(glob) => Matcher::Glob(glob.compile_matcher()),
            Err(e) => {
                debug!(pattern = raw, error = %e, "Pattern is not a valid glob, matching literally");
                Matcher::Literal(text.to_string())
            }
        };
        Some(Self {
            matcher,
            basename_only,
            dir_only,
        })
    }

    fn matches(&self, path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        let target = if self.basename_only {
            path.rsplit('/').next().unwrap_or(path)
        } else {
            path
        };
        match &self.matcher {
            Matcher::Glob(glob) => glob.is_match(target),
            Matcher::Literal(literal) => literal == target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(max: i64, include: &[&str], exclude: &[&str]) -> FilterSpec {
        FilterSpec {
            max_file_size_bytes: max,
            include_patterns: include.iter().map(|s| s.to_string()).collect(),
            exclude_patterns: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn compiled(max: i64, include: &[&str], exclude: &[&str]) -> CompiledFilter {
        CompiledFilter::compile(&spec(max, include, exclude)).unwrap()
    }

    #[test]
    fn empty_sets_include_everything_within_size() {
        let f = compiled(100, &[], &[]);
        assert!(f.is_included("a.txt", EntryKind::File, 100));
        assert_eq!(f.evaluate("a.txt", EntryKind::File, 101), FilterDecision::ExcludedBySize);
    }

    #[test]
    fn basename_patterns_match_at_any_depth() {
        let f = compiled(1000, &[], &["*.bin"]);
        assert_eq!(f.evaluate("b.bin", EntryKind::File, 1), FilterDecision::ExcludedByPattern);
        assert_eq!(f.evaluate("src/deep/b.bin", EntryKind::File, 1), FilterDecision::ExcludedByPattern);
        assert!(f.is_included("src/a.py", EntryKind::File, 1));
    }

    #[test]
    fn slash_patterns_are_segment_aware() {
        let f = compiled(1000, &["src/*.rs"], &[]);
        assert!(f.is_included("src/main.rs", EntryKind::File, 1));
        assert!(!f.is_included("src/nested/lib.rs", EntryKind::File, 1));
        let f = compiled(1000, &["src/**/*.rs"], &[]);
        assert!(f.is_included("src/nested/lib.rs", EntryKind::File, 1));
    }

    #[test]
    fn question_mark_matches_single_char() {
        let f = compiled(1000, &["?.md"], &[]);
        assert!(f.is_included("a.md", EntryKind::File, 1));
        assert!(!f.is_included("ab.md", EntryKind::File, 1));
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let f = compiled(1000, &["*.py"], &["secret.py"]);
        assert!(f.is_included("app.py", EntryKind::File, 1));
        assert_eq!(f.evaluate("secret.py", EntryKind::File, 1), FilterDecision::ExcludedByPattern);
    }

    #[test]
    fn directory_patterns_cover_descendants() {
        let f = compiled(1000, &[], &["build/"]);
        assert_eq!(f.evaluate("build", EntryKind::Directory, 0), FilterDecision::ExcludedByPattern);
        assert!(!f.is_included("build/out/app.js", EntryKind::File, 1));
        // A file called `build` is not a directory.
        assert!(f.is_included("build", EntryKind::File, 1));

        let f = compiled(1000, &["src/"], &[]);
        assert!(f.is_included("src/a/b/c.txt", EntryKind::File, 1));
        assert!(!f.is_included("README.md", EntryKind::File, 1));
    }

    #[test]
    fn directories_ignore_size_and_include_set() {
        let f = compiled(0, &["*.py"], &[]);
        assert!(f.is_included("src", EntryKind::Directory, 4096));
    }

    #[test]
    fn hidden_entries_excluded_by_default() {
        let f = CompiledFilter::compile(&FilterSpec::default()).unwrap();
        assert!(!f.is_included(".git", EntryKind::Directory, 0));
        assert!(!f.is_included("src/.env", EntryKind::File, 1));
        assert!(f.is_included("src/main.rs", EntryKind::File, 1));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let f = compiled(1000, &[], &["*.MD"]);
        assert!(f.is_included("README.md", EntryKind::File, 1));
        assert!(!f.is_included("README.MD", EntryKind::File, 1));
    }

    #[test]
    fn malformed_patterns_match_literally() {
        let f = compiled(1000, &[], &["[oops"]);
        assert!(f.is_included("oops", EntryKind::File, 1));
        assert!(!f.is_included("dir/[oops", EntryKind::File, 1));
    }

    #[test]
    fn blank_patterns_are_ignored() {
        let f = compiled(1000, &["  ", "/"], &[""]);
        assert!(f.is_included("anything.txt", EntryKind::File, 1));
    }

    #[test]
    fn one_shot_helper_rejects_under_invalid_spec() {
        assert!(!is_included("a", EntryKind::File, 0, &spec(-1, &[], &[])));
        assert!(is_included("a", EntryKind::File, 0, &spec(0, &[], &[])));
    }

    #[test]
    fn pattern_lists_split_on_commas_and_whitespace() {
        assert_eq!(
            parse_pattern_list("*.py, docs/  *.md,,\n.*"),
            vec!["*.py", "docs/", "*.md", ".*"]
        );
        assert!(parse_pattern_list("   ").is_empty());
    }
}
