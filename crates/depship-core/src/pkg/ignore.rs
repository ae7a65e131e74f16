//! Ignore-file rules for package copies.
//!
//! One pattern per line. Blank lines and `#` comments are skipped, a leading
//! `!` re-includes, a trailing `/` only matches directories, and a leading or
//! inner `/` anchors the pattern to the package root. Unanchored patterns
//! match any trailing run of path components. The last matching rule wins.

use crate::error::{Error, Result};
use depship_util::fs::read_to_string_lossy;
use glob::{MatchOptions, Pattern};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Per-package ignore file.
pub const IGNORE_FILE: &str = ".npmignore";

/// Patterns every package copy starts with.
pub const DEFAULT_IGNORES: &[&str] = &[
    ".git",
    "CVS",
    ".svn",
    ".hg",
    ".lock-wscript",
    ".wafpickle-*",
    ".*.swp",
    ".DS_Store",
    "._*",
    "npm-debug.log",
    ".npmrc",
    "config.gypi",
    "*.orig",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A single parsed pattern line.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
    anchored: bool,
}

impl IgnoreRule {
    /// Parse one line. Returns `None` for blanks, comments and invalid globs.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (negated, rest) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (dir_only, rest) = match rest.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let (anchored, rest) = match rest.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (rest.contains('/'), rest),
        };
        if rest.is_empty() {
            return None;
        }

        match Pattern::new(rest) {
            Ok(pattern) => Some(Self {
                pattern,
                negated,
                dir_only,
                anchored,
            }),
            Err(e) => {
                warn!(pattern = %line, error = %e, "skipping invalid ignore pattern");
                None
            }
        }
    }

    /// Whether this line re-includes matches.
    #[must_use]
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    fn unanchored(mut self) -> Self {
        self.anchored = false;
        self
    }

    fn matches(&self, components: &[String], is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }

        if self.anchored {
            return self
                .pattern
                .matches_with(&components.join("/"), MATCH_OPTIONS);
        }

        (0..components.len()).any(|start| {
            self.pattern
                .matches_with(&components[start..].join("/"), MATCH_OPTIONS)
        })
    }
}

/// Ordered rule set.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    /// Parse a pattern list in ignore-file syntax.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self {
            rules: text.lines().filter_map(IgnoreRule::parse).collect(),
        }
    }

    /// The built-in defaults.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            rules: DEFAULT_IGNORES
                .iter()
                .filter_map(|line| IgnoreRule::parse(line))
                .collect(),
        }
    }

    /// Defaults followed by the package's own `.npmignore`, if any.
    ///
    /// The top-level package.json is always kept.
    pub fn for_package(dir: &Path) -> io::Result<Self> {
        let mut rules = Self::defaults();

        match read_to_string_lossy(&dir.join(IGNORE_FILE)) {
            Ok(text) => rules.extend(Self::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        rules.rules.extend(IgnoreRule::parse("!/package.json"));
        Ok(rules)
    }

    /// Global exclusions from command-line patterns and pattern files.
    ///
    /// Every global rule is unanchored, so it can be matched against
    /// absolute paths.
    ///
    /// # Errors
    /// Returns [`Error::ExcludeFile`] if a pattern file cannot be read.
    pub fn global(patterns: &[String], files: &[PathBuf]) -> Result<Self> {
        let mut rules = Self::default();
        for pattern in patterns {
            rules.rules.extend(IgnoreRule::parse(pattern));
        }
        for file in files {
            let text = read_to_string_lossy(file).map_err(|source| Error::ExcludeFile {
                path: file.clone(),
                source,
            })?;
            rules.extend(Self::parse(&text));
        }

        rules.rules = rules.rules.into_iter().map(IgnoreRule::unanchored).collect();
        Ok(rules)
    }

    /// Append `other`, which takes precedence.
    pub fn extend(&mut self, other: IgnoreRules) {
        self.rules.extend(other.rules);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether `path` is excluded. Package rules take a path relative to the
    /// package root, global rules take any path.
    #[must_use]
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if self.rules.is_empty() {
            return false;
        }

        let components: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        let mut excluded = false;
        for rule in &self.rules {
            if rule.matches(&components, is_dir) {
                excluded = !rule.negated;
            }
        }
        excluded
    }
}
