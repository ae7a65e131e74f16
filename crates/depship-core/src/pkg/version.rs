//! Range satisfaction using semver with npm range syntax.

use semver::{Version, VersionReq};

/// Decides whether an installed version satisfies a declared range.
pub trait VersionMatcher: std::fmt::Debug {
    /// Returns true if `version` satisfies `range`.
    ///
    /// A range that cannot be parsed matches every version.
    fn satisfies(&self, version: &str, range: &str) -> bool;
}

/// npm-flavoured matcher built on the `semver` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemverMatcher;

impl VersionMatcher for SemverMatcher {
    fn satisfies(&self, version: &str, range: &str) -> bool {
        version_satisfies(version, range)
    }
}

/// Check a concrete version against an npm range.
///
/// # Rules
/// - Unparseable ranges (`workspace:*`, `file:..`, git URLs, dist-tags) match anything
/// - `""`, `*`, `x` match anything
/// - Bare versions are exact (`1.0.0`) or partial (`1.2` means `1.2.x`)
/// - Supports OR ranges like `^1.0.0 || ^2.0.0`, hyphen ranges, x-ranges and
///   space-separated comparators
/// - An unparseable installed version never satisfies a parseable range
#[must_use]
pub fn version_satisfies(version: &str, range: &str) -> bool {
    let Some(reqs) = parse_range_set(range) else {
        return true;
    };

    let Ok(version) = parse_version(version) else {
        return false;
    };

    reqs.iter().any(|req| req.matches(&version))
}

/// Parse an installed version, tolerating a leading `v` or `=`.
fn parse_version(version: &str) -> Result<Version, semver::Error> {
    let version = version.trim();
    let version = version
        .strip_prefix('=')
        .or_else(|| version.strip_prefix('v'))
        .unwrap_or(version);
    Version::parse(version)
}

/// Parse a full range into its `||` alternatives.
///
/// Returns `None` when the range means "anything", either explicitly or
/// because no alternative can be parsed.
fn parse_range_set(range: &str) -> Option<Vec<VersionReq>> {
    let range = range.trim();
    if matches!(range, "" | "*" | "x" | "X") {
        return None;
    }

    // Invalid alternatives are skipped, the others still apply
    let reqs: Vec<VersionReq> = range
        .split("||")
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .filter_map(parse_range)
        .collect();

    if reqs.is_empty() {
        None
    } else {
        Some(reqs)
    }
}

/// Parse a single alternative, handling npm-specific syntax.
///
/// Handles:
/// - Standard semver ranges: ^1.0.0, ~1.0.0, >=1.0.0, etc.
/// - Hyphen ranges: 1.0.0 - 2.0.0
/// - X-ranges: 1.x, 1.0.x, ^1.x
/// - Space-separated comparators: >= 2.1.2 < 3.0.0
fn parse_range(range: &str) -> Option<VersionReq> {
    if let Some((start, end)) = parse_hyphen_range(range) {
        let converted = format!(">={}, <={}", strip_wildcards(&start), strip_wildcards(&end));
        return VersionReq::parse(&converted).ok();
    }

    VersionReq::parse(&convert_comparators(range)).ok()
}

/// Parse a hyphen range like "1.0.0 - 2.0.0".
fn parse_hyphen_range(range: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = range.split(" - ").collect();
    if let [start, end] = parts.as_slice() {
        let start = start.trim();
        let end = end.trim();
        if !start.is_empty() && !end.is_empty() {
            return Some((start.to_string(), end.to_string()));
        }
    }
    None
}

/// Convert npm comparator syntax to the comma-separated form `semver` expects.
///
/// npm allows ">= 2.1.2 < 3.0.0" which means ">=2.1.2 AND <3.0.0".
/// Lone operators are glued to the following version, bare versions are
/// pinned with `=`, and wildcard components are dropped.
fn convert_comparators(range: &str) -> String {
    let mut comparators = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().all(is_operator_char) {
            pending_op.push_str(token);
            continue;
        }

        let op_len = token
            .find(|c: char| !is_operator_char(c))
            .unwrap_or(token.len());
        let (op, version) = token.split_at(op_len);
        let op = format!("{pending_op}{op}");
        pending_op.clear();

        let version = version.strip_prefix('v').unwrap_or(version);
        let version = strip_wildcards(version);
        if version == "*" {
            comparators.push("*".to_string());
        } else if op.is_empty() {
            comparators.push(format!("={version}"));
        } else {
            comparators.push(format!("{op}{version}"));
        }
    }

    comparators.join(", ")
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '~' | '^')
}

/// Drop trailing wildcard components: "1.2.x" -> "1.2", "1.x.x" -> "1", "x" -> "*".
fn strip_wildcards(version: &str) -> String {
    let mut parts: Vec<&str> = version.split('.').collect();
    while parts
        .last()
        .is_some_and(|p| matches!(*p, "x" | "X" | "*"))
    {
        parts.pop();
    }

    if parts.is_empty() {
        "*".to_string()
    } else {
        parts.join(".")
    }
}
