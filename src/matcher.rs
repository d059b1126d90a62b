/*!
 * Include/exclude glob filtering over relative paths
 *
 * Two engines implement the same minimal dialect: `*` matches within one
 * path segment, `**` as a whole segment matches zero or more segments, and
 * `?` matches exactly one non-separator character. Everything else is a
 * literal. Paths are always `/`-separated and relative to the selection root.
 */

use clap::ValueEnum;
use globset::GlobBuilder;
use regex::Regex;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::error::{FlattenError, Result};

/// A compiled single-pattern predicate
pub type Matcher = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Turns one glob pattern into a predicate
pub trait GlobCompiler {
    /// Compile `pattern` into a matcher over `/`-separated relative paths
    fn compile(&self, pattern: &str) -> Result<Matcher>;
}

/// Which glob engine compiles the patterns
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Display, EnumString, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GlobEngine {
    /// The `globset` crate
    #[default]
    Globset,
    /// Built-in translation of the pattern to a regular expression
    Regex,
}

impl GlobEngine {
    /// Get the compiler backing this engine
    pub fn compiler(self) -> Box<dyn GlobCompiler> {
        match self {
            Self::Globset => Box::new(GlobsetCompiler),
            Self::Regex => Box::new(RegexCompiler),
        }
    }
}

/// Compiles patterns with `globset`, restricted to the minimal dialect
pub struct GlobsetCompiler;

impl GlobCompiler for GlobsetCompiler {
    fn compile(&self, pattern: &str) -> Result<Matcher> {
        let glob = GlobBuilder::new(&escape_extended(pattern))
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|e| FlattenError::Glob(format!("invalid pattern '{}': {}", pattern, e)))?;
        let matcher = glob.compile_matcher();
        Ok(Box::new(move |path: &str| matcher.is_match(path)))
    }
}

/// Escape the syntax globset supports beyond `*`, `**` and `?`
fn escape_extended(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        if matches!(ch, '[' | ']' | '{' | '}' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Translates patterns to anchored regular expressions
pub struct RegexCompiler;

impl GlobCompiler for RegexCompiler {
    fn compile(&self, pattern: &str) -> Result<Matcher> {
        let source = glob_to_regex(pattern);
        let regex = Regex::new(&source)
            .map_err(|e| FlattenError::Glob(format!("invalid pattern '{}': {}", pattern, e)))?;
        Ok(Box::new(move |path: &str| regex.is_match(path)))
    }
}

/// Build the anchored regex source for a glob pattern
fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let segment_start = i == 0 || chars[i - 1] == '/';
                let next = chars.get(i + 2);
                if segment_start && next == Some(&'/') {
                    // `**/` matches zero or more leading segments
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else if segment_start && next.is_none() {
                    out.push_str(".*");
                    i += 2;
                } else {
                    // `**` inside a segment behaves like `*`
                    out.push_str("[^/]*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            ch => {
                out.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4])));
                i += 1;
            }
        }
    }

    out.push('$');
    out
}

/// Membership predicate built from include and exclude pattern sets
pub struct PathMatcher {
    includes: Vec<Matcher>,
    excludes: Vec<Matcher>,
}

impl PathMatcher {
    /// Compile both pattern sets with the given compiler
    pub fn new(
        includes: &[String],
        excludes: &[String],
        compiler: &dyn GlobCompiler,
    ) -> Result<Self> {
        let compile_all = |patterns: &[String]| -> Result<Vec<Matcher>> {
            patterns.iter().map(|p| compiler.compile(p)).collect()
        };

        Ok(Self {
            includes: compile_all(includes)?,
            excludes: compile_all(excludes)?,
        })
    }

    /// Whether a relative path passes the filters
    ///
    /// An empty include set admits everything.
    pub fn included(&self, relative_path: &str) -> bool {
        let path = relative_path.replace('\\', "/");
        let included = self.includes.is_empty() || self.includes.iter().any(|m| m(&path));
        included && !self.excludes.iter().any(|m| m(&path))
    }
}
