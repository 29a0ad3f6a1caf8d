//! Path exclusion patterns
//!
//! Patterns are glob-like:
//! - `**` matches anything, including `/`
//! - `*` matches a run of characters that are neither `/` nor whitespace
//! - everything else is literal
//!
//! A pattern must match the whole path; one trailing `/` on the path is
//! tolerated. `/admin/**` excludes `/admin/settings` and `/admin/users/7`,
//! `/blog/*` excludes `/blog/hello` but not `/blog/hello/comments`.

use regex::Regex;

use crate::error::{Error, Result};

/// A compiled exclusion pattern
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&translate(pattern)).map_err(|source| Error::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let mut rest = pattern;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("**") {
            out.push_str(".*");
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix('*') {
            out.push_str(r"[^/\s]*");
            rest = tail;
        } else {
            let next = rest.find('*').unwrap_or(rest.len());
            out.push_str(&regex::escape(&rest[..next]));
            rest = &rest[next..];
        }
    }

    out.push_str("/?$");
    out
}

/// The set of patterns configured for a session; first match wins
#[derive(Debug, Clone, Default)]
pub struct PathExcluder {
    patterns: Vec<PathPattern>,
}

impl PathExcluder {
    /// Compile every pattern. Patterns that fail to compile are skipped.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match PathPattern::compile(p.as_ref()) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring exclude pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First pattern matching `path`, if any
    pub fn find(&self, path: &str) -> Option<&PathPattern> {
        self.patterns.iter().find(|p| p.matches(path))
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.find(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, path: &str) -> bool {
        PathPattern::compile(pattern).unwrap().matches(path)
    }

    #[test]
    fn test_double_star_crosses_segments() {
        assert!(matches("/admin/**", "/admin/settings"));
        assert!(matches("/admin/**", "/admin/users/7/edit"));
        assert!(matches("/admin/**", "/admin/"));
        assert!(!matches("/admin/**", "/about"));
        assert!(!matches("/admin/**", "/administrator"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        assert!(matches("/blog/*", "/blog/hello"));
        assert!(matches("/blog/*", "/blog/hello/"));
        assert!(!matches("/blog/*", "/blog/hello/comments"));
        assert!(!matches("/blog/*", "/blog/hello world"));
    }

    #[test]
    fn test_anchored_literal() {
        assert!(matches("/about", "/about"));
        assert!(matches("/about", "/about/"));
        assert!(!matches("/about", "/about-us"));
        assert!(!matches("/about", "/en/about"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("/search.html", "/search.html"));
        assert!(!matches("/search.html", "/searchXhtml"));
        assert!(matches("/a+b/(x)", "/a+b/(x)"));
    }

    #[test]
    fn test_excluder_first_match() {
        let excluder = PathExcluder::new(&["/admin/**", "/private/*"]);
        assert_eq!(
            excluder.find("/admin/settings").map(PathPattern::as_str),
            Some("/admin/**")
        );
        assert!(excluder.is_excluded("/private/keys"));
        assert!(!excluder.is_excluded("/about"));
    }

    #[test]
    fn test_empty_excluder() {
        let excluder = PathExcluder::new::<&str>(&[]);
        assert!(excluder.is_empty());
        assert!(!excluder.is_excluded("/anything"));
    }
}
