//! Shell-glob matching of resource names.
//!
//! `*` matches any run of characters (including none), `?` exactly one, and
//! `[set]` / `[a-z]` / `[!set]` one character of a class. Matching is
//! case-sensitive and backslash is an ordinary character. An empty selector
//! list matches every name; otherwise a name matches when any pattern does.

use std::fmt;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::{Error, Result};

/// A compiled list of selector patterns.
#[derive(Debug, Clone)]
pub struct Selectors {
    patterns: Vec<String>,
    set: GlobSet,
}

impl Selectors {
    /// Compiles `patterns`. Fails on the first pattern globset rejects.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .literal_separator(false)
                .backslash_escape(false)
                .build()
                .map_err(|source| Error::InvalidSelector {
                    pattern: pattern.to_string(),
                    source,
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| Error::InvalidSelector {
            pattern: patterns
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(" "),
            source,
        })?;
        Ok(Self {
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            set,
        })
    }

    /// Selectors that match everything.
    pub fn all() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `name` is selected.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.set.is_match(name)
    }
}

impl fmt::Display for Selectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patterns.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&self.patterns.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selected<'a>(names: &[&'a str], patterns: &[&str]) -> Vec<&'a str> {
        let selectors = Selectors::new(patterns).unwrap();
        names
            .iter()
            .copied()
            .filter(|name| selectors.matches(name))
            .collect()
    }

    #[test]
    fn test_question_mark_matches_exactly_one() {
        let names = ["nginx", "nginx2", "nginx22"];
        assert_eq!(selected(&names, &["nginx?"]), vec!["nginx2"]);
    }

    #[test]
    fn test_star_matches_empty_run() {
        let names = ["nginx", "nginx2", "nginx22", "traefik"];
        assert_eq!(selected(&names, &["nginx*"]), vec!["nginx", "nginx2", "nginx22"]);
    }

    #[test]
    fn test_character_classes() {
        let names = ["db1", "db2", "db3", "dbx"];
        assert_eq!(selected(&names, &["db[12]"]), vec!["db1", "db2"]);
        assert_eq!(selected(&names, &["db[0-9]"]), vec!["db1", "db2", "db3"]);
        assert_eq!(selected(&names, &["db[!0-9]"]), vec!["dbx"]);
    }

    #[test]
    fn test_empty_list_selects_everything() {
        let names = ["a", "b"];
        assert_eq!(selected(&names, &[]), vec!["a", "b"]);
        assert!(Selectors::all().matches("anything"));
    }

    #[test]
    fn test_patterns_are_or_combined() {
        let names = ["media", "cloud", "nginx"];
        assert_eq!(selected(&names, &["media", "ngin*"]), vec!["media", "nginx"]);
    }

    #[test]
    fn test_case_sensitive() {
        assert_eq!(selected(&["Media", "media"], &["media"]), vec!["media"]);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Selectors::new(&["media[", "ok"]).unwrap_err();
        assert!(matches!(err, Error::InvalidSelector { ref pattern, .. } if pattern == "media["));
    }

    #[test]
    fn test_display() {
        assert_eq!(Selectors::all().to_string(), "*");
        assert_eq!(Selectors::new(&["a*", "b"]).unwrap().to_string(), "a* b");
    }
}
