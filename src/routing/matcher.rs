//! Path prefix matching.
//!
//! # Design Decisions
//! - Matching is on the raw path, before percent-decoding
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching

/// Matches the request path prefix of one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// The rest of `path` past the prefix, if it matches.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.strip_prefix(self.prefix.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip() {
        let m = PathPrefixMatcher::new("/img/");
        assert_eq!(m.strip("/img/logo.png"), Some("logo.png"));
        assert_eq!(m.strip("/img/"), Some(""));
        assert_eq!(m.strip("/img"), None);
        assert_eq!(m.strip("/IMG/logo.png"), None);
    }

    #[test]
    fn test_encoded_remainder_untouched() {
        let m = PathPrefixMatcher::new("/files/");
        assert!(m.matches("/files/a%20b"));
        assert_eq!(m.strip("/files/a%20b"), Some("a%20b"));
    }
}
