use serde::{Deserialize, Serialize};
use std::fmt;

/// A single locator within a citation path.
///
/// Variant order matters: the derived `Ord` compares numbers numerically and
/// mixed locators by number first, then suffix. A path never mixes variants at
/// the same level because each level has exactly one kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    /// Numeric level (`12`)
    Number(u32),
    /// Alphanumeric level (`327a`); the suffix may be empty
    Mixed(u32, String),
    /// Alphabetic level (`pr`)
    Label(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Number(n) => write!(f, "{}", n),
            Locator::Mixed(n, suffix) => write!(f, "{}{}", n, suffix),
            Locator::Label(label) => f.write_str(label),
        }
    }
}

/// Canonical position of a segment within its work: one locator per schema
/// level, outermost first.
///
/// Paths compare lexicographically across levels, so a prefix (`2`) sorts
/// before any of its extensions (`2.1`) and after everything in the previous
/// book (`1.900`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CitationPath(Vec<Locator>);

impl CitationPath {
    pub fn new(locators: Vec<Locator>) -> Self {
        Self(locators)
    }

    pub fn locators(&self) -> &[Locator] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every locator of `self` matches the start of `other`.
    /// A path is a prefix of itself.
    pub fn is_prefix_of(&self, other: &CitationPath) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Path truncated to its first `depth` locators.
    pub fn truncated(&self, depth: usize) -> CitationPath {
        CitationPath(self.0.iter().take(depth).cloned().collect())
    }

    pub(crate) fn push(&mut self, locator: Locator) {
        self.0.push(locator);
    }

    pub(crate) fn pop(&mut self) -> Option<Locator> {
        self.0.pop()
    }
}

impl From<Vec<Locator>> for CitationPath {
    fn from(locators: Vec<Locator>) -> Self {
        Self(locators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(nums: &[u32]) -> CitationPath {
        CitationPath::new(nums.iter().copied().map(Locator::Number).collect())
    }

    #[test]
    fn test_lexicographic_order() {
        let mut paths = vec![path(&[2, 1]), path(&[1, 10]), path(&[2]), path(&[1, 2])];
        paths.sort();
        assert_eq!(
            paths,
            vec![path(&[1, 2]), path(&[1, 10]), path(&[2]), path(&[2, 1])]
        );
    }

    #[test]
    fn test_prefix() {
        assert!(path(&[1]).is_prefix_of(&path(&[1, 5])));
        assert!(path(&[1, 5]).is_prefix_of(&path(&[1, 5])));
        assert!(!path(&[1, 5]).is_prefix_of(&path(&[1])));
        assert!(!path(&[2]).is_prefix_of(&path(&[1, 5])));
    }

    #[test]
    fn test_truncated() {
        assert_eq!(path(&[1, 2, 3]).truncated(2), path(&[1, 2]));
        assert_eq!(path(&[1]).truncated(4), path(&[1]));
    }

    #[test]
    fn test_json_shape() {
        let p = CitationPath::new(vec![
            Locator::Number(1),
            Locator::Mixed(327, "a".into()),
            Locator::Label("pr".into()),
        ]);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"[1,[327,"a"],"pr"]"#);
        let back: CitationPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
