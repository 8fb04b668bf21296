//! Citation schemas: the names, kinds and nesting order of a work's levels.

use super::path::{CitationPath, Locator};
use crate::error::CitationError;
use serde::{Deserialize, Serialize};

/// Default separator between locators (`1.2`, `327a.5`).
pub const DEFAULT_SEPARATOR: char = '.';

/// Value space of a single citation level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LevelKind {
    /// Decimal integers, compared numerically. Bounds are inclusive.
    Numeric {
        #[serde(default)]
        min: Option<u32>,
        #[serde(default)]
        max: Option<u32>,
    },
    /// Letters only (`a`, `pr`, `Α`), compared lexically.
    Alphabetic,
    /// Digits followed by an optional letter suffix (`327`, `327a`), compared
    /// by number first and suffix second.
    Alphanumeric,
}

impl LevelKind {
    /// Unbounded numeric level.
    pub fn numeric() -> Self {
        LevelKind::Numeric {
            min: None,
            max: None,
        }
    }
}

/// One named level of a citation schema (e.g. `book`, `line`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationLevel {
    pub name: String,
    pub kind: LevelKind,
}

impl CitationLevel {
    pub fn new(name: impl Into<String>, kind: LevelKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered citation levels of a work, outermost first.
///
/// A path under this schema carries between one and [`depth`](Self::depth)
/// locators. Paths shorter than the schema address a whole book (or other
/// outer unit) explicitly; they never stand in for a guessed line number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationSchema {
    pub levels: Vec<CitationLevel>,
    #[serde(default = "default_separator")]
    pub separator: char,
}

fn default_separator() -> char {
    DEFAULT_SEPARATOR
}

impl CitationSchema {
    pub fn new(levels: Vec<CitationLevel>) -> Self {
        Self {
            levels,
            separator: DEFAULT_SEPARATOR,
        }
    }

    /// Schema whose levels are all unbounded numeric (`book`, `line`).
    pub fn numeric(names: &[&str]) -> Self {
        Self::new(
            names
                .iter()
                .map(|name| CitationLevel::new(*name, LevelKind::numeric()))
                .collect(),
        )
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Number of levels.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Position of a level by name (ASCII case-insensitive).
    pub fn level_index(&self, name: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.name.eq_ignore_ascii_case(name))
    }

    /// Human-readable level names, e.g. `book.line`.
    pub fn describe(&self) -> String {
        self.levels
            .iter()
            .map(|l| l.name.as_str())
            .collect::<Vec<_>>()
            .join(&self.separator.to_string())
    }

    /// Checks that the schema itself is usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.levels.is_empty() {
            return Err("schema must declare at least one level".to_string());
        }
        if self.separator.is_alphanumeric() || self.separator.is_whitespace() {
            return Err(format!(
                "separator '{}' must be a punctuation character",
                self.separator
            ));
        }
        for (i, level) in self.levels.iter().enumerate() {
            if level.name.trim().is_empty() {
                return Err(format!("level {} has an empty name", i + 1));
            }
            if self.levels[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&level.name))
            {
                return Err(format!("duplicate level name '{}'", level.name));
            }
            if let LevelKind::Numeric {
                min: Some(min),
                max: Some(max),
            } = level.kind
            {
                if min > max {
                    return Err(format!(
                        "level '{}' has min {} greater than max {}",
                        level.name, min, max
                    ));
                }
            }
        }
        Ok(())
    }

    /// Parses a citation string (`"1.2"`) into a path under this schema.
    ///
    /// Fails when the string is empty, carries more locators than the schema
    /// has levels, has an empty locator, or a locator is not valid for its
    /// level.
    pub fn parse(&self, citation: &str) -> Result<CitationPath, CitationError> {
        let trimmed = citation.trim();
        if trimmed.is_empty() {
            return Err(CitationError::new(citation, "citation is empty"));
        }

        let parts: Vec<&str> = trimmed.split(self.separator).collect();
        if parts.len() > self.depth() {
            return Err(CitationError::new(
                citation,
                format!(
                    "expected at most {} locator(s) ({}), found {}",
                    self.depth(),
                    self.describe(),
                    parts.len()
                ),
            ));
        }

        let mut locators = Vec::with_capacity(parts.len());
        for (index, raw) in parts.iter().enumerate() {
            let locator = self
                .parse_locator(index, raw)
                .map_err(|reason| CitationError::new(citation, reason))?;
            locators.push(locator);
        }

        Ok(CitationPath::new(locators))
    }

    /// Parses a single locator for the level at `index`.
    ///
    /// The error is a bare reason; callers attach the surrounding context.
    pub fn parse_locator(&self, index: usize, raw: &str) -> Result<Locator, String> {
        let level = self
            .levels
            .get(index)
            .ok_or_else(|| format!("schema has no level {}", index + 1))?;

        if raw.is_empty() {
            return Err(format!("empty locator for level '{}'", level.name));
        }

        match &level.kind {
            LevelKind::Numeric { min, max } => {
                if !raw.chars().all(|c| c.is_ascii_digit()) {
                    return Err(format!(
                        "locator '{}' for level '{}' is not numeric",
                        raw, level.name
                    ));
                }
                let value: u32 = raw.parse().map_err(|_| {
                    format!("locator '{}' for level '{}' is out of range", raw, level.name)
                })?;
                if min.is_some_and(|m| value < m) || max.is_some_and(|m| value > m) {
                    return Err(format!(
                        "locator {} for level '{}' is outside {}..={}",
                        value,
                        level.name,
                        min.map(|m| m.to_string()).unwrap_or_default(),
                        max.map(|m| m.to_string()).unwrap_or_default()
                    ));
                }
                Ok(Locator::Number(value))
            }
            LevelKind::Alphabetic => {
                if raw.chars().all(char::is_alphabetic) {
                    Ok(Locator::Label(raw.to_string()))
                } else {
                    Err(format!(
                        "locator '{}' for level '{}' must be alphabetic",
                        raw, level.name
                    ))
                }
            }
            LevelKind::Alphanumeric => {
                let digits_end = raw
                    .char_indices()
                    .find(|(_, c)| !c.is_ascii_digit())
                    .map(|(i, _)| i)
                    .unwrap_or(raw.len());
                let (digits, suffix) = raw.split_at(digits_end);
                if digits.is_empty() || !suffix.chars().all(char::is_alphabetic) {
                    return Err(format!(
                        "locator '{}' for level '{}' must be digits with an optional letter suffix",
                        raw, level.name
                    ));
                }
                let number: u32 = digits.parse().map_err(|_| {
                    format!("locator '{}' for level '{}' is out of range", raw, level.name)
                })?;
                Ok(Locator::Mixed(number, suffix.to_string()))
            }
        }
    }

    /// Formats a path as a citation string. Inverse of [`parse`](Self::parse)
    /// for every path `parse` produces.
    pub fn format(&self, path: &CitationPath) -> String {
        path.locators()
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(&self.separator.to_string())
    }

    /// Checks a path built elsewhere (adapter output, persisted data) against
    /// this schema by round-tripping each locator through its level.
    pub fn validate_path(&self, path: &CitationPath) -> Result<(), CitationError> {
        let formatted = self.format(path);
        if path.is_empty() {
            return Err(CitationError::new(formatted, "path has no locators"));
        }
        if path.len() > self.depth() {
            return Err(CitationError::new(
                formatted,
                format!("path is deeper than schema {}", self.describe()),
            ));
        }
        for (index, locator) in path.locators().iter().enumerate() {
            let reparsed = self
                .parse_locator(index, &locator.to_string())
                .map_err(|reason| CitationError::new(formatted.clone(), reason))?;
            if &reparsed != locator {
                return Err(CitationError::new(
                    formatted,
                    format!("locator kind does not match level {}", index + 1),
                ));
            }
        }
        Ok(())
    }
}
