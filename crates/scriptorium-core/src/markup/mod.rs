//! Source markup: adapters that turn a document into a uniform event stream,
//! and the ingestor that turns events into citable segments.
//!
//! Adapters know a markup vocabulary (TEI XML, cited plain-text lines) and
//! nothing about schemas. The [`MarkupIngestor`] knows schemas and nothing
//! about markup.

mod ingestor;
mod lines;
mod tei;

pub use ingestor::{IngestOutcome, MarkupIngestor};
pub use lines::CitedLinesAdapter;
pub use tei::TeiAdapter;

use crate::error::AdapterError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Position in the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    /// Byte offset into the document content
    pub offset: usize,
    /// 1-based line number
    pub line: usize,
}

impl Location {
    /// Location of a byte offset within `content`.
    pub fn at(content: &str, offset: usize) -> Self {
        let offset = offset.min(content.len());
        let line = content.as_bytes()[..offset]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1;
        Self { offset, line }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} (byte {})", self.line, self.offset)
    }
}

/// Structural and textual events emitted by a [`SourceAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupEvent {
    /// Start of the text of a registered work
    WorkStart { work_id: String },
    WorkEnd,
    /// Opens a citation level. `level` names the schema level when the markup
    /// says which one; `None` means the next level down.
    BoundaryOpen {
        level: Option<String>,
        locator: String,
    },
    BoundaryClose,
    /// Running text
    Text(String),
    /// A single annotated word: its text plus the markup's lemma and
    /// morphology
    Annotation {
        surface: String,
        lemma: Option<String>,
        morphology: Option<String>,
    },
    /// The adapter dropped part of the document
    Skipped { reason: String },
}

/// An event and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedEvent {
    pub event: MarkupEvent,
    pub location: Location,
}

impl LocatedEvent {
    pub fn new(event: MarkupEvent, location: Location) -> Self {
        Self { event, location }
    }
}

/// Converts document content in one markup vocabulary into events.
///
/// Open and close events must balance. An adapter returns `Err` only when the
/// document cannot be read at all; recoverable problems are reported as
/// [`MarkupEvent::Skipped`] and reading continues.
pub trait SourceAdapter: Send + Sync {
    /// Short name recorded with the ingested document (`tei`, `lines`)
    fn name(&self) -> &str;

    fn events(&self, content: &str) -> Result<Vec<LocatedEvent>, AdapterError>;
}

/// Category of a non-fatal ingestion problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The adapter could not read part of the markup
    MalformedMarkup,
    /// A boundary names a level the work's schema does not have
    UnknownLevel,
    /// A locator does not fit its level
    InvalidLocator,
    /// A boundary or work appears at the wrong depth
    UnexpectedNesting,
    DuplicateCitation,
    OutOfOrderCitation,
    /// Text with no citation to attach to
    TextOutsideCitation,
    UnknownWork,
    /// The work's text already comes from another document
    WorkOwnedElsewhere,
}

/// A located, non-fatal ingestion problem. The affected structure was
/// skipped; the rest of the document was ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionDiagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: Location,
    #[serde(default)]
    pub work_id: Option<String>,
}

impl fmt::Display for IngestionDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}: {}", self.location, self.kind, self.message)
    }
}

/// Diagnostic counts kept with a document record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiagnosticSummary {
    pub total: usize,
    pub by_kind: BTreeMap<DiagnosticKind, usize>,
}

impl DiagnosticSummary {
    pub fn from_diagnostics(diagnostics: &[IngestionDiagnostic]) -> Self {
        let mut by_kind = BTreeMap::new();
        for diagnostic in diagnostics {
            *by_kind.entry(diagnostic.kind).or_insert(0) += 1;
        }
        Self {
            total: diagnostics.len(),
            by_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_at() {
        let content = "a\nbc\nd";
        assert_eq!(Location::at(content, 0).line, 1);
        assert_eq!(Location::at(content, 2).line, 2);
        assert_eq!(Location::at(content, 5).line, 3);
        assert_eq!(Location::at(content, 99).offset, content.len());
    }

    #[test]
    fn test_summary_counts_by_kind() {
        let diag = |kind| IngestionDiagnostic {
            kind,
            message: String::new(),
            location: Location::default(),
            work_id: None,
        };
        let summary = DiagnosticSummary::from_diagnostics(&[
            diag(DiagnosticKind::UnknownLevel),
            diag(DiagnosticKind::UnknownLevel),
            diag(DiagnosticKind::DuplicateCitation),
        ]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_kind[&DiagnosticKind::UnknownLevel], 2);
    }

    #[test]
    fn test_summary_serializes_kind_keys() {
        let summary = DiagnosticSummary {
            total: 1,
            by_kind: [(DiagnosticKind::UnknownWork, 1)].into_iter().collect(),
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"unknown_work\":1"));
    }
}
