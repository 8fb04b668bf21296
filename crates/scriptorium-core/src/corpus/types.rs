use crate::citation::{CitationPath, CitationSchema};
use crate::markup::DiagnosticSummary;
use crate::text::{self, Language, Token};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Returns the current Unix timestamp (seconds since UNIX_EPOCH).
///
/// Returns 0 if the system clock is before the epoch.
pub fn get_current_timestamp() -> u64 {
    instant::SystemTime::now()
        .duration_since(instant::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// SHA-256 of document content, lowercase hex.
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// A citable text (e.g. the Iliad) and the schema its citations follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub title: String,
    pub language: Language,
    pub schema: CitationSchema,
}

impl Work {
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        title: impl Into<String>,
        language: Language,
        schema: CitationSchema,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            title: title.into(),
            language,
            schema,
        }
    }
}

/// Identity of a segment inside the store: work plus ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentKey {
    pub work_id: String,
    pub ordinal: u64,
}

/// Smallest addressable unit of text.
///
/// Within a work, `(work_id, path)` is unique and `path` strictly increases
/// with `ordinal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub work_id: String,
    pub path: CitationPath,
    /// `path` formatted under the work's schema
    pub citation: String,
    /// Position within the work, dense from 0
    pub ordinal: u64,
    pub text: String,
    pub tokens: Vec<Token>,
    /// Document the segment was ingested from
    pub document_id: String,
}

impl Segment {
    pub fn key(&self) -> SegmentKey {
        SegmentKey {
            work_id: self.work_id.clone(),
            ordinal: self.ordinal,
        }
    }

    /// Text rebuilt from tokens; equal to `text` for every stored segment.
    pub fn reconstruct(&self) -> String {
        text::reconstruct(&self.tokens)
    }

    pub fn word_count(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_word()).count()
    }
}

/// Source tracking record for an ingested document.
///
/// The content hash decides whether a re-ingest is a no-op; `works` lists the
/// works whose segments this document owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Schema version for future evolution
    pub version: u32,
    pub document_id: String,
    /// SHA-256 hash of the document content
    pub content_hash: String,
    /// Adapter that read the document
    pub adapter: String,
    /// Unix timestamp of the ingest
    pub ingested_at: u64,
    pub works: Vec<String>,
    pub segment_count: usize,
    pub diagnostics: DiagnosticSummary,
}

impl SourceRecord {
    /// Current schema version for SourceRecord
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(
        document_id: impl Into<String>,
        content_hash: impl Into<String>,
        adapter: impl Into<String>,
    ) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            document_id: document_id.into(),
            content_hash: content_hash.into(),
            adapter: adapter.into(),
            ingested_at: get_current_timestamp(),
            works: Vec::new(),
            segment_count: 0,
            diagnostics: DiagnosticSummary::default(),
        }
    }

    /// True when `content_hash` differs from the stored hash.
    pub fn needs_update(&self, content_hash: &str) -> bool {
        self.content_hash != content_hash
    }
}

/// Counts describing the current corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CorpusStats {
    pub works: usize,
    pub documents: usize,
    pub segments: usize,
    pub tokens: usize,
}
