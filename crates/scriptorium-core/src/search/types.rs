use crate::corpus::{Segment, SegmentKey};
use crate::text::Language;
use crate::xref::TokenCrossReferences;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A search request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Only search works in this language
    #[serde(default)]
    pub language: Option<Language>,
    /// Maximum number of hits; `None` returns every candidate
    #[serde(default)]
    pub limit: Option<usize>,
    /// Only search this work
    #[serde(default)]
    pub work_id: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn in_work(mut self, work_id: impl Into<String>) -> Self {
        self.work_id = Some(work_id.into());
        self
    }
}

/// How a token matched a query term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Surface,
    Lemma,
    /// Both the folded surface and the lemma equal a query term
    Both,
}

/// A matched token within a hit's segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpan {
    pub token_index: usize,
    /// Byte range in the segment text
    pub start: usize,
    pub end: usize,
    pub matched_by: MatchKind,
}

/// One ranked segment.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub segment: Arc<Segment>,
    /// Final blended score in `[0, 1]`
    pub score: f32,
    /// Weighted term overlap in `[0, 1]`
    pub lexical_score: f32,
    /// External similarity in `[0, 1]`, if one was obtained
    pub similarity: Option<f32>,
    /// Query terms matched by a token's folded surface form
    pub surface_matches: usize,
    /// Query terms matched by a token's lemma
    pub lemma_matches: usize,
    pub spans: Vec<MatchSpan>,
    /// Lexicon and grammar references for matched tokens
    pub cross_refs: Vec<TokenCrossReferences>,
}

impl SearchHit {
    pub fn key(&self) -> SegmentKey {
        self.segment.key()
    }
}

/// Ranked hits for a query.
#[derive(Debug, Clone, Default)]
pub struct RankedResult {
    pub hits: Vec<SearchHit>,
    /// Candidates before the limit was applied
    pub total_candidates: usize,
    /// Folded query terms that took part in matching
    pub terms: Vec<String>,
}

impl RankedResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}
