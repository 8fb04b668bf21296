use super::types::{CorpusStats, Segment, SourceRecord, Work};
use crate::citation::CitationPath;
use crate::config::RuleSet;
use crate::search::keyword::TermIndex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Everything the store knows about one work.
#[derive(Debug, Clone)]
pub struct WorkEntry {
    pub work: Arc<Work>,
    /// Document whose segments make up the work, if any
    pub owner: Option<String>,
    /// Segments in ordinal order; `segments[i].ordinal == i`
    pub segments: Vec<Arc<Segment>>,
    by_path: HashMap<CitationPath, usize>,
    pub terms: TermIndex,
}

impl WorkEntry {
    pub fn new(
        work: Arc<Work>,
        owner: Option<String>,
        segments: Vec<Arc<Segment>>,
        rules: &RuleSet,
    ) -> Self {
        let by_path = segments
            .iter()
            .enumerate()
            .map(|(i, s)| (s.path.clone(), i))
            .collect();
        let terms = TermIndex::build(&segments, rules.get(work.language));
        Self {
            work,
            owner,
            segments,
            by_path,
            terms,
        }
    }

    /// Registered work with no text yet.
    pub fn empty(work: Arc<Work>) -> Self {
        Self {
            work,
            owner: None,
            segments: Vec::new(),
            by_path: HashMap::new(),
            terms: TermIndex::default(),
        }
    }

    pub fn segment(&self, path: &CitationPath) -> Option<&Arc<Segment>> {
        self.by_path.get(path).and_then(|i| self.segments.get(*i))
    }
}

/// Immutable point-in-time view of the corpus.
///
/// Readers hold an `Arc<CorpusSnapshot>` for as long as they need a
/// consistent view; writers build a new snapshot and swap it in.
#[derive(Debug, Clone, Default)]
pub struct CorpusSnapshot {
    pub(crate) works: BTreeMap<String, Arc<WorkEntry>>,
    pub(crate) documents: BTreeMap<String, SourceRecord>,
}

impl CorpusSnapshot {
    pub fn work(&self, work_id: &str) -> Option<&Arc<WorkEntry>> {
        self.works.get(work_id)
    }

    /// Works in id order.
    pub fn works(&self) -> impl Iterator<Item = &Arc<WorkEntry>> {
        self.works.values()
    }

    pub fn document(&self, document_id: &str) -> Option<&SourceRecord> {
        self.documents.get(document_id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &SourceRecord> {
        self.documents.values()
    }

    pub fn get_segment(&self, work_id: &str, path: &CitationPath) -> Option<Arc<Segment>> {
        self.works
            .get(work_id)
            .and_then(|entry| entry.segment(path))
            .cloned()
    }

    /// Segments of a work in ordinal order, `None` for an unknown work.
    pub fn iterate_work(&self, work_id: &str) -> Option<&[Arc<Segment>]> {
        self.works.get(work_id).map(|e| e.segments.as_slice())
    }

    pub fn stats(&self) -> CorpusStats {
        let mut stats = CorpusStats {
            works: self.works.len(),
            documents: self.documents.len(),
            ..Default::default()
        };
        for entry in self.works.values() {
            stats.segments += entry.segments.len();
            stats.tokens += entry.segments.iter().map(|s| s.tokens.len()).sum::<usize>();
        }
        stats
    }
}
