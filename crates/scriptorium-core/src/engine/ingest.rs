//! Document ingestion and retraction.
//!
//! A document is identified by a caller-chosen id (a path, a URN). Its
//! content hash is recorded, so re-ingesting identical content is a no-op and
//! changed content replaces everything the document contributed before.

use super::CorpusEngine;
use crate::annotation::AnnotationStats;
use crate::corpus::{compute_content_hash, SourceRecord};
use crate::error::CorpusError;
use crate::markup::{DiagnosticSummary, IngestionDiagnostic, MarkupIngestor, SourceAdapter};
use crate::storage::CorpusBackend;
use crate::text::Language;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// What an ingest did to the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// First ingest of this document id
    Created,
    /// Content changed; previous segments were replaced
    Replaced,
    /// Content hash matched the stored record; nothing was written
    Unchanged,
}

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub status: IngestStatus,
    /// Segments now stored for the document
    pub segments: usize,
    /// Works the document contributes text to
    pub works: Vec<String>,
    pub annotation: AnnotationStats,
    /// Problems that were skipped; empty for an unchanged document
    pub diagnostics: Vec<IngestionDiagnostic>,
}

/// Marks a document id as in flight until dropped.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<String, ()>,
    document_id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a DashMap<String, ()>, document_id: &str) -> Result<Self, CorpusError> {
        match in_flight.entry(document_id.to_string()) {
            Entry::Occupied(_) => {
                warn!("Rejected concurrent operation on document '{}'", document_id);
                Err(CorpusError::ConcurrentIngestConflict(
                    document_id.to_string(),
                ))
            }
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(Self {
                    in_flight,
                    document_id: document_id.to_string(),
                })
            }
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.document_id);
    }
}

impl<B: CorpusBackend> CorpusEngine<B> {
    /// Reads `content` with `adapter` and stores the resulting segments as
    /// the new contents of `document_id`.
    ///
    /// Non-fatal problems are returned as diagnostics in the report. Fails
    /// only when the adapter cannot read the content at all, the store rejects
    /// the result, or the same document is already being ingested or retracted.
    #[instrument(skip_all, fields(document_id = %document_id, adapter = adapter.name()))]
    pub async fn ingest(
        &self,
        document_id: &str,
        content: &str,
        adapter: &dyn SourceAdapter,
    ) -> Result<IngestReport, CorpusError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, document_id)?;
        let start = instant::Instant::now();

        let content_hash = compute_content_hash(content);
        let snapshot = self.store.snapshot()?;
        let previous = snapshot.document(document_id).cloned();

        if let Some(previous) = &previous {
            if !previous.needs_update(&content_hash) {
                debug!("Document '{}' unchanged, skipping", document_id);
                return Ok(IngestReport {
                    document_id: document_id.to_string(),
                    status: IngestStatus::Unchanged,
                    segments: previous.segment_count,
                    works: previous.works.clone(),
                    annotation: AnnotationStats::default(),
                    diagnostics: Vec::new(),
                });
            }
        }

        let events = adapter.events(content)?;
        let event_count = events.len();
        let mut outcome =
            MarkupIngestor::new(&snapshot, self.store.rules()).ingest(document_id, events);

        let annotation = self
            .annotator
            .annotate_all(&mut outcome.segments, |segment| {
                snapshot
                    .work(&segment.work_id)
                    .map(|entry| entry.work.language)
                    .unwrap_or(Language::Generic)
            })
            .await;

        let mut record = SourceRecord::new(document_id, content_hash, adapter.name());
        record.diagnostics = DiagnosticSummary::from_diagnostics(&outcome.diagnostics);
        let record = self
            .store
            .upsert_document(record, outcome.segments)
            .await?;

        let status = if previous.is_some() {
            IngestStatus::Replaced
        } else {
            IngestStatus::Created
        };

        info!(
            "Ingested '{}' ({:?}): {} events, {} segments, {} diagnostics, {} tokens annotated, {} unresolved in {:?}",
            document_id,
            status,
            event_count,
            record.segment_count,
            outcome.diagnostics.len(),
            annotation.annotated(),
            annotation.unresolved,
            start.elapsed()
        );

        Ok(IngestReport {
            document_id: document_id.to_string(),
            status,
            segments: record.segment_count,
            works: record.works,
            annotation,
            diagnostics: outcome.diagnostics,
        })
    }

    /// Removes a document and all of its segments. Returns the removed
    /// record, `None` if the document was never ingested.
    pub async fn retract(&self, document_id: &str) -> Result<Option<SourceRecord>, CorpusError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, document_id)?;
        Ok(self.store.retract_document(document_id).await?)
    }

    /// True while an ingest or retract of `document_id` is running.
    pub fn is_in_flight(&self, document_id: &str) -> bool {
        self.in_flight.contains_key(document_id)
    }
}
