use super::snapshot::{CorpusSnapshot, WorkEntry};
use super::types::{CorpusStats, Segment, SourceRecord, Work};
use crate::citation::CitationPath;
use crate::config::RuleSet;
use crate::error::StoreError;
use crate::storage::{CorpusBackend, PersistedCorpus};
use instant::Instant;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument};

/// Versioned corpus store.
///
/// Readers call [`snapshot`](Self::snapshot) and work against an immutable
/// [`CorpusSnapshot`]. Mutations are serialized by a writer lock: each one
/// validates against the current snapshot, persists through the backend, then
/// swaps in a new snapshot. A failed mutation leaves both the backend and the
/// visible snapshot untouched.
pub struct CorpusStore<B: CorpusBackend> {
    backend: B,
    rules: RuleSet,
    snapshot: RwLock<Arc<CorpusSnapshot>>,
    writer: tokio::sync::Mutex<()>,
}

impl<B: CorpusBackend> CorpusStore<B> {
    /// Opens a store over `backend`, rebuilding the in-memory view from
    /// whatever the backend holds.
    pub async fn open(backend: B, rules: RuleSet) -> Result<Self, StoreError> {
        let total_start = Instant::now();

        let persisted = backend.load().await?;
        debug!(
            "Loaded {} works, {} documents, {} segments from backend in {:?}",
            persisted.works.len(),
            persisted.documents.len(),
            persisted.segments.len(),
            total_start.elapsed()
        );

        let snapshot = build_snapshot(persisted, &rules)?;
        let stats = snapshot.stats();
        info!(
            "Opened corpus with {} works, {} segments in {:?}",
            stats.works,
            stats.segments,
            total_start.elapsed()
        );

        Ok(Self {
            backend,
            rules,
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    /// Current point-in-time view.
    pub fn snapshot(&self) -> Result<Arc<CorpusSnapshot>, StoreError> {
        self.snapshot
            .read()
            .map(|s| Arc::clone(&s))
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))
    }

    fn swap(&self, next: CorpusSnapshot) -> Result<(), StoreError> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))?;
        *guard = Arc::new(next);
        Ok(())
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Registers a work or updates its metadata.
    ///
    /// The schema cannot change once segments exist for the work.
    #[instrument(skip_all, fields(work_id = %work.id))]
    pub async fn register_work(&self, work: Work) -> Result<(), StoreError> {
        work.schema.validate().map_err(|reason| {
            StoreError::InvariantViolation(format!("work '{}': {}", work.id, reason))
        })?;

        let _guard = self.writer.lock().await;
        let current = self.snapshot()?;

        let work = Arc::new(work);
        let entry = match current.work(&work.id) {
            Some(existing) if !existing.segments.is_empty() => {
                if existing.work.schema != work.schema {
                    return Err(StoreError::SchemaConflict(work.id.clone()));
                }
                WorkEntry::new(
                    Arc::clone(&work),
                    existing.owner.clone(),
                    existing.segments.clone(),
                    &self.rules,
                )
            }
            _ => WorkEntry::empty(Arc::clone(&work)),
        };

        self.backend.put_work(&work).await?;

        let mut next = (*current).clone();
        next.works.insert(work.id.clone(), Arc::new(entry));
        self.swap(next)?;

        debug!("Registered work '{}'", work.id);
        Ok(())
    }

    /// Replaces everything previously attributed to `record.document_id` with
    /// `segments`, atomically.
    ///
    /// `segments` must be grouped by work, with ordinals dense from 0 and
    /// citation paths strictly increasing within each work. Every work must be
    /// registered and not owned by another document. `record.works` and
    /// `record.segment_count` are filled in from `segments`.
    #[instrument(skip_all, fields(document_id = %record.document_id, segments = segments.len()))]
    pub async fn upsert_document(
        &self,
        mut record: SourceRecord,
        segments: Vec<Segment>,
    ) -> Result<SourceRecord, StoreError> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot()?;

        let mut by_work: BTreeMap<String, Vec<Segment>> = BTreeMap::new();
        for segment in segments {
            if segment.document_id != record.document_id {
                return Err(StoreError::InvariantViolation(format!(
                    "segment {} {} belongs to document '{}', not '{}'",
                    segment.work_id, segment.citation, segment.document_id, record.document_id
                )));
            }
            by_work
                .entry(segment.work_id.clone())
                .or_default()
                .push(segment);
        }

        for (work_id, work_segments) in &by_work {
            let entry = current.work(work_id).ok_or_else(|| {
                StoreError::InvariantViolation(format!(
                    "segments for unregistered work '{}'",
                    work_id
                ))
            })?;
            if let Some(owner) = entry.owner.as_deref() {
                if owner != record.document_id {
                    return Err(StoreError::InvariantViolation(format!(
                        "work '{}' is owned by document '{}'",
                        work_id, owner
                    )));
                }
            }
            validate_work_segments(&entry.work, work_segments)?;
        }

        let mut cleared: BTreeSet<String> = current
            .document(&record.document_id)
            .map(|previous| previous.works.iter().cloned().collect())
            .unwrap_or_default();
        cleared.extend(by_work.keys().cloned());
        let cleared: Vec<String> = cleared.into_iter().collect();

        record.works = by_work.keys().cloned().collect();
        record.segment_count = by_work.values().map(Vec::len).sum();

        let flat: Vec<Segment> = by_work.into_values().flatten().collect();
        self.backend
            .replace_document(&record, &cleared, &flat)
            .await?;

        let mut grouped: BTreeMap<String, Vec<Arc<Segment>>> = BTreeMap::new();
        for segment in flat {
            grouped
                .entry(segment.work_id.clone())
                .or_default()
                .push(Arc::new(segment));
        }

        let mut next = (*current).clone();
        for work_id in &cleared {
            let Some(existing) = current.work(work_id) else {
                continue;
            };
            let entry = match grouped.remove(work_id) {
                Some(segments) => WorkEntry::new(
                    Arc::clone(&existing.work),
                    Some(record.document_id.clone()),
                    segments,
                    &self.rules,
                ),
                None => WorkEntry::empty(Arc::clone(&existing.work)),
            };
            next.works.insert(work_id.clone(), Arc::new(entry));
        }
        next.documents
            .insert(record.document_id.clone(), record.clone());
        self.swap(next)?;

        info!(
            "Stored document '{}' with {} segments across {} works",
            record.document_id,
            record.segment_count,
            record.works.len()
        );
        Ok(record)
    }

    /// Removes a document and every segment it contributed. Returns the
    /// removed record, or `None` if the document was never ingested.
    #[instrument(skip_all, fields(document_id = %document_id))]
    pub async fn retract_document(
        &self,
        document_id: &str,
    ) -> Result<Option<SourceRecord>, StoreError> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot()?;

        let Some(record) = current.document(document_id).cloned() else {
            return Ok(None);
        };

        self.backend
            .retract_document(document_id, &record.works)
            .await?;

        let mut next = (*current).clone();
        next.documents.remove(document_id);
        for work_id in &record.works {
            if let Some(existing) = current.work(work_id) {
                next.works.insert(
                    work_id.clone(),
                    Arc::new(WorkEntry::empty(Arc::clone(&existing.work))),
                );
            }
        }
        self.swap(next)?;

        info!(
            "Retracted document '{}' ({} segments)",
            document_id, record.segment_count
        );
        Ok(Some(record))
    }

    /// Segment at `path`, or `None` when nothing was ingested there.
    pub fn get_segment(
        &self,
        work_id: &str,
        path: &CitationPath,
    ) -> Result<Option<Arc<Segment>>, StoreError> {
        Ok(self.snapshot()?.get_segment(work_id, path))
    }

    /// All segments of a work in ordinal order.
    pub fn iterate_work(&self, work_id: &str) -> Result<Vec<Arc<Segment>>, StoreError> {
        self.snapshot()?
            .iterate_work(work_id)
            .map(<[Arc<Segment>]>::to_vec)
            .ok_or_else(|| StoreError::NotFound(format!("work '{}'", work_id)))
    }

    pub fn document(&self, document_id: &str) -> Result<Option<SourceRecord>, StoreError> {
        Ok(self.snapshot()?.document(document_id).cloned())
    }

    pub fn stats(&self) -> Result<CorpusStats, StoreError> {
        Ok(self.snapshot()?.stats())
    }
}

/// Checks ordinal density, path order and schema fit for one work's
/// segments.
fn validate_work_segments(work: &Work, segments: &[Segment]) -> Result<(), StoreError> {
    for (index, segment) in segments.iter().enumerate() {
        if segment.ordinal != index as u64 {
            return Err(StoreError::InvariantViolation(format!(
                "work '{}': segment {} has ordinal {}, expected {}",
                work.id, segment.citation, segment.ordinal, index
            )));
        }
        work.schema
            .validate_path(&segment.path)
            .map_err(|e| StoreError::InvariantViolation(format!("work '{}': {}", work.id, e)))?;
        if segment.citation != work.schema.format(&segment.path) {
            return Err(StoreError::InvariantViolation(format!(
                "work '{}': citation '{}' does not match its path",
                work.id, segment.citation
            )));
        }
        if segment.reconstruct() != segment.text {
            return Err(StoreError::InvariantViolation(format!(
                "work '{}': tokens of {} do not reconstruct its text",
                work.id, segment.citation
            )));
        }
        if index > 0 {
            let previous = &segments[index - 1];
            if previous.path == segment.path {
                return Err(StoreError::InvariantViolation(format!(
                    "work '{}': duplicate citation {}",
                    work.id, segment.citation
                )));
            }
            if previous.path > segment.path {
                return Err(StoreError::InvariantViolation(format!(
                    "work '{}': citation {} follows {}",
                    work.id, segment.citation, previous.citation
                )));
            }
        }
    }
    Ok(())
}

fn build_snapshot(
    persisted: PersistedCorpus,
    rules: &RuleSet,
) -> Result<CorpusSnapshot, StoreError> {
    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    for record in &persisted.documents {
        for work_id in &record.works {
            if let Some(other) = owners.insert(work_id.clone(), record.document_id.clone()) {
                return Err(StoreError::InvariantViolation(format!(
                    "work '{}' claimed by documents '{}' and '{}'",
                    work_id, other, record.document_id
                )));
            }
        }
    }

    let mut grouped: BTreeMap<String, Vec<Segment>> = BTreeMap::new();
    for segment in persisted.segments {
        grouped
            .entry(segment.work_id.clone())
            .or_default()
            .push(segment);
    }

    let mut snapshot = CorpusSnapshot::default();
    for work in persisted.works {
        let segments = grouped.remove(&work.id).unwrap_or_default();
        validate_work_segments(&work, &segments)?;
        let owner = owners.get(&work.id).cloned();
        let entry = WorkEntry::new(
            Arc::new(work),
            owner,
            segments.into_iter().map(Arc::new).collect(),
            rules,
        );
        snapshot
            .works
            .insert(entry.work.id.clone(), Arc::new(entry));
    }

    if let Some(orphan) = grouped.keys().next() {
        return Err(StoreError::InvariantViolation(format!(
            "persisted segments for unregistered work '{}'",
            orphan
        )));
    }

    snapshot.documents = persisted
        .documents
        .into_iter()
        .map(|r| (r.document_id.clone(), r))
        .collect();
    Ok(snapshot)
}
