//! Persistence backends for the corpus store.
//!
//! The [`CorpusBackend`] trait abstracts over where works, document records
//! and segments live:
//!
//! - [`InMemoryBackend`]: maps behind a lock, for tests and ephemeral use
//! - [`RedbBackend`]: embedded redb database (feature `redb-store`)
//!
//! Backends only persist. Validation and ownership rules live in
//! [`CorpusStore`](crate::corpus::CorpusStore), which reads everything back
//! with [`load`](CorpusBackend::load) on open.

#[cfg(feature = "redb-store")]
mod redb_store;

#[cfg(feature = "redb-store")]
pub use redb_store::RedbBackend;

use crate::corpus::{Segment, SourceRecord, Work};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Version of the persisted layout. Bumped on incompatible changes.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Full persisted state, as read back on open.
#[derive(Debug, Clone, Default)]
pub struct PersistedCorpus {
    pub works: Vec<Work>,
    pub documents: Vec<SourceRecord>,
    /// Grouped by work, ordinal order within each work
    pub segments: Vec<Segment>,
}

/// Durable storage for works, document records and segments.
///
/// # Atomicity
///
/// [`replace_document`](Self::replace_document) and
/// [`retract_document`](Self::retract_document) either apply completely or
/// not at all.
#[async_trait]
pub trait CorpusBackend: Send + Sync {
    /// Reads the whole persisted corpus.
    async fn load(&self) -> Result<PersistedCorpus, StoreError>;

    /// Stores or updates a work.
    async fn put_work(&self, work: &Work) -> Result<(), StoreError>;

    /// Stores `record` and `segments`, first dropping every segment of the
    /// works in `cleared_works`.
    async fn replace_document(
        &self,
        record: &SourceRecord,
        cleared_works: &[String],
        segments: &[Segment],
    ) -> Result<(), StoreError>;

    /// Removes a document record and every segment of `cleared_works`.
    async fn retract_document(
        &self,
        document_id: &str,
        cleared_works: &[String],
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: CorpusBackend + ?Sized> CorpusBackend for Arc<T> {
    async fn load(&self) -> Result<PersistedCorpus, StoreError> {
        (**self).load().await
    }

    async fn put_work(&self, work: &Work) -> Result<(), StoreError> {
        (**self).put_work(work).await
    }

    async fn replace_document(
        &self,
        record: &SourceRecord,
        cleared_works: &[String],
        segments: &[Segment],
    ) -> Result<(), StoreError> {
        (**self)
            .replace_document(record, cleared_works, segments)
            .await
    }

    async fn retract_document(
        &self,
        document_id: &str,
        cleared_works: &[String],
    ) -> Result<(), StoreError> {
        (**self).retract_document(document_id, cleared_works).await
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    works: BTreeMap<String, Work>,
    documents: BTreeMap<String, SourceRecord>,
    segments: BTreeMap<(String, u64), Segment>,
}

/// In-memory backend.
///
/// Nothing survives the process. Useful for tests and for corpora rebuilt
/// from source files on every start.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<MemoryState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.state
            .write()
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.state
            .read()
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))
    }
}

fn clear_works(state: &mut MemoryState, works: &[String]) {
    state.segments.retain(|(work_id, _), _| !works.contains(work_id));
}

#[async_trait]
impl CorpusBackend for InMemoryBackend {
    async fn load(&self) -> Result<PersistedCorpus, StoreError> {
        let state = self.read()?;
        Ok(PersistedCorpus {
            works: state.works.values().cloned().collect(),
            documents: state.documents.values().cloned().collect(),
            segments: state.segments.values().cloned().collect(),
        })
    }

    async fn put_work(&self, work: &Work) -> Result<(), StoreError> {
        self.write()?.works.insert(work.id.clone(), work.clone());
        Ok(())
    }

    async fn replace_document(
        &self,
        record: &SourceRecord,
        cleared_works: &[String],
        segments: &[Segment],
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        clear_works(&mut state, cleared_works);
        for segment in segments {
            state.segments.insert(
                (segment.work_id.clone(), segment.ordinal),
                segment.clone(),
            );
        }
        state
            .documents
            .insert(record.document_id.clone(), record.clone());
        Ok(())
    }

    async fn retract_document(
        &self,
        document_id: &str,
        cleared_works: &[String],
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        clear_works(&mut state, cleared_works);
        state.documents.remove(document_id);
        Ok(())
    }
}
