//! Consumer-facing façade over the corpus.
//!
//! [`CorpusEngine`] wires the components together:
//!
//! - **Ingest**: source adapter → markup ingestor → morphological annotator →
//!   corpus store (document replace)
//! - **Read**: citation lookup with cross references, hybrid search
//!
//! # Concurrency
//!
//! Reads work on a point-in-time snapshot and never wait for writers.
//! Distinct documents may be ingested concurrently; a second ingest or
//! retract of a document that is already in flight fails fast with
//! [`CorpusError::ConcurrentIngestConflict`].
//!
//! # Usage
//!
//! ```ignore
//! use scriptorium_core::engine::CorpusEngine;
//! use scriptorium_core::markup::TeiAdapter;
//! use scriptorium_core::storage::InMemoryBackend;
//!
//! let engine = CorpusEngine::open(InMemoryBackend::new(), EngineConfig::default()).await?;
//! engine.register_work(work).await?;
//! let report = engine.ingest("iliad.xml", &content, &TeiAdapter::new()).await?;
//! let view = engine.get_segment("tlg0012.tlg001", "1.1")?;
//! let results = engine.search(&Query::new("μῆνιν")).await?;
//! ```

mod ingest;


pub use ingest::{IngestReport, IngestStatus};

use crate::annotation::{Lemmatizer, MorphologicalAnnotator};
use crate::config::{EngineConfig, RuleSet};
use crate::corpus::{CorpusStats, CorpusStore, Segment, SourceRecord, Work};
use crate::error::CorpusError;
use crate::search::{HybridRetrievalEngine, Query, RankedResult, SimilarityProvider};
use crate::storage::CorpusBackend;
use crate::xref::{CrossReferenceResolver, TokenCrossReferences};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A segment with cross references for its annotated tokens.
#[derive(Debug, Clone)]
pub struct SegmentView {
    pub segment: Arc<Segment>,
    pub cross_refs: Vec<TokenCrossReferences>,
}

/// The corpus engine.
pub struct CorpusEngine<B: CorpusBackend> {
    config: EngineConfig,
    store: CorpusStore<B>,
    annotator: MorphologicalAnnotator,
    xref: Arc<CrossReferenceResolver>,
    similarity: Option<Arc<dyn SimilarityProvider>>,
    retrieval: HybridRetrievalEngine,
    /// Document ids with an ingest or retract in progress
    in_flight: DashMap<String, ()>,
}

impl<B: CorpusBackend> CorpusEngine<B> {
    /// Opens an engine over `backend` with no lemmatizer, no similarity
    /// provider and empty reference tables.
    ///
    /// Fails if `config` is invalid or the backend cannot be loaded.
    pub async fn open(backend: B, config: EngineConfig) -> Result<Self, CorpusError> {
        config.validate()?;
        let rules = RuleSet::from_config(&config);
        let store = CorpusStore::open(backend, rules).await?;
        let xref = Arc::new(CrossReferenceResolver::default());
        let retrieval = HybridRetrievalEngine::new(
            config.fusion,
            None,
            config.similarity_timeout(),
            Arc::clone(&xref),
        );
        Ok(Self {
            annotator: MorphologicalAnnotator::new(None, config.lemmatizer_timeout()),
            config,
            store,
            xref,
            similarity: None,
            retrieval,
            in_flight: DashMap::new(),
        })
    }

    /// Uses `lemmatizer` for tokens without inline annotations.
    pub fn with_lemmatizer(mut self, lemmatizer: Arc<dyn Lemmatizer>) -> Self {
        self.annotator =
            MorphologicalAnnotator::new(Some(lemmatizer), self.config.lemmatizer_timeout());
        self
    }

    /// Blends `provider` scores into search ranking.
    pub fn with_similarity(mut self, provider: Arc<dyn SimilarityProvider>) -> Self {
        self.similarity = Some(provider);
        self.rebuild_retrieval();
        self
    }

    /// Resolves lexicon and grammar references with `resolver`.
    pub fn with_cross_references(mut self, resolver: CrossReferenceResolver) -> Self {
        self.xref = Arc::new(resolver);
        self.rebuild_retrieval();
        self
    }

    fn rebuild_retrieval(&mut self) {
        self.retrieval = HybridRetrievalEngine::new(
            self.config.fusion,
            self.similarity.clone(),
            self.config.similarity_timeout(),
            Arc::clone(&self.xref),
        );
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &CorpusStore<B> {
        &self.store
    }

    pub fn cross_references(&self) -> &CrossReferenceResolver {
        &self.xref
    }

    /// Registers a work or updates its title and author.
    ///
    /// The citation schema must have at least one level, and cannot change
    /// once segments exist for the work.
    pub async fn register_work(&self, work: Work) -> Result<(), CorpusError> {
        work.schema
            .validate()
            .map_err(|reason| CorpusError::InvalidSchema {
                work_id: work.id.clone(),
                reason,
            })?;
        self.store.register_work(work).await?;
        Ok(())
    }

    /// Registered works in id order.
    pub fn works(&self) -> Result<Vec<Work>, CorpusError> {
        Ok(self
            .store
            .snapshot()?
            .works()
            .map(|entry| (*entry.work).clone())
            .collect())
    }

    /// Segment addressed by `citation` in `work_id`.
    ///
    /// Returns `Ok(None)` for an unknown work or a well-formed citation with no
    /// text. A citation that does not fit the work's schema is an error.
    #[instrument(skip_all, fields(work_id = %work_id, citation = %citation))]
    pub fn get_segment(
        &self,
        work_id: &str,
        citation: &str,
    ) -> Result<Option<SegmentView>, CorpusError> {
        let snapshot = self.store.snapshot()?;
        let Some(entry) = snapshot.work(work_id) else {
            debug!("Lookup in unknown work '{}'", work_id);
            return Ok(None);
        };
        let path = entry.work.schema.parse(citation)?;
        Ok(entry.segment(&path).map(|segment| SegmentView {
            cross_refs: self.xref.resolve_segment(segment),
            segment: Arc::clone(segment),
        }))
    }

    /// Every segment of a work in citation order.
    pub fn iterate_work(&self, work_id: &str) -> Result<Vec<Arc<Segment>>, CorpusError> {
        self.store
            .snapshot()?
            .iterate_work(work_id)
            .map(<[Arc<Segment>]>::to_vec)
            .ok_or_else(|| CorpusError::UnknownWork(work_id.to_string()))
    }

    /// Ranked segments for `query`.
    pub async fn search(&self, query: &Query) -> Result<RankedResult, CorpusError> {
        let snapshot = self.store.snapshot()?;
        Ok(self
            .retrieval
            .search(&snapshot, self.store.rules(), query)
            .await)
    }

    /// Record of an ingested document.
    pub fn document(&self, document_id: &str) -> Result<Option<SourceRecord>, CorpusError> {
        Ok(self.store.document(document_id)?)
    }

    pub fn stats(&self) -> Result<CorpusStats, CorpusError> {
        Ok(self.store.stats()?)
    }
}
