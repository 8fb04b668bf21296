//! # Scriptorium Core
//!
//! Citation-addressed corpus engine for classical texts.
//!
//! Documents in scholarly markup are read into segments addressed by
//! canonical citations (`book.line`, `chapter.section`), tokenized with
//! per-language folding rules, annotated with lemmas and morphology, and
//! served by citation lookup and hybrid lexical search.
//!
//! ## Modules
//!
//! - [`citation`] - Citation schemas, paths, parsing and formatting
//! - [`text`] - Language rules, folding and tokenization
//! - [`markup`] - Source adapters (TEI XML, cited lines) and the markup ingestor
//! - [`annotation`] - Morphological annotation via inline markup and lemmatizers
//! - [`corpus`] - Works, segments, and the versioned corpus store
//! - [`storage`] - Persistence backends (in-memory, redb)
//! - [`xref`] - Lexicon and grammar cross references
//! - [`search`] - Hybrid retrieval (lemma-aware term overlap + similarity)
//! - [`engine`] - The consumer-facing [`CorpusEngine`](engine::CorpusEngine)
//! - [`config`] - Engine configuration and defaults
//! - [`error`] - Error types

pub mod annotation;
pub mod citation;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod markup;
pub mod search;
pub mod storage;
pub mod text;
pub mod xref;

pub use engine::{CorpusEngine, IngestReport, IngestStatus, SegmentView};
pub use error::CorpusError;
