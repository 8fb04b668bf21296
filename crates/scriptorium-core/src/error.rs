//! Error types for scriptorium-core.
//!
//! Each concern has its own error enum. The consumer-facing façade
//! ([`CorpusEngine`](crate::engine::CorpusEngine)) folds them into
//! [`CorpusError`]. Non-fatal ingestion problems are not errors at all: they
//! are collected as [`IngestionDiagnostic`](crate::markup::IngestionDiagnostic)s.

use std::time::Duration;
use thiserror::Error;

/// A citation string does not fit a work's schema.
///
/// Always surfaced to the caller, never coerced into a nearby valid path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed citation '{citation}': {reason}")]
pub struct CitationError {
    /// The offending citation string (or formatted path)
    pub citation: String,
    /// Human-readable explanation
    pub reason: String,
}

impl CitationError {
    pub fn new(citation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            citation: citation.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the corpus store and its persistence backends.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Key / work / document not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// Database error (redb, lock poisoning)
    #[error("Database error: {0}")]
    DatabaseError(String),
    /// A mutation would break a store invariant (duplicate citation path,
    /// out-of-order ordinals, foreign work ownership). The mutation is aborted.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// A work's schema cannot change once segments exist for it
    #[error("Schema conflict for work '{0}': segments already exist under a different schema")]
    SchemaConflict(String),
    /// Persisted data was written by an incompatible format version
    #[error("Incompatible store format: {0}")]
    Incompatible(String),
}

/// Failure of an external collaborator (lemmatizer, similarity provider).
///
/// Never fails an ingest or a search: the affected token or candidate is
/// treated as unresolved and the event is logged.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// The call did not finish within the configured bound
    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),
    /// The provider reported a failure
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
}

/// Fatal failure of a source adapter (the document could not be read at all).
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Content is not in the format the adapter expects
    #[error("Unsupported content: {0}")]
    Unsupported(String),
}

/// Invalid engine configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid fusion weight '{name}': {value} ({reason})")]
    InvalidWeight {
        name: &'static str,
        value: f32,
        reason: &'static str,
    },
    #[error("Invalid timeout '{0}': must be greater than zero")]
    InvalidTimeout(&'static str),
}

/// Errors surfaced by the consumer-facing operations.
#[derive(Debug, Clone, Error)]
pub enum CorpusError {
    /// Citation does not fit the work's schema
    #[error(transparent)]
    MalformedCitation(#[from] CitationError),
    /// Another ingest or retract of the same document is in flight; retry later
    #[error("Concurrent ingest conflict for document '{0}'")]
    ConcurrentIngestConflict(String),
    /// The work referenced by an operation is not registered
    #[error("Unknown work: {0}")]
    UnknownWork(String),
    /// A work registration carries an unusable citation schema
    #[error("Invalid citation schema for work '{work_id}': {reason}")]
    InvalidSchema { work_id: String, reason: String },
    /// Store failure (including invariant violations)
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Source adapter could not read the document
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    /// Engine configuration rejected at construction
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(err.to_string())
    }
}
