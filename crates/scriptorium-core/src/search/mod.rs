//! Hybrid retrieval over the corpus.
//!
//! Ranking combines:
//! - **Lexical overlap**: exact matches of folded query terms against token
//!   surface forms and lemmas, lemma matches weighted higher
//! - **Similarity** (optional): an external [`SimilarityProvider`] score in
//!   `[0, 1]` with a minority weight
//!
//! # Architecture
//!
//! - `types`: Query and result types (Query, SearchHit, RankedResult)
//! - `engine`: HybridRetrievalEngine orchestrating candidates, scoring and ranking
//! - `keyword`: per-work term postings for surface forms and lemmas
//! - `fusion`: score blending and ranking order
//! - `similarity`: SimilarityProvider trait and the vector-backed provider
//!
//! # Usage
//!
//! ```ignore
//! use scriptorium_core::search::{HybridRetrievalEngine, Query};
//!
//! let engine = HybridRetrievalEngine::new(weights, None, timeout, resolver);
//! let snapshot = store.snapshot()?;
//! let result = engine
//!     .search(&snapshot, store.rules(), &Query::new("μῆνιν").with_limit(10))
//!     .await;
//! for hit in &result.hits {
//!     println!("{} {} {:.3}", hit.segment.work_id, hit.segment.citation, hit.score);
//! }
//! ```
//!
//! # Algorithm Details
//!
//! - Query text is tokenized and folded with the rules of each candidate
//!   work's language; stopwords are dropped. A query with no remaining terms
//!   returns nothing.
//! - Candidates are segments with at least one word token whose folded
//!   surface form or folded lemma equals a query term.
//! - Scores are blended as described in [`fusion`]; ties are broken by work id
//!   then ordinal so identical inputs always rank identically.

mod engine;
#[doc(hidden)]
pub mod fusion;
#[doc(hidden)]
pub mod keyword;
pub mod similarity;
pub mod types;

pub use engine::{query_terms, HybridRetrievalEngine};
pub use similarity::{cosine_similarity, QueryEmbedder, SimilarityProvider, VectorSimilarity};
pub use types::{MatchKind, MatchSpan, Query, RankedResult, SearchHit};
