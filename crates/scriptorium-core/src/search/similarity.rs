//! Optional external similarity signal.
//!
//! A [`SimilarityProvider`] scores how close a segment is to a query in
//! `[0, 1]`. The retrieval engine bounds every call with a timeout and treats
//! failures as "no signal", so a slow or broken provider never fails a
//! search.
//!
//! [`VectorSimilarity`] is a ready-made provider over precomputed segment
//! vectors and a [`QueryEmbedder`] for the query side.

use crate::corpus::{Segment, SegmentKey};
use crate::error::UpstreamError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Scores a segment against a query.
#[async_trait]
pub trait SimilarityProvider: Send + Sync {
    /// Similarity in `[0, 1]`, or `None` when the provider has no opinion on
    /// this segment.
    async fn similarity(&self, query: &str, segment: &Segment)
        -> Result<Option<f32>, UpstreamError>;
}

#[async_trait]
impl<T: SimilarityProvider + ?Sized> SimilarityProvider for Arc<T> {
    async fn similarity(
        &self,
        query: &str,
        segment: &Segment,
    ) -> Result<Option<f32>, UpstreamError> {
        (**self).similarity(query, segment).await
    }
}

/// Turns query text into a vector comparable with segment vectors.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;
}

/// Cosine similarity mapped from `[-1, 1]` to `[0, 1]`.
///
/// `None` for mismatched dimensions or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return None;
    }
    let cosine = (dot / (mag_a * mag_b)).clamp(-1.0, 1.0);
    Some((cosine + 1.0) / 2.0)
}

/// Similarity over precomputed segment vectors.
///
/// The most recent query embedding is cached, so one search embeds its query
/// once no matter how many candidates it scores.
pub struct VectorSimilarity<E: QueryEmbedder> {
    embedder: E,
    vectors: DashMap<SegmentKey, Vec<f32>>,
    last_query: Mutex<Option<(String, Arc<Vec<f32>>)>>,
}

impl<E: QueryEmbedder> VectorSimilarity<E> {
    pub fn new(embedder: E) -> Self {
        Self {
            embedder,
            vectors: DashMap::new(),
            last_query: Mutex::new(None),
        }
    }

    /// Sets the vector for a segment, replacing any previous one.
    pub fn insert(&self, key: SegmentKey, vector: Vec<f32>) {
        self.vectors.insert(key, vector);
    }

    /// Drops every vector of a work (after a retract or re-ingest).
    pub fn remove_work(&self, work_id: &str) {
        self.vectors.retain(|key, _| key.work_id != work_id);
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    async fn query_vector(&self, query: &str) -> Result<Arc<Vec<f32>>, UpstreamError> {
        let mut cached = self.last_query.lock().await;
        if let Some((text, vector)) = cached.as_ref() {
            if text == query {
                return Ok(vector.clone());
            }
        }
        let vector = Arc::new(self.embedder.embed(query).await?);
        *cached = Some((query.to_string(), vector.clone()));
        Ok(vector)
    }
}

#[async_trait]
impl<E: QueryEmbedder> SimilarityProvider for VectorSimilarity<E> {
    async fn similarity(
        &self,
        query: &str,
        segment: &Segment,
    ) -> Result<Option<f32>, UpstreamError> {
        let key = segment.key();
        if !self.vectors.contains_key(&key) {
            return Ok(None);
        }
        let query_vector = self.query_vector(query).await?;
        let score = self
            .vectors
            .get(&key)
            .and_then(|v| cosine_similarity(&query_vector, v.value()));
        if score.is_none() {
            debug!(
                "No comparable vector for {}:{} (query dim {})",
                segment.work_id,
                segment.ordinal,
                query_vector.len()
            );
        }
        Ok(score)
    }
}
