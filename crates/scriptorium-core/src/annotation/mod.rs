//! Morphological annotation of ingested segments.
//!
//! A token's lemma and morphology come from, in order of authority:
//!
//! 1. Inline markup (`<w lemma="…" ana="…">`), attached by the ingestor and
//!    never overridden here. A token with inline morphology but no inline
//!    lemma still gets its lemma from the lemmatizer.
//! 2. An external [`Lemmatizer`], called once per distinct surface form and
//!    bounded by a timeout.
//!
//! Tokens neither source resolves keep `lemma = None`.

mod table;

pub use table::TableLemmatizer;

use crate::corpus::Segment;
use crate::error::UpstreamError;
use crate::text::{AnnotationSource, Language};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A lemmatizer's answer for one surface form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LemmaAnalysis {
    pub lemma: String,
    #[serde(default)]
    pub morphology: Option<String>,
}

/// External lemmatizer.
///
/// One surface form in, one analysis (or `None` for unknown forms) out.
/// Implementations may be slow or unavailable; the annotator bounds every
/// call and treats failures as unknown.
#[async_trait]
pub trait Lemmatizer: Send + Sync {
    async fn lemmatize(
        &self,
        surface: &str,
        language: Language,
    ) -> Result<Option<LemmaAnalysis>, UpstreamError>;
}

/// Token counts from annotating a batch of segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationStats {
    /// Word tokens with an inline annotation
    pub inline: usize,
    /// Word tokens resolved by the lemmatizer
    pub lemmatized: usize,
    /// Word tokens left without a lemma
    pub unresolved: usize,
    /// Lemmatizer calls that failed or timed out
    pub upstream_failures: usize,
}

impl AnnotationStats {
    pub fn annotated(&self) -> usize {
        self.inline + self.lemmatized
    }
}

type LemmaCache = HashMap<(String, Language), Option<LemmaAnalysis>>;

/// Fills in lemmas and morphology from the configured lemmatizer.
#[derive(Clone)]
pub struct MorphologicalAnnotator {
    lemmatizer: Option<Arc<dyn Lemmatizer>>,
    timeout: Duration,
}

impl MorphologicalAnnotator {
    pub fn new(lemmatizer: Option<Arc<dyn Lemmatizer>>, timeout: Duration) -> Self {
        Self {
            lemmatizer,
            timeout,
        }
    }

    /// Annotator that only keeps inline annotations.
    pub fn inline_only() -> Self {
        Self::new(None, Duration::from_millis(crate::config::DEFAULT_LEMMATIZER_TIMEOUT_MS))
    }

    /// Annotates one segment.
    pub async fn annotate(
        &self,
        mut segment: Segment,
        language: Language,
    ) -> (Segment, AnnotationStats) {
        let mut stats = AnnotationStats::default();
        let mut cache = LemmaCache::new();
        self.annotate_segment(&mut segment, language, &mut cache, &mut stats)
            .await;
        (segment, stats)
    }

    /// Annotates segments in place. `language_of` gives the language of a
    /// segment's work.
    ///
    /// Each distinct `(surface, language)` pair is sent to the lemmatizer at
    /// most once per call; failures are cached as unknown for the rest of the
    /// batch.
    pub async fn annotate_all<F>(&self, segments: &mut [Segment], language_of: F) -> AnnotationStats
    where
        F: Fn(&Segment) -> Language,
    {
        let mut stats = AnnotationStats::default();
        let mut cache = LemmaCache::new();

        for segment in segments.iter_mut() {
            let language = language_of(segment);
            self.annotate_segment(segment, language, &mut cache, &mut stats)
                .await;
        }

        debug!(
            "Annotated {} segments: {} inline, {} lemmatized, {} unresolved ({} distinct forms)",
            segments.len(),
            stats.inline,
            stats.lemmatized,
            stats.unresolved,
            cache.len()
        );
        stats
    }

    async fn annotate_segment(
        &self,
        segment: &mut Segment,
        language: Language,
        cache: &mut LemmaCache,
        stats: &mut AnnotationStats,
    ) {
        for token in segment.tokens.iter_mut().filter(|t| t.is_word()) {
            let inline = token.annotation == Some(AnnotationSource::Inline);
            if inline && token.lemma.is_some() {
                stats.inline += 1;
                continue;
            }

            let Some(lemmatizer) = &self.lemmatizer else {
                stats.unresolved += 1;
                continue;
            };

            let key = (token.surface.clone(), language);
            let analysis = match cache.get(&key) {
                Some(cached) => cached.clone(),
                None => {
                    let analysis = match self
                        .call(lemmatizer.as_ref(), &token.surface, language)
                        .await
                    {
                        Ok(analysis) => analysis,
                        Err(err) => {
                            stats.upstream_failures += 1;
                            warn!(
                                "Lemmatizer unavailable for '{}' in {} {}: {}",
                                token.surface, segment.work_id, segment.citation, err
                            );
                            None
                        }
                    };
                    cache.insert(key, analysis.clone());
                    analysis
                }
            };

            match analysis {
                // Inline morphology stays; only the missing lemma is filled
                Some(analysis) if inline => {
                    token.lemma = Some(analysis.lemma);
                    stats.lemmatized += 1;
                }
                Some(analysis) => {
                    token.lemma = Some(analysis.lemma);
                    token.morphology = analysis.morphology;
                    token.annotation = Some(AnnotationSource::Lemmatizer);
                    stats.lemmatized += 1;
                }
                None => stats.unresolved += 1,
            }
        }
    }

    async fn call(
        &self,
        lemmatizer: &dyn Lemmatizer,
        surface: &str,
        language: Language,
    ) -> Result<Option<LemmaAnalysis>, UpstreamError> {
        match tokio::time::timeout(self.timeout, lemmatizer.lemmatize(surface, language)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::{CitationPath, Locator};
    use crate::text::{tokenize, LanguageRules};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLemmatizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Lemmatizer for CountingLemmatizer {
        async fn lemmatize(
            &self,
            surface: &str,
            _language: Language,
        ) -> Result<Option<LemmaAnalysis>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match surface {
                "cano" => Some(LemmaAnalysis {
                    lemma: "cano".to_string(),
                    morphology: Some("v1spia---".to_string()),
                }),
                "arma" => Some(LemmaAnalysis {
                    lemma: "arma".to_string(),
                    morphology: None,
                }),
                _ => None,
            })
        }
    }

    struct SlowLemmatizer;

    #[async_trait]
    impl Lemmatizer for SlowLemmatizer {
        async fn lemmatize(
            &self,
            _surface: &str,
            _language: Language,
        ) -> Result<Option<LemmaAnalysis>, UpstreamError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }
    }

    struct FailingLemmatizer;

    #[async_trait]
    impl Lemmatizer for FailingLemmatizer {
        async fn lemmatize(
            &self,
            _surface: &str,
            _language: Language,
        ) -> Result<Option<LemmaAnalysis>, UpstreamError> {
            Err(UpstreamError::Unavailable("connection refused".to_string()))
        }
    }

    fn segment(text: &str) -> Segment {
        Segment {
            work_id: "aeneid".to_string(),
            path: CitationPath::new(vec![Locator::Number(1)]),
            citation: "1".to_string(),
            ordinal: 0,
            text: text.to_string(),
            tokens: tokenize(text, &LanguageRules::latin()),
            document_id: "doc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_lemmatizer_fills_unresolved_tokens() {
        let lemmatizer = Arc::new(CountingLemmatizer {
            calls: AtomicUsize::new(0),
        });
        let annotator = MorphologicalAnnotator::new(Some(lemmatizer), Duration::from_millis(100));
        let (seg, stats) = annotator
            .annotate(segment("arma virumque cano."), Language::Latin)
            .await;

        assert_eq!(seg.tokens[0].lemma.as_deref(), Some("arma"));
        assert_eq!(seg.tokens[1].lemma, None);
        assert_eq!(seg.tokens[2].morphology.as_deref(), Some("v1spia---"));
        assert_eq!(seg.tokens[2].annotation, Some(AnnotationSource::Lemmatizer));
        assert_eq!(seg.tokens[3].lemma, None);
        assert_eq!(stats.lemmatized, 2);
        assert_eq!(stats.unresolved, 1);
    }

    #[tokio::test]
    async fn test_inline_annotation_is_never_overridden() {
        let lemmatizer = Arc::new(CountingLemmatizer {
            calls: AtomicUsize::new(0),
        });
        let annotator =
            MorphologicalAnnotator::new(Some(lemmatizer.clone()), Duration::from_millis(100));
        let mut seg = segment("cano");
        seg.tokens[0].lemma = Some("canus".to_string());
        seg.tokens[0].annotation = Some(AnnotationSource::Inline);

        let (seg, stats) = annotator.annotate(seg, Language::Latin).await;
        assert_eq!(seg.tokens[0].lemma.as_deref(), Some("canus"));
        assert_eq!(stats.inline, 1);
        assert_eq!(lemmatizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_inline_morphology_kept_when_lemma_filled() {
        let lemmatizer = Arc::new(CountingLemmatizer {
            calls: AtomicUsize::new(0),
        });
        let annotator = MorphologicalAnnotator::new(Some(lemmatizer), Duration::from_millis(100));
        let mut seg = segment("arma");
        seg.tokens[0].morphology = Some("n-p---na-".to_string());
        seg.tokens[0].annotation = Some(AnnotationSource::Inline);

        let (seg, stats) = annotator.annotate(seg, Language::Latin).await;
        assert_eq!(seg.tokens[0].lemma.as_deref(), Some("arma"));
        assert_eq!(seg.tokens[0].morphology.as_deref(), Some("n-p---na-"));
        assert_eq!(seg.tokens[0].annotation, Some(AnnotationSource::Inline));
        assert_eq!(stats.lemmatized, 1);
    }

    #[tokio::test]
    async fn test_each_surface_looked_up_once() {
        let lemmatizer = Arc::new(CountingLemmatizer {
            calls: AtomicUsize::new(0),
        });
        let annotator =
            MorphologicalAnnotator::new(Some(lemmatizer.clone()), Duration::from_millis(100));
        let mut segments = vec![segment("cano cano arma"), segment("arma cano")];
        let stats = annotator
            .annotate_all(&mut segments, |_| Language::Latin)
            .await;
        assert_eq!(stats.lemmatized, 5);
        assert_eq!(lemmatizer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_tokens_unresolved() {
        let annotator =
            MorphologicalAnnotator::new(Some(Arc::new(SlowLemmatizer)), Duration::from_millis(50));
        let (seg, stats) = annotator
            .annotate(segment("arma cano"), Language::Latin)
            .await;
        assert!(seg.tokens.iter().all(|t| t.lemma.is_none()));
        assert_eq!(stats.unresolved, 2);
        assert_eq!(stats.upstream_failures, 2);
    }

    #[tokio::test]
    async fn test_unavailable_lemmatizer_degrades() {
        let annotator = MorphologicalAnnotator::new(
            Some(Arc::new(FailingLemmatizer)),
            Duration::from_millis(50),
        );
        let (seg, stats) = annotator.annotate(segment("arma arma"), Language::Latin).await;
        assert!(seg.tokens.iter().all(|t| t.lemma.is_none()));
        assert_eq!(stats.unresolved, 2);
        // Failure is cached for the rest of the batch
        assert_eq!(stats.upstream_failures, 1);
    }

    #[tokio::test]
    async fn test_inline_only() {
        let (seg, stats) = MorphologicalAnnotator::inline_only()
            .annotate(segment("arma cano"), Language::Latin)
            .await;
        assert!(seg.tokens.iter().all(|t| t.lemma.is_none()));
        assert_eq!(stats.unresolved, 2);
    }
}
