// HybridRetrievalEngine - lexical term overlap blended with an optional similarity signal

use super::fusion;
use super::similarity::SimilarityProvider;
use super::types::{MatchKind, MatchSpan, Query, RankedResult, SearchHit};
use crate::config::{FusionWeights, RuleSet};
use crate::corpus::{CorpusSnapshot, Segment, WorkEntry};
use crate::error::UpstreamError;
use crate::text::{tokenize, Language, LanguageRules};
use crate::xref::CrossReferenceResolver;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Folded, stopword-free query terms in first-occurrence order.
pub fn query_terms(text: &str, rules: &LanguageRules) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text, rules)
        .into_iter()
        .filter(|t| t.is_word() && !t.normalized.is_empty())
        .filter(|t| !rules.is_stopword(&t.normalized))
        .filter_map(|t| seen.insert(t.normalized.clone()).then_some(t.normalized))
        .collect()
}

/// Term matches found in one candidate segment.
struct CandidateMatch {
    segment: Arc<Segment>,
    surface_terms: BTreeSet<usize>,
    lemma_terms: BTreeSet<usize>,
    spans: Vec<MatchSpan>,
    term_count: usize,
}

fn match_segment(
    segment: Arc<Segment>,
    terms: &[String],
    rules: &LanguageRules,
) -> CandidateMatch {
    let position: HashMap<&str, usize> = terms
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let mut surface_terms = BTreeSet::new();
    let mut lemma_terms = BTreeSet::new();
    let mut spans = Vec::new();

    for (index, token) in segment.tokens.iter().enumerate() {
        if !token.is_word() {
            continue;
        }
        let surface_hit = position.get(token.normalized.as_str()).copied();
        let lemma_hit = token
            .lemma
            .as_deref()
            .and_then(|lemma| position.get(rules.normalize(lemma).as_str()).copied());

        let matched_by = match (surface_hit, lemma_hit) {
            (Some(_), Some(_)) => MatchKind::Both,
            (Some(_), None) => MatchKind::Surface,
            (None, Some(_)) => MatchKind::Lemma,
            (None, None) => continue,
        };
        if let Some(term) = surface_hit {
            surface_terms.insert(term);
        }
        if let Some(term) = lemma_hit {
            lemma_terms.insert(term);
        }
        let span = token.span();
        spans.push(MatchSpan {
            token_index: index,
            start: span.start,
            end: span.end,
            matched_by,
        });
    }

    CandidateMatch {
        segment,
        surface_terms,
        lemma_terms,
        spans,
        term_count: terms.len(),
    }
}

/// Segments of `entry` sharing at least one term with the query, by surface
/// form or lemma.
fn candidates(entry: &WorkEntry, terms: &[String], rules: &LanguageRules) -> Vec<CandidateMatch> {
    let mut positions = BTreeSet::new();
    for term in terms {
        positions.extend(entry.terms.surface_postings(term).iter().copied());
        positions.extend(entry.terms.lemma_postings(term).iter().copied());
    }
    positions
        .into_iter()
        .filter_map(|p| entry.segments.get(p).cloned())
        .map(|segment| match_segment(segment, terms, rules))
        .filter(|m| !m.spans.is_empty())
        .collect()
}

/// Ranks corpus segments against a query.
///
/// Lexical overlap is always computed; an external [`SimilarityProvider`]
/// adds a minority signal when configured. Each provider call is bounded by
/// the similarity timeout and a failure only removes that candidate's
/// similarity contribution.
#[derive(Clone)]
pub struct HybridRetrievalEngine {
    weights: FusionWeights,
    similarity: Option<Arc<dyn SimilarityProvider>>,
    similarity_timeout: Duration,
    xref: Arc<CrossReferenceResolver>,
}

impl HybridRetrievalEngine {
    pub fn new(
        weights: FusionWeights,
        similarity: Option<Arc<dyn SimilarityProvider>>,
        similarity_timeout: Duration,
        xref: Arc<CrossReferenceResolver>,
    ) -> Self {
        Self {
            weights,
            similarity,
            similarity_timeout,
            xref,
        }
    }

    pub fn weights(&self) -> &FusionWeights {
        &self.weights
    }

    pub fn has_similarity(&self) -> bool {
        self.similarity.is_some()
    }

    /// Runs `query` against `snapshot`.
    ///
    /// Results are deterministic for a given snapshot, query and provider
    /// output: score descending, ties by work id then ordinal.
    #[instrument(skip_all, fields(query = %query.text, limit = ?query.limit))]
    pub async fn search(
        &self,
        snapshot: &CorpusSnapshot,
        rules: &RuleSet,
        query: &Query,
    ) -> RankedResult {
        let start = instant::Instant::now();

        let works: Vec<&Arc<WorkEntry>> = match &query.work_id {
            Some(work_id) => match snapshot.work(work_id) {
                Some(entry) => vec![entry],
                None => {
                    debug!("Unknown work filter '{}', empty result", work_id);
                    return RankedResult::empty();
                }
            },
            None => snapshot.works().collect(),
        };
        let works: Vec<&Arc<WorkEntry>> = works
            .into_iter()
            .filter(|e| query.language.map_or(true, |l| e.work.language == l))
            .collect();

        // Query terms depend on the folding rules of each work's language
        let mut terms_by_language: BTreeMap<Language, Vec<String>> = BTreeMap::new();
        for entry in &works {
            let language = entry.work.language;
            terms_by_language
                .entry(language)
                .or_insert_with(|| query_terms(&query.text, rules.get(language)));
        }

        let mut all_terms: Vec<String> = Vec::new();
        for term in terms_by_language.values().flatten() {
            if !all_terms.contains(term) {
                all_terms.push(term.clone());
            }
        }
        if all_terms.is_empty() {
            debug!("Query has no searchable terms");
            return RankedResult {
                terms: all_terms,
                ..RankedResult::empty()
            };
        }

        let mut matches = Vec::new();
        for entry in &works {
            let language = entry.work.language;
            let terms = match terms_by_language.get(&language) {
                Some(terms) if !terms.is_empty() => terms,
                _ => continue,
            };
            matches.extend(candidates(entry, terms, rules.get(language)));
        }

        let similarities = self.similarities(&query.text, &matches).await;
        let similarity_weight = if self.similarity.is_some() {
            self.weights.similarity_weight
        } else {
            0.0
        };

        let mut hits: Vec<SearchHit> = matches
            .into_iter()
            .zip(similarities)
            .map(|(m, similarity)| {
                let lexical_score = fusion::lexical_score(
                    m.surface_terms.len(),
                    m.lemma_terms.len(),
                    m.term_count,
                    &self.weights,
                );
                SearchHit {
                    score: fusion::blend(lexical_score, similarity, similarity_weight),
                    lexical_score,
                    similarity,
                    surface_matches: m.surface_terms.len(),
                    lemma_matches: m.lemma_terms.len(),
                    spans: m.spans,
                    cross_refs: Vec::new(),
                    segment: m.segment,
                }
            })
            .collect();

        fusion::rank(&mut hits);
        let total_candidates = hits.len();
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }

        for hit in hits.iter_mut() {
            let indices: Vec<usize> = hit.spans.iter().map(|s| s.token_index).collect();
            hit.cross_refs = self.xref.resolve_tokens(&hit.segment, indices);
        }

        debug!(
            "Search matched {} candidates in {} works, returning {} ({:.1}ms)",
            total_candidates,
            works.len(),
            hits.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        RankedResult {
            hits,
            total_candidates,
            terms: all_terms,
        }
    }

    /// Similarity per candidate, `None` where unavailable.
    async fn similarities(&self, query: &str, matches: &[CandidateMatch]) -> Vec<Option<f32>> {
        let Some(provider) = &self.similarity else {
            return vec![None; matches.len()];
        };

        let calls = matches.iter().map(|m| {
            let provider = provider.clone();
            let segment = m.segment.clone();
            async move {
                let outcome = match tokio::time::timeout(
                    self.similarity_timeout,
                    provider.similarity(query, &segment),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(UpstreamError::Timeout(self.similarity_timeout)),
                };
                match outcome {
                    Ok(score) => score.and_then(fusion::normalize_similarity),
                    Err(err) => {
                        warn!(
                            "Similarity unavailable for {} {}: {}",
                            segment.work_id, segment.citation, err
                        );
                        None
                    }
                }
            }
        });
        join_all(calls).await
    }
}
