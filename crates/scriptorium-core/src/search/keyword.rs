//! Exact-term postings for lexical matching.
//!
//! Each work keeps a [`TermIndex`] mapping folded terms to the segments that
//! contain them, once for surface forms and once for lemmas. Matching is
//! exact on the folded key: no stemming, no substring or fuzzy matching.
//!
//! # Usage
//!
//! ```ignore
//! use scriptorium_core::search::keyword::TermIndex;
//!
//! let index = TermIndex::build(&segments, &rules);
//! // Positions into `segments`, ascending
//! let hits = index.lemma_postings("αειδω");
//! ```

use crate::corpus::Segment;
use crate::text::LanguageRules;
use std::collections::HashMap;
use std::sync::Arc;

/// Term → segment positions for one work.
///
/// Postings hold positions into the work's ordinal-ordered segment list,
/// ascending and without duplicates.
#[derive(Debug, Clone, Default)]
pub struct TermIndex {
    surface: HashMap<String, Vec<usize>>,
    lemma: HashMap<String, Vec<usize>>,
}

fn add_posting(map: &mut HashMap<String, Vec<usize>>, term: String, position: usize) {
    let postings = map.entry(term).or_default();
    if postings.last() != Some(&position) {
        postings.push(position);
    }
}

impl TermIndex {
    /// Indexes word tokens of `segments`. Lemmas are folded with `rules` so
    /// they compare against the same keys as query terms.
    pub fn build(segments: &[Arc<Segment>], rules: &LanguageRules) -> Self {
        let mut index = Self::default();
        for (position, segment) in segments.iter().enumerate() {
            for token in segment.tokens.iter().filter(|t| t.is_word()) {
                if !token.normalized.is_empty() {
                    add_posting(&mut index.surface, token.normalized.clone(), position);
                }
                if let Some(lemma) = &token.lemma {
                    let folded = rules.normalize(lemma);
                    if !folded.is_empty() {
                        add_posting(&mut index.lemma, folded, position);
                    }
                }
            }
        }
        index
    }

    pub fn surface_postings(&self, term: &str) -> &[usize] {
        self.surface.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn lemma_postings(&self, term: &str) -> &[usize] {
        self.lemma.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct surface terms.
    pub fn surface_terms(&self) -> usize {
        self.surface.len()
    }

    /// Number of distinct lemmas.
    pub fn lemma_terms(&self) -> usize {
        self.lemma.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::{CitationPath, Locator};
    use crate::text::tokenize;

    fn segment(ordinal: u64, text: &str, lemmas: &[(&str, &str)]) -> Arc<Segment> {
        let rules = LanguageRules::greek();
        let mut tokens = tokenize(text, &rules);
        for token in tokens.iter_mut() {
            if let Some((_, lemma)) = lemmas.iter().find(|(s, _)| *s == token.surface) {
                token.lemma = Some(lemma.to_string());
            }
        }
        Arc::new(Segment {
            work_id: "w".to_string(),
            path: CitationPath::new(vec![Locator::Number(ordinal as u32 + 1)]),
            citation: (ordinal + 1).to_string(),
            ordinal,
            text: text.to_string(),
            tokens,
            document_id: "d".to_string(),
        })
    }

    #[test]
    fn test_surface_and_lemma_postings() {
        let rules = LanguageRules::greek();
        let segments = vec![
            segment(0, "μῆνιν ἄειδε θεὰ", &[("ἄειδε", "ἀείδω")]),
            segment(1, "ἄειδε ἄειδε, μοῦσα", &[]),
        ];
        let index = TermIndex::build(&segments, &rules);

        assert_eq!(index.surface_postings("αειδε"), &[0, 1]);
        assert_eq!(index.lemma_postings("αειδω"), &[0]);
        assert!(index.surface_postings("αειδω").is_empty());
        assert!(index.lemma_postings("missing").is_empty());
    }

    #[test]
    fn test_punctuation_is_not_indexed() {
        let rules = LanguageRules::greek();
        let index = TermIndex::build(&[segment(0, "θεά, ·", &[])], &rules);
        assert!(index.surface_postings(",").is_empty());
        assert_eq!(index.surface_terms(), 1);
        assert_eq!(index.lemma_terms(), 0);
    }
}
