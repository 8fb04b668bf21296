//! Cross-references from annotated tokens into reference works.
//!
//! Two read-only tables:
//!
//! - a lexicon, keyed by lemma (homonyms keep their source order)
//! - a grammar reference, keyed by morphology-tag prefix patterns
//!
//! Lookups never fail: a miss is an empty result.

use crate::corpus::Segment;
use crate::error::AdapterError;
use crate::text::LanguageRules;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A lexicon article for one lemma.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub lemma: String,
    /// Headword as printed (may differ from the lemma for homonyms, e.g. `εἰμί (2)`)
    #[serde(default)]
    pub headword: Option<String>,
    pub definition: String,
    /// Citation of the article in its source lexicon
    #[serde(default)]
    pub source: Option<String>,
}

/// A section of a reference grammar that applies to morphology tags
/// starting with `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarReference {
    pub pattern: String,
    pub title: String,
    /// Section or paragraph in the grammar (`Smyth §1234`)
    #[serde(default)]
    pub section: Option<String>,
}

/// Lexicon and grammar references for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCrossReferences {
    /// Index into the segment's tokens
    pub token_index: usize,
    pub lexicon: Vec<LexiconEntry>,
    pub grammar: Vec<GrammarReference>,
}

/// Resolves lemmas and morphology tags to reference entries.
#[derive(Debug, Clone)]
pub struct CrossReferenceResolver {
    fold: LanguageRules,
    lexicon: HashMap<String, Vec<LexiconEntry>>,
    grammar: Vec<GrammarReference>,
}

impl Default for CrossReferenceResolver {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl CrossReferenceResolver {
    /// Builds a resolver. Lexicon keys are folded (diacritics, case, final
    /// sigma) so lookups by token lemma tolerate encoding differences.
    pub fn new(lexicon: Vec<LexiconEntry>, grammar: Vec<GrammarReference>) -> Self {
        let fold = LanguageRules::generic();
        let mut by_lemma: HashMap<String, Vec<LexiconEntry>> = HashMap::new();
        for entry in lexicon {
            by_lemma
                .entry(fold.normalize(&entry.lemma))
                .or_default()
                .push(entry);
        }
        Self {
            fold,
            lexicon: by_lemma,
            grammar: grammar
                .into_iter()
                .filter(|g| !g.pattern.is_empty())
                .collect(),
        }
    }

    /// Loads tables from JSON arrays of [`LexiconEntry`] and
    /// [`GrammarReference`].
    pub fn from_json(lexicon_json: &str, grammar_json: &str) -> Result<Self, AdapterError> {
        let lexicon: Vec<LexiconEntry> = serde_json::from_str(lexicon_json)
            .map_err(|e| AdapterError::Unsupported(format!("lexicon: {}", e)))?;
        let grammar: Vec<GrammarReference> = serde_json::from_str(grammar_json)
            .map_err(|e| AdapterError::Unsupported(format!("grammar: {}", e)))?;
        Ok(Self::new(lexicon, grammar))
    }

    /// Every lexicon entry for `lemma`, in source order.
    pub fn lexicon_lookup(&self, lemma: &str) -> &[LexiconEntry] {
        self.lexicon
            .get(&self.fold.normalize(lemma))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every grammar reference whose pattern is a prefix of `tag`, in source
    /// order.
    pub fn grammar_lookup(&self, tag: &str) -> Vec<&GrammarReference> {
        self.grammar
            .iter()
            .filter(|g| tag.starts_with(g.pattern.as_str()))
            .collect()
    }

    /// References for the given tokens of a segment. Tokens with neither a
    /// lexicon nor a grammar hit are left out.
    pub fn resolve_tokens(
        &self,
        segment: &Segment,
        token_indices: impl IntoIterator<Item = usize>,
    ) -> Vec<TokenCrossReferences> {
        token_indices
            .into_iter()
            .filter_map(|index| {
                let token = segment.tokens.get(index)?;
                let lexicon = token
                    .lemma
                    .as_deref()
                    .map(|l| self.lexicon_lookup(l).to_vec())
                    .unwrap_or_default();
                let grammar: Vec<GrammarReference> = token
                    .morphology
                    .as_deref()
                    .map(|m| self.grammar_lookup(m).into_iter().cloned().collect())
                    .unwrap_or_default();
                if lexicon.is_empty() && grammar.is_empty() {
                    return None;
                }
                Some(TokenCrossReferences {
                    token_index: index,
                    lexicon,
                    grammar,
                })
            })
            .collect()
    }

    /// References for every annotated token of a segment.
    pub fn resolve_segment(&self, segment: &Segment) -> Vec<TokenCrossReferences> {
        self.resolve_tokens(segment, 0..segment.tokens.len())
    }

    pub fn lexicon_size(&self) -> usize {
        self.lexicon.values().map(Vec::len).sum()
    }

    pub fn grammar_size(&self) -> usize {
        self.grammar.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::{CitationPath, Locator};
    use crate::text::{tokenize, AnnotationSource};

    fn entry(lemma: &str, definition: &str) -> LexiconEntry {
        LexiconEntry {
            lemma: lemma.to_string(),
            headword: None,
            definition: definition.to_string(),
            source: None,
        }
    }

    fn grammar(pattern: &str, title: &str) -> GrammarReference {
        GrammarReference {
            pattern: pattern.to_string(),
            title: title.to_string(),
            section: None,
        }
    }

    fn resolver() -> CrossReferenceResolver {
        CrossReferenceResolver::new(
            vec![
                entry("εἰμί", "be"),
                entry("μῆνις", "wrath"),
                entry("εἰμί", "go"),
            ],
            vec![
                grammar("v", "Verbs"),
                grammar("n-s", "Singular nouns"),
                grammar("v1s", "First person singular"),
                grammar("n", "Nouns"),
            ],
        )
    }

    #[test]
    fn test_homonyms_in_source_order() {
        let r = resolver();
        let hits = r.lexicon_lookup("εἰμί");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].definition, "be");
        assert_eq!(hits[1].definition, "go");
    }

    #[test]
    fn test_lexicon_lookup_is_folded() {
        let r = resolver();
        assert_eq!(r.lexicon_lookup("μηνις").len(), 1);
        assert_eq!(r.lexicon_lookup("ΜΗΝΙΣ").len(), 1);
        assert!(r.lexicon_lookup("θεά").is_empty());
    }

    #[test]
    fn test_grammar_prefix_matches() {
        let r = resolver();
        let titles: Vec<_> = r
            .grammar_lookup("v1spia---")
            .iter()
            .map(|g| g.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Verbs", "First person singular"]);

        let titles: Vec<_> = r
            .grammar_lookup("n-s---fa-")
            .iter()
            .map(|g| g.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Singular nouns", "Nouns"]);

        assert!(r.grammar_lookup("a-s---").is_empty());
        assert!(r.grammar_lookup("").is_empty());
    }

    #[test]
    fn test_resolve_tokens() {
        let rules = LanguageRules::greek();
        let text = "μῆνιν ἄειδε θεὰ";
        let mut tokens = tokenize(text, &rules);
        tokens[0].lemma = Some("μῆνις".to_string());
        tokens[0].morphology = Some("n-s---fa-".to_string());
        tokens[0].annotation = Some(AnnotationSource::Inline);
        tokens[2].lemma = Some("θεά".to_string());
        let segment = Segment {
            work_id: "iliad".to_string(),
            path: CitationPath::new(vec![Locator::Number(1), Locator::Number(1)]),
            citation: "1.1".to_string(),
            ordinal: 0,
            text: text.to_string(),
            tokens,
            document_id: "doc".to_string(),
        };

        let refs = resolver().resolve_segment(&segment);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].token_index, 0);
        assert_eq!(refs[0].lexicon[0].definition, "wrath");
        assert_eq!(refs[0].grammar.len(), 2);

        assert!(resolver().resolve_tokens(&segment, [1, 2, 99]).is_empty());
    }

    #[test]
    fn test_from_json() {
        let r = CrossReferenceResolver::from_json(
            r#"[{"lemma":"arma","definition":"arms"}]"#,
            r#"[{"pattern":"n-p","title":"Plural nouns","section":"AG §37"}]"#,
        )
        .unwrap();
        assert_eq!(r.lexicon_size(), 1);
        assert_eq!(r.grammar_size(), 1);
        assert!(CrossReferenceResolver::from_json("{", "[]").is_err());
    }
}
