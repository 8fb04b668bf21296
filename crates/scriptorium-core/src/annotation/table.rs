use super::{LemmaAnalysis, Lemmatizer};
use crate::error::{AdapterError, UpstreamError};
use crate::text::{Language, LanguageRules};
use async_trait::async_trait;
use std::collections::HashMap;

/// Lemmatizer backed by a lookup table.
///
/// Loaded from tab-separated lines `surface<TAB>lemma[<TAB>morphology]`.
/// Surfaces are folded with the language's rules, so `Μῆνιν` and `μηνιν`
/// hit the same row. The first row for a folded surface wins. Lines starting
/// with `#` and blank lines are skipped.
#[derive(Debug, Clone)]
pub struct TableLemmatizer {
    language: Language,
    rules: LanguageRules,
    entries: HashMap<String, LemmaAnalysis>,
}

impl TableLemmatizer {
    pub fn new(language: Language, rules: LanguageRules) -> Self {
        Self {
            language,
            rules,
            entries: HashMap::new(),
        }
    }

    /// Parses a TSV table for `language` using its built-in folding rules.
    pub fn from_tsv(content: &str, language: Language) -> Result<Self, AdapterError> {
        let mut table = Self::new(language, LanguageRules::for_language(language));
        for (index, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let (Some(surface), Some(lemma)) = (fields.next(), fields.next()) else {
                return Err(AdapterError::Unsupported(format!(
                    "lemma table line {}: expected 'surface<TAB>lemma[<TAB>morphology]'",
                    index + 1
                )));
            };
            let morphology = fields
                .next()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string);
            table.insert(surface.trim(), lemma.trim(), morphology);
        }
        Ok(table)
    }

    pub fn insert(&mut self, surface: &str, lemma: &str, morphology: Option<String>) {
        let key = self.rules.normalize(surface);
        if key.is_empty() || lemma.is_empty() {
            return;
        }
        self.entries.entry(key).or_insert_with(|| LemmaAnalysis {
            lemma: lemma.to_string(),
            morphology,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Lemmatizer for TableLemmatizer {
    async fn lemmatize(
        &self,
        surface: &str,
        language: Language,
    ) -> Result<Option<LemmaAnalysis>, UpstreamError> {
        if language != self.language {
            return Ok(None);
        }
        Ok(self.entries.get(&self.rules.normalize(surface)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "# surface\tlemma\ttag\nμῆνιν\tμῆνις\tn-s---fa-\nἄειδε\tἀείδω\nμηνιν\tother\n";

    #[tokio::test]
    async fn test_lookup_is_folded() {
        let table = TableLemmatizer::from_tsv(TABLE, Language::Greek).unwrap();
        assert_eq!(table.len(), 2);

        let hit = table.lemmatize("ΜΗΝΙΝ", Language::Greek).await.unwrap().unwrap();
        assert_eq!(hit.lemma, "μῆνις");
        assert_eq!(hit.morphology.as_deref(), Some("n-s---fa-"));

        let no_tag = table.lemmatize("ἄειδε", Language::Greek).await.unwrap().unwrap();
        assert_eq!(no_tag.morphology, None);
    }

    #[tokio::test]
    async fn test_unknown_and_other_language() {
        let table = TableLemmatizer::from_tsv(TABLE, Language::Greek).unwrap();
        assert!(table.lemmatize("θεά", Language::Greek).await.unwrap().is_none());
        assert!(table.lemmatize("μῆνιν", Language::Latin).await.unwrap().is_none());
    }

    #[test]
    fn test_malformed_line() {
        let err = TableLemmatizer::from_tsv("ok\tfine\nbroken\n", Language::Latin).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
