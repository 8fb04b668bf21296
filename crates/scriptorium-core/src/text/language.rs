use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Source language of a work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Greek,
    Latin,
    Generic,
}

impl Language {
    /// Maps a language code or name (`grc`, `la`, `latin`, `generic`) to a
    /// language, or `None` when the code is not recognized.
    pub fn parse_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "grc" | "greek" | "el" | "gr" => Some(Language::Greek),
            "la" | "lat" | "latin" => Some(Language::Latin),
            "generic" => Some(Language::Generic),
            _ => None,
        }
    }

    /// Like [`parse_code`](Self::parse_code), falling back to
    /// [`Language::Generic`] for unrecognized codes.
    pub fn from_code(code: &str) -> Self {
        Self::parse_code(code).unwrap_or(Language::Generic)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::Greek => "grc",
            Language::Latin => "la",
            Language::Generic => "generic",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Word-boundary and folding rules for one language.
///
/// Stopwords are folded on first lookup and cached; build a new value rather
/// than editing `stopwords` or the folding switches after the rules are in use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageRules {
    /// Words ignored in queries. Compared after folding.
    pub stopwords: BTreeSet<String>,
    /// Apostrophes that mark elision and stay attached to the preceding word
    pub elision_marks: Vec<char>,
    /// Characters that always end a word and stand as punctuation tokens,
    /// even where UAX #29 would join across them (Greek ano teleia)
    pub punctuation: Vec<char>,
    /// Remove accents, breathings and other combining marks
    pub strip_diacritics: bool,
    /// Fold final sigma to medial sigma
    pub fold_final_sigma: bool,
    /// Fold `j` to `i` and `v` to `u`
    pub fold_latin_consonants: bool,
    #[serde(skip)]
    folded_stopwords: OnceLock<BTreeSet<String>>,
}

impl PartialEq for LanguageRules {
    fn eq(&self, other: &Self) -> bool {
        self.stopwords == other.stopwords
            && self.elision_marks == other.elision_marks
            && self.punctuation == other.punctuation
            && self.strip_diacritics == other.strip_diacritics
            && self.fold_final_sigma == other.fold_final_sigma
            && self.fold_latin_consonants == other.fold_latin_consonants
    }
}

impl Default for LanguageRules {
    fn default() -> Self {
        Self::generic()
    }
}

const GREEK_STOPWORDS: &[&str] = &[
    "ὁ", "ἡ", "τό", "τοῦ", "τῆς", "τῷ", "τῇ", "τόν", "τήν", "οἱ", "αἱ", "τά", "τῶν", "τοῖς",
    "ταῖς", "τούς", "τάς", "καί", "δέ", "τε", "μέν", "γάρ", "οὐ", "οὐκ", "οὐχ", "ἐν", "εἰς",
    "ἐς", "ὡς", "ἀλλά", "ἄρα", "ἄν", "δή",
];

const LATIN_STOPWORDS: &[&str] = &[
    "et", "in", "ad", "cum", "non", "sed", "atque", "ac", "nec", "neque", "que", "aut", "vel",
    "ut", "est", "sunt", "a", "ab", "e", "ex", "de",
];

const GENERIC_STOPWORDS: &[&str] = &["the", "a", "an", "and", "of", "to", "in", "is"];

fn stopword_set(words: &[&str]) -> BTreeSet<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl LanguageRules {
    pub fn greek() -> Self {
        Self {
            stopwords: stopword_set(GREEK_STOPWORDS),
            elision_marks: vec!['\u{2019}', '\u{02BC}', '\u{0027}', '\u{1FBD}'],
            // ano teleia and its canonical equivalent, the middle dot
            punctuation: vec!['\u{0387}', '\u{00B7}', '\u{037E}'],
            strip_diacritics: true,
            fold_final_sigma: true,
            fold_latin_consonants: false,
            folded_stopwords: OnceLock::new(),
        }
    }

    pub fn latin() -> Self {
        Self {
            stopwords: stopword_set(LATIN_STOPWORDS),
            elision_marks: Vec::new(),
            punctuation: Vec::new(),
            strip_diacritics: true,
            fold_final_sigma: false,
            fold_latin_consonants: true,
            folded_stopwords: OnceLock::new(),
        }
    }

    pub fn generic() -> Self {
        Self {
            stopwords: stopword_set(GENERIC_STOPWORDS),
            elision_marks: vec!['\u{2019}', '\u{0027}'],
            punctuation: Vec::new(),
            strip_diacritics: true,
            fold_final_sigma: true,
            fold_latin_consonants: false,
            folded_stopwords: OnceLock::new(),
        }
    }

    /// Built-in rules for a language.
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Greek => Self::greek(),
            Language::Latin => Self::latin(),
            Language::Generic => Self::generic(),
        }
    }

    pub fn is_elision_mark(&self, c: char) -> bool {
        self.elision_marks.contains(&c)
    }

    pub fn is_punctuation(&self, c: char) -> bool {
        self.punctuation.contains(&c)
    }

    /// Folds a surface form to its matching key.
    ///
    /// Decomposes, drops combining marks when configured, lowercases, drops
    /// elision marks and applies the letter folds. The same function folds
    /// corpus tokens, lemmas and query terms.
    pub fn normalize(&self, surface: &str) -> String {
        let decomposed = surface.nfd();
        let stripped: String = if self.strip_diacritics {
            decomposed.filter(|c| !is_combining_mark(*c)).collect()
        } else {
            decomposed.collect()
        };

        stripped
            .to_lowercase()
            .chars()
            .filter(|c| !self.is_elision_mark(*c))
            .map(|c| match c {
                'ς' if self.fold_final_sigma => 'σ',
                'j' if self.fold_latin_consonants => 'i',
                'v' if self.fold_latin_consonants => 'u',
                other => other,
            })
            .nfc()
            .collect()
    }

    /// True when an already-folded term is a stopword.
    pub fn is_stopword(&self, normalized: &str) -> bool {
        self.folded_stopwords
            .get_or_init(|| self.stopwords.iter().map(|w| self.normalize(w)).collect())
            .contains(normalized)
    }
}
