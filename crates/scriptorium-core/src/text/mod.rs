//! Text handling shared by ingestion and retrieval: language rules, folding
//! and tokenization.
//!
//! Ingestion and query processing go through the same [`LanguageRules`], so a
//! query term and a corpus token compare equal exactly when their folded
//! forms match.

mod language;
mod tokenizer;

pub use language::{Language, LanguageRules};
pub use tokenizer::tokenize;

use serde::{Deserialize, Serialize};

/// Whether a token carries lexical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Word,
    /// Retained for reconstruction, never scored
    Punctuation,
}

/// Where a token's annotation came from. `Inline` covers tokens with
/// inline morphology whose lemma the lemmatizer filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationSource {
    /// Inline markup annotation; never overridden
    Inline,
    /// External lemmatizer
    Lemmatizer,
}

/// A token of segment text.
///
/// `surface + separator` over all tokens of a segment reproduces the segment
/// text byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Text exactly as it appears in the segment
    pub surface: String,
    /// Folded form used for matching
    pub normalized: String,
    #[serde(default)]
    pub lemma: Option<String>,
    /// Compact morphology code (e.g. `n-s---fa-`)
    #[serde(default)]
    pub morphology: Option<String>,
    #[serde(default)]
    pub annotation: Option<AnnotationSource>,
    /// Byte offset of `surface` within the segment text
    pub offset: usize,
    pub kind: TokenKind,
    /// Whitespace following the token
    pub separator: String,
}

impl Token {
    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }

    /// Byte range of the surface form within the segment text.
    pub fn span(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.surface.len()
    }
}

/// Rebuilds segment text from its tokens.
pub fn reconstruct(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        out.push_str(&token.surface);
        out.push_str(&token.separator);
    }
    out
}
