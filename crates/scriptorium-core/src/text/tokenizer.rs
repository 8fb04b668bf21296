use super::{LanguageRules, Token, TokenKind};
use unicode_segmentation::UnicodeSegmentation;

/// Splits segment text into word and punctuation tokens.
///
/// Word boundaries follow UAX #29, then word pieces are split again at the
/// language's punctuation characters. Whitespace is never a token: it becomes
/// the separator of the token before it. An elision mark directly after a word
/// is folded into that word (`δ’`), anything else non-alphanumeric becomes a
/// punctuation token.
///
/// Leading whitespace has no token to attach to and is dropped; segment text
/// produced by the ingestor never starts with whitespace.
pub fn tokenize(text: &str, rules: &LanguageRules) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();

    for (offset, piece) in text.split_word_bound_indices() {
        if piece.chars().all(char::is_whitespace) {
            if let Some(last) = tokens.last_mut() {
                last.separator.push_str(piece);
            }
            continue;
        }

        for (inner, part) in split_punctuation(piece, rules) {
            push_piece(&mut tokens, offset + inner, part, rules);
        }
    }

    tokens
}

/// Splits `piece` into runs between punctuation characters and the single
/// punctuation characters themselves, with offsets relative to `piece`.
fn split_punctuation<'a>(piece: &'a str, rules: &LanguageRules) -> Vec<(usize, &'a str)> {
    if !piece.chars().any(|c| rules.is_punctuation(c)) {
        return vec![(0, piece)];
    }

    let mut parts = Vec::new();
    let mut run_start = 0;
    for (index, c) in piece.char_indices() {
        if rules.is_punctuation(c) {
            if run_start < index {
                parts.push((run_start, &piece[run_start..index]));
            }
            let end = index + c.len_utf8();
            parts.push((index, &piece[index..end]));
            run_start = end;
        }
    }
    if run_start < piece.len() {
        parts.push((run_start, &piece[run_start..]));
    }
    parts
}

fn push_piece(tokens: &mut Vec<Token>, offset: usize, piece: &str, rules: &LanguageRules) {
    if is_single_elision_mark(piece, rules) {
        if let Some(last) = tokens.last_mut() {
            if last.is_word() && last.separator.is_empty() {
                last.surface.push_str(piece);
                return;
            }
        }
    }

    let kind = if piece.chars().any(char::is_alphanumeric) {
        TokenKind::Word
    } else {
        TokenKind::Punctuation
    };
    let normalized = match kind {
        TokenKind::Word => rules.normalize(piece),
        TokenKind::Punctuation => piece.to_string(),
    };

    tokens.push(Token {
        surface: piece.to_string(),
        normalized,
        lemma: None,
        morphology: None,
        annotation: None,
        offset,
        kind,
        separator: String::new(),
    });
}

fn is_single_elision_mark(piece: &str, rules: &LanguageRules) -> bool {
    let mut chars = piece.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if rules.is_elision_mark(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::reconstruct;

    #[test]
    fn test_words_and_separators() {
        let rules = LanguageRules::latin();
        let tokens = tokenize("Arma virumque cano", &rules);
        let surfaces: Vec<_> = tokens.iter().map(|t| t.surface.as_str()).collect();
        assert_eq!(surfaces, vec!["Arma", "virumque", "cano"]);
        assert_eq!(tokens[0].separator, " ");
        assert_eq!(tokens[2].separator, "");
        assert_eq!(tokens[1].normalized, "uirumque");
        assert_eq!(tokens[1].offset, 5);
    }

    #[test]
    fn test_punctuation_is_kept_as_token() {
        let rules = LanguageRules::greek();
        let text = "ἄειδε, θεά·";
        let tokens = tokenize(text, &rules);
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word,
                TokenKind::Punctuation,
                TokenKind::Word,
                TokenKind::Punctuation
            ]
        );
        assert_eq!(reconstruct(&tokens), text);
    }

    #[test]
    fn test_ano_teleia_splits_words() {
        let rules = LanguageRules::greek();
        for text in ["θεά\u{0387}ἄλλο", "θεά\u{00B7}ἄλλο"] {
            let tokens = tokenize(text, &rules);
            let parts: Vec<_> = tokens
                .iter()
                .map(|t| (t.normalized.as_str(), t.kind))
                .collect();
            assert_eq!(
                parts,
                vec![
                    ("θεα", TokenKind::Word),
                    (&text[6..8], TokenKind::Punctuation),
                    ("αλλο", TokenKind::Word),
                ]
            );
            assert_eq!(tokens[2].offset, 8);
            assert_eq!(reconstruct(&tokens), text);
        }
    }

    #[test]
    fn test_middle_dot_joins_outside_greek() {
        let tokens = tokenize("a\u{00B7}b", &LanguageRules::latin());
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn test_elision_joins_previous_word() {
        let rules = LanguageRules::greek();
        let tokens = tokenize("ἄλγε\u{2019} ἔθηκε", &rules);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].surface, "ἄλγε\u{2019}");
        assert_eq!(tokens[0].normalized, "αλγε");
        assert_eq!(tokens[0].separator, " ");
    }

    #[test]
    fn test_offsets_point_into_text() {
        let rules = LanguageRules::greek();
        let text = "μῆνιν ἄειδε θεὰ";
        for token in tokenize(text, &rules) {
            assert_eq!(&text[token.span()], token.surface);
        }
    }

    #[test]
    fn test_reconstruction_with_mixed_whitespace() {
        let rules = LanguageRules::generic();
        let text = "Sing,  goddess\tthe wrath!";
        assert_eq!(reconstruct(&tokenize(text, &rules)), text);
    }

    #[test]
    fn test_empty_text() {
        assert!(tokenize("", &LanguageRules::generic()).is_empty());
    }
}
