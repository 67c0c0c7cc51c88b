use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder used by the treebank format for an empty field.
pub const EMPTY_FIELD: &str = "_";

/// One token of an annotated sentence.
///
/// `head` and `deprel` are the prediction targets; every other field is
/// passed through unchanged when a sentence is written back out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// 1-based position within the sentence.
    pub id: usize,
    /// Surface form.
    pub form: String,
    /// Lemma or `_`.
    pub lemma: String,
    /// Coarse-grained part-of-speech tag.
    pub cpostag: String,
    /// Fine-grained part-of-speech tag.
    pub postag: String,
    /// Morphological features or `_`.
    pub feats: String,
    /// Index of the governor, `0` for the root.
    pub head: usize,
    /// Dependency relation to the governor.
    pub deprel: String,
    /// Projective head (pass-through).
    pub phead: String,
    /// Projective relation (pass-through).
    pub pdeprel: String,
}

impl Token {
    /// Creates a token with the given position, form, head and relation.
    /// Every other field is set to `_`.
    #[must_use]
    pub fn new(id: usize, form: impl Into<String>, head: usize, deprel: impl Into<String>) -> Self {
        Self {
            id,
            form: form.into(),
            lemma: EMPTY_FIELD.into(),
            cpostag: EMPTY_FIELD.into(),
            postag: EMPTY_FIELD.into(),
            feats: EMPTY_FIELD.into(),
            head,
            deprel: deprel.into(),
            phead: EMPTY_FIELD.into(),
            pdeprel: EMPTY_FIELD.into(),
        }
    }

    /// Sets both part-of-speech columns.
    #[must_use]
    pub fn with_pos(mut self, cpostag: impl Into<String>, postag: impl Into<String>) -> Self {
        self.cpostag = cpostag.into();
        self.postag = postag.into();
        self
    }

    /// Sets the lemma column.
    #[must_use]
    pub fn with_lemma(mut self, lemma: impl Into<String>) -> Self {
        self.lemma = lemma.into();
        self
    }
}

/// An ordered sequence of tokens. The implicit root is not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sentence {
    pub tokens: Vec<Token>,
}

impl Sentence {
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// Number of tokens, excluding the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    /// Gold heads in token order.
    #[must_use]
    pub fn heads(&self) -> Vec<usize> {
        self.tokens.iter().map(|t| t.head).collect()
    }
}

impl From<Vec<Token>> for Sentence {
    fn from(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }
}

impl<'a> IntoIterator for &'a Sentence {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let forms: Vec<&str> = self.tokens.iter().map(|t| t.form.as_str()).collect();
        write!(f, "{}", forms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_token_fills_placeholders() {
        let token = Token::new(1, "Dog", 2, "nsubj");
        assert_eq!(token.lemma, "_");
        assert_eq!(token.feats, "_");
        assert_eq!(token.phead, "_");
        assert_eq!(token.head, 2);
    }

    #[test]
    fn sentence_display_joins_forms() {
        let sentence = Sentence::new(vec![
            Token::new(1, "Dog", 2, "nsubj"),
            Token::new(2, "barks", 0, "root"),
        ]);
        assert_eq!(sentence.to_string(), "Dog barks");
        assert_eq!(sentence.heads(), vec![2, 0]);
        assert_eq!(sentence.len(), 2);
    }
}
