use serde::{Deserialize, Serialize};

/// Predicted structure for one sentence.
///
/// `heads[i]` and `deprels[i]` belong to the token at position `i + 1`.
/// Relation ids are signed: anything non-positive means "no relation" and
/// resolves to the default label of the relation map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    pub heads: Vec<usize>,
    pub deprels: Vec<i64>,
}

impl ParseResult {
    #[must_use]
    pub fn new(heads: Vec<usize>, deprels: Vec<i64>) -> Self {
        Self { heads, deprels }
    }

    /// Number of predicted tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Returns `true` when `heads` and `deprels` have the same length.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.heads.len() == self.deprels.len()
    }
}
