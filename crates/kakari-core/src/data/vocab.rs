use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Id 0: out-of-vocabulary entries.
pub const UNKNOWN: &str = "<unk>";
/// Id 1: the implicit root prepended to every sentence.
pub const ROOT: &str = "<root>";

pub const UNKNOWN_ID: u32 = 0;
pub const ROOT_ID: u32 = 1;

/// String-to-id vocabulary with reserved unknown and root entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocab {
    entries: Vec<String>,
    index: HashMap<String, u32>,
}

impl Vocab {
    #[must_use]
    pub fn new() -> Self {
        let mut vocab = Self {
            entries: Vec::new(),
            index: HashMap::new(),
        };
        vocab.add(UNKNOWN);
        vocab.add(ROOT);
        vocab
    }

    /// Returns the id of `entry`, assigning a new one if needed.
    pub fn add(&mut self, entry: &str) -> u32 {
        if let Some(&id) = self.index.get(entry) {
            return id;
        }
        let id = self.entries.len() as u32;
        self.entries.push(entry.to_string());
        self.index.insert(entry.to_string(), id);
        id
    }

    /// Id of `entry`, or [`UNKNOWN_ID`].
    #[must_use]
    pub fn id(&self, entry: &str) -> u32 {
        self.index.get(entry).copied().unwrap_or(UNKNOWN_ID)
    }

    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.index.contains_key(entry)
    }

    #[must_use]
    pub fn entry(&self, id: u32) -> Option<&str> {
        self.entries.get(id as usize).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Vocab {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<String>> for Vocab {
    fn from(entries: Vec<String>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.clone(), i as u32))
            .collect();
        Self { entries, index }
    }
}

impl From<Vocab> for Vec<String> {
    fn from(vocab: Vocab) -> Self {
        vocab.entries
    }
}
