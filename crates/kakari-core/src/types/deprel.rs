use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Label bound to id 0 unless another default is given.
pub const DEFAULT_DEPREL: &str = "dep";

/// Bijection between dependency relation labels and small integer ids.
///
/// Id 0 is always the default label. Lookups of non-positive ids, or ids
/// the map has never assigned, resolve to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct DeprelMap {
    labels: Vec<String>,
    index: HashMap<String, u32>,
}

impl DeprelMap {
    /// Creates a map whose id 0 is `default_label`.
    #[must_use]
    pub fn new(default_label: impl Into<String>) -> Self {
        let default_label = default_label.into();
        let mut index = HashMap::new();
        index.insert(default_label.clone(), 0);
        Self {
            labels: vec![default_label],
            index,
        }
    }

    /// Returns the id of `label`, assigning the next free id if it is new.
    pub fn add(&mut self, label: &str) -> u32 {
        if let Some(&id) = self.index.get(label) {
            return id;
        }
        let id = self.labels.len() as u32;
        self.labels.push(label.to_string());
        self.index.insert(label.to_string(), id);
        id
    }

    #[must_use]
    pub fn id(&self, label: &str) -> Option<u32> {
        self.index.get(label).copied()
    }

    /// Id of `label`, or 0 when the label is unknown.
    #[must_use]
    pub fn id_or_default(&self, label: &str) -> u32 {
        self.id(label).unwrap_or(0)
    }

    /// Label for an exact id.
    #[must_use]
    pub fn label(&self, id: u32) -> Option<&str> {
        self.labels.get(id as usize).map(String::as_str)
    }

    /// Label for a predicted id.
    #[must_use]
    pub fn lookup(&self, id: i64) -> &str {
        if id <= 0 {
            return self.default_label();
        }
        u32::try_from(id)
            .ok()
            .and_then(|id| self.label(id))
            .unwrap_or_else(|| self.default_label())
    }

    #[must_use]
    pub fn default_label(&self) -> &str {
        &self.labels[0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// A relation map always holds at least the default label.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for DeprelMap {
    fn default() -> Self {
        Self::new(DEFAULT_DEPREL)
    }
}

impl From<Vec<String>> for DeprelMap {
    fn from(labels: Vec<String>) -> Self {
        let mut iter = labels.into_iter();
        let mut map = Self::new(iter.next().unwrap_or_else(|| DEFAULT_DEPREL.to_string()));
        for label in iter {
            map.add(&label);
        }
        map
    }
}

impl From<DeprelMap> for Vec<String> {
    fn from(map: DeprelMap) -> Self {
        map.labels
    }
}
