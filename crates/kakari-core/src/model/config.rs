use serde::{Deserialize, Serialize};

/// Hyperparameters needed to rebuild a parser.
///
/// Stored in checkpoint contexts; fields added later must carry a serde
/// default so older checkpoints keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub word_embed_size: usize,
    pub tag_embed_size: usize,
    pub hidden_size: usize,
    pub arc_mlp_units: usize,
    pub rel_mlp_units: usize,
    pub dropout_ratio: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            word_embed_size: 100,
            tag_embed_size: 100,
            hidden_size: 400,
            arc_mlp_units: 500,
            rel_mlp_units: 100,
            dropout_ratio: 0.33,
        }
    }
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored as given; range checks belong to whoever accepts the value.
    pub fn with_dropout(mut self, ratio: f64) -> Self {
        self.dropout_ratio = ratio;
        self
    }

    pub fn with_hidden_size(mut self, size: usize) -> Self {
        self.hidden_size = size;
        self
    }

    pub fn with_embed_sizes(mut self, word: usize, tag: usize) -> Self {
        self.word_embed_size = word;
        self.tag_embed_size = tag;
        self
    }

    pub fn with_mlp_units(mut self, arc: usize, rel: usize) -> Self {
        self.arc_mlp_units = arc;
        self.rel_mlp_units = rel;
        self
    }
}
