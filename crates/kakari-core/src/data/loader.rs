use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conll;
use crate::data::dataset::{Dataset, Sample};
use crate::data::vocab::{Vocab, ROOT_ID};
use crate::error::{CoreError, Result};
use crate::types::{DeprelMap, Sentence};

/// Turns treebank files into encoded datasets.
///
/// Owns the word and tag vocabularies and the relation map. Loading with
/// `train = true` grows them; loading with `train = false` maps unseen
/// entries to the unknown id (words, tags) or the default relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataLoader {
    words: Vocab,
    tags: Vocab,
    deprels: DeprelMap,
    #[serde(default = "default_lowercase")]
    lowercase: bool,
}

fn default_lowercase() -> bool {
    true
}

impl DataLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            words: Vocab::new(),
            tags: Vocab::new(),
            deprels: DeprelMap::default(),
            lowercase: true,
        }
    }

    /// Keep word forms as written instead of lowercasing them.
    #[must_use]
    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    /// Reads and encodes a treebank file.
    pub fn load<P: AsRef<Path>>(&mut self, path: P, train: bool, bucketing: bool) -> Result<Dataset> {
        let path = path.as_ref();
        let sentences = conll::read_file(path)?;
        debug!(
            path = %path.display(),
            sentences = sentences.len(),
            train,
            "loaded treebank"
        );
        self.encode(sentences, train, bucketing)
    }

    /// Encodes already decoded sentences.
    pub fn encode(
        &mut self,
        sentences: Vec<Sentence>,
        train: bool,
        bucketing: bool,
    ) -> Result<Dataset> {
        let mut samples = Vec::with_capacity(sentences.len());
        for sentence in sentences {
            if sentence.is_empty() {
                continue;
            }
            samples.push(self.encode_sentence(sentence, train)?);
        }

        let mut dataset = Dataset::new(samples);
        if bucketing {
            dataset.bucket();
        }
        Ok(dataset)
    }

    fn encode_sentence(&mut self, sentence: Sentence, train: bool) -> Result<Sample> {
        let n = sentence.len();
        let mut words = Vec::with_capacity(n + 1);
        let mut tags = Vec::with_capacity(n + 1);
        let mut heads = Vec::with_capacity(n);
        let mut deprels = Vec::with_capacity(n);

        words.push(ROOT_ID);
        tags.push(ROOT_ID);

        for token in &sentence {
            if token.head > n {
                return Err(CoreError::InvalidDataset(format!(
                    "token {} of \"{sentence}\" points at head {} beyond sentence length {n}",
                    token.id, token.head
                )));
            }
            let form = if self.lowercase {
                token.form.to_lowercase()
            } else {
                token.form.clone()
            };
            if train {
                words.push(self.words.add(&form));
                tags.push(self.tags.add(&token.postag));
                deprels.push(self.deprels.add(&token.deprel));
            } else {
                words.push(self.words.id(&form));
                tags.push(self.tags.id(&token.postag));
                deprels.push(self.deprels.id_or_default(&token.deprel));
            }
            heads.push(token.head as u32);
        }

        Ok(Sample {
            words,
            tags,
            heads,
            deprels,
            sentence,
        })
    }

    #[must_use]
    pub fn words(&self) -> &Vocab {
        &self.words
    }

    #[must_use]
    pub fn tags(&self) -> &Vocab {
        &self.tags
    }

    #[must_use]
    pub fn deprels(&self) -> &DeprelMap {
        &self.deprels
    }
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}
