//! Encoded samples, datasets and token-budget batching.

use oorandom::Rand32;
use serde::{Deserialize, Serialize};

use crate::types::Sentence;

/// One sentence encoded for the model.
///
/// `words` and `tags` start with the root entry, so they are one longer
/// than the sentence. `heads` and `deprels` hold the gold targets of the
/// real tokens only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub words: Vec<u32>,
    pub tags: Vec<u32>,
    pub heads: Vec<u32>,
    pub deprels: Vec<u32>,
    pub sentence: Sentence,
}

impl Sample {
    /// Number of real tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sentence.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sentence.is_empty()
    }
}

/// An ordered collection of samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    #[must_use]
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Sorts samples by length so that batches hold sentences of similar size.
    pub fn bucket(&mut self) {
        self.samples.sort_by_key(Sample::len);
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn num_tokens(&self) -> usize {
        self.samples.iter().map(Sample::len).sum()
    }

    /// Splits the dataset into contiguous batches of at most `batch_size`
    /// tokens. A sentence longer than the budget gets a batch of its own.
    /// When `rng` is given the batch order is shuffled.
    pub fn batches(&self, batch_size: usize, rng: Option<&mut Rand32>) -> Vec<Batch<'_>> {
        let budget = batch_size.max(1);
        let mut batches = Vec::new();
        let mut start = 0;
        let mut tokens = 0;

        for (i, sample) in self.samples.iter().enumerate() {
            if i > start && tokens + sample.len() > budget {
                batches.push(Batch::new(&self.samples[start..i]));
                start = i;
                tokens = 0;
            }
            tokens += sample.len();
        }
        if start < self.samples.len() {
            batches.push(Batch::new(&self.samples[start..]));
        }

        if let Some(rng) = rng {
            for i in (1..batches.len()).rev() {
                let j = rng.rand_range(0..(i as u32 + 1)) as usize;
                batches.swap(i, j);
            }
        }

        batches
    }
}

impl FromIterator<Sample> for Dataset {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A borrowed run of consecutive samples.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub samples: &'a [Sample],
}

impl<'a> Batch<'a> {
    #[must_use]
    pub fn new(samples: &'a [Sample]) -> Self {
        Self { samples }
    }

    /// Number of sentences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn num_tokens(&self) -> usize {
        self.samples.iter().map(Sample::len).sum()
    }

    /// The batch's sentences, root excluded.
    #[must_use]
    pub fn sentences(&self) -> Vec<Sentence> {
        self.samples.iter().map(|s| s.sentence.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Token;

    fn sample(len: usize) -> Sample {
        let tokens = (1..=len).map(|i| Token::new(i, "w", 0, "root")).collect();
        Sample {
            words: vec![1; len + 1],
            tags: vec![1; len + 1],
            heads: vec![0; len],
            deprels: vec![0; len],
            sentence: Sentence::new(tokens),
        }
    }

    fn dataset(lens: &[usize]) -> Dataset {
        lens.iter().map(|&l| sample(l)).collect()
    }

    #[test]
    fn batches_respect_token_budget() {
        let ds = dataset(&[3, 3, 3, 3]);
        let batches = ds.batches(7, None);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2]);
        assert!(batches.iter().all(|b| b.num_tokens() <= 7));
    }

    #[test]
    fn oversized_sentence_gets_its_own_batch() {
        let ds = dataset(&[2, 10, 2]);
        let sizes: Vec<usize> = ds.batches(5, None).iter().map(Batch::num_tokens).collect();
        assert_eq!(sizes, vec![2, 10, 2]);
    }

    #[test]
    fn batches_cover_every_sample_once() {
        let ds = dataset(&[1, 2, 3, 4, 5, 6, 7]);
        let mut rng = Rand32::new(42);
        let batches = ds.batches(6, Some(&mut rng));
        let total: usize = batches.iter().map(Batch::len).sum();
        assert_eq!(total, ds.len());
        assert_eq!(
            batches.iter().map(Batch::num_tokens).sum::<usize>(),
            ds.num_tokens()
        );
    }

    #[test]
    fn shuffling_is_deterministic_for_a_seed() {
        let ds = dataset(&[1, 1, 1, 1, 1, 1, 1, 1]);
        let order = |seed| {
            let mut rng = Rand32::new(seed);
            ds.batches(1, Some(&mut rng))
                .iter()
                .map(|b| b.samples.as_ptr() as usize)
                .collect::<Vec<_>>()
        };
        assert_eq!(order(7), order(7));
    }

    #[test]
    fn bucketing_sorts_by_length() {
        let mut ds = dataset(&[5, 1, 3]);
        ds.bucket();
        let lens: Vec<usize> = ds.samples().iter().map(Sample::len).collect();
        assert_eq!(lens, vec![1, 3, 5]);
    }

    #[test]
    fn empty_dataset_has_no_batches() {
        assert!(Dataset::default().batches(100, None).is_empty());
    }
}
