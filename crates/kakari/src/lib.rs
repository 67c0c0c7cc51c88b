//! # Kakari
//!
//! Graph-based dependency parser training and evaluation.
//!
//! - [`kakari_core`]: CoNLL codec, vocabularies, batching and the parser model.
//! - [`kakari_trainer`]: training loop, evaluator, checkpoints and caching.

pub use kakari_core;
pub use kakari_trainer;

pub use kakari_core::{
    BaselineParser, DataLoader, Dataset, DependencyParser, ModelConfig, ParseResult, Sentence,
    Token,
};
pub use kakari_trainer::{Evaluator, Saver, ScorerConfig, TrainConfig, Trainer};
