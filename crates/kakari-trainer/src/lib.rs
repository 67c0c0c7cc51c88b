//! # Kakari Trainer
//!
//! Training orchestration and evaluation for Kakari parsers: an
//! event-driven training loop with prioritized listeners, an evaluator
//! that scores predictions with the external CoNLL script, checkpointing
//! of the best model, and an on-disk cache for prepared data.

pub mod app;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod scorer;
pub mod training;

// Re-export primary API
pub use cache::{CacheKey, ContentCache};
pub use checkpoint::{CheckpointContext, Saver};
pub use config::{ScorerConfig, TrainConfig};
pub use error::{CacheError, ConfigError, EvalError, Result, ScoringError, TrainError};
pub use evaluator::{EvalState, EvaluationResult, Evaluator};
pub use scorer::{ExternalScorer, ScoreOutput, Scorer};
pub use training::{Event, EventContext, Listener, Observation, Trainer};
