use std::path::PathBuf;

use kakari_core::CoreError;
use thiserror::Error;

/// Setup problems detected before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required file does not exist.
    #[error("{what} not found: {}", path.display())]
    MissingFile { what: &'static str, path: PathBuf },

    /// A directory was expected.
    #[error("{what} is not a directory: {}", path.display())]
    NotADirectory { what: &'static str, path: PathBuf },

    /// A value is out of range or otherwise unusable.
    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Errors raised by the content-addressed cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The factory producing the value failed; nothing was persisted.
    #[error("failed to compute cache entry: {0}")]
    Compute(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while running the external scorer.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// The scorer process could not be started.
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The scorer exited successfully but its output could not be read.
    #[error("unreadable scorer output ({message}): {raw}")]
    Parse { message: String, raw: String },

    #[error("scorer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised by the evaluator.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Sentences and predictions do not line up.
    #[error("length mismatch: {0}")]
    LengthMismatch(String),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("evaluation I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors that can occur while training or testing a parser.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Candle ML framework error.
    #[error("ML error: {0}")]
    Candle(#[from] candle_core::Error),

    /// A checkpoint could not be written or read back.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for trainer operations.
pub type Result<T> = std::result::Result<T, TrainError>;
