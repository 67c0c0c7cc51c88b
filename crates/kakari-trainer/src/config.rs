//! # Run Configuration
//!
//! Plain serde structs with defaults and `with_*` builders. The binary
//! fills them from command-line flags; tests build them directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kakari_core::ModelConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Interpreter used to run the scoring script.
pub const DEFAULT_EVAL_PROGRAM: &str = "/usr/bin/perl";

/// Scoring script, resolved against the working directory.
pub const DEFAULT_EVAL_SCRIPT: &str = "eval.pl";

/// Upper bound on a single scoring run.
pub const DEFAULT_EVAL_TIMEOUT_SECS: u64 = 600;

/// Default cache directory
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kakari")
}

/// How to invoke the external attachment-score script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub program: PathBuf,
    pub script: PathBuf,
    /// Milliseconds before a run is killed; `None` waits forever.
    pub timeout_ms: Option<u64>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_EVAL_PROGRAM),
            script: PathBuf::from(DEFAULT_EVAL_SCRIPT),
            timeout_ms: Some(DEFAULT_EVAL_TIMEOUT_SECS * 1000),
        }
    }
}

impl ScorerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = script.into();
        self
    }

    /// Rounded up to whole milliseconds.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_ms = timeout.map(|t| {
            let ms = t.as_millis() + u128::from(t.subsec_nanos() % 1_000_000 != 0);
            u64::try_from(ms).unwrap_or(u64::MAX)
        });
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == Some(0) {
            return Err(invalid("scorer timeout", "must be positive, or unset to wait forever"));
        }
        Ok(())
    }
}

/// Everything the `train` command needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub train_file: PathBuf,
    /// Development treebank; enables evaluation and checkpointing.
    pub dev_file: Option<PathBuf>,
    pub n_epoch: usize,
    /// Token budget of a mini-batch.
    pub batch_size: usize,
    pub lr: f64,
    pub model: ModelConfig,
    pub seed: Option<u64>,
    pub cache_dir: PathBuf,
    pub refresh_cache: bool,
    pub save_dir: Option<PathBuf>,
    pub scorer: ScorerConfig,
    pub grad_clip: f64,
    pub decay_rate: f64,
    pub decay_step: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_file: PathBuf::new(),
            dev_file: None,
            n_epoch: 20,
            batch_size: 5000,
            lr: 2e-3,
            model: ModelConfig::default(),
            seed: None,
            cache_dir: default_cache_dir(),
            refresh_cache: false,
            save_dir: None,
            scorer: ScorerConfig::default(),
            grad_clip: 5.0,
            decay_rate: 0.75,
            decay_step: 5000,
        }
    }
}

impl TrainConfig {
    pub fn new(train_file: impl Into<PathBuf>) -> Self {
        Self {
            train_file: train_file.into(),
            ..Self::default()
        }
    }

    pub fn with_dev_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.dev_file = Some(path.into());
        self
    }

    pub fn with_epochs(mut self, n_epoch: usize) -> Self {
        self.n_epoch = n_epoch;
        self
    }

    pub fn with_batch_size(mut self, tokens: usize) -> Self {
        self.batch_size = tokens;
        self
    }

    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_refresh_cache(mut self, refresh: bool) -> Self {
        self.refresh_cache = refresh;
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    pub fn with_scorer(mut self, scorer: ScorerConfig) -> Self {
        self.scorer = scorer;
        self
    }

    /// Checks the values that would otherwise fail deep inside training.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_file("training file", &self.train_file)?;
        if let Some(dev) = &self.dev_file {
            require_file("development file", dev)?;
        }
        if let Some(dir) = &self.save_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(ConfigError::NotADirectory {
                    what: "save directory",
                    path: dir.clone(),
                });
            }
        }
        if self.n_epoch == 0 {
            return Err(invalid("epoch", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch size", "must be at least 1 token"));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(invalid("learning rate", format!("{} is not positive", self.lr)));
        }
        if !(0.0..1.0).contains(&self.model.dropout_ratio) {
            return Err(invalid(
                "dropout",
                format!("{} is outside [0, 1)", self.model.dropout_ratio),
            ));
        }
        if self.decay_step == 0 {
            return Err(invalid("decay step", "must be at least 1"));
        }
        self.scorer.validate()
    }
}

pub(crate) fn require_file(what: &'static str, path: &Path) -> Result<(), ConfigError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConfigError::MissingFile {
            what,
            path: path.to_path_buf(),
        })
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}
