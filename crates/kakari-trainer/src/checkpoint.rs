//! # Checkpoints
//!
//! A checkpoint is the model parameters (`<basename>.safetensors`) plus a
//! JSON context (`<basename>.context.json`) holding everything needed to
//! rebuild the model for testing: hyperparameters, the fitted data loader,
//! the batch size and the seed.

use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use kakari_core::{DataLoader, DependencyParser, ModelConfig};
use oorandom::Rand32;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, info_span, Span};

use crate::error::{Result, TrainError};
use crate::training::{EventContext, Listener, Observation};

/// Newest context layout this build reads and the one it writes.
pub const CONTEXT_VERSION: u32 = 1;

const MODEL_EXTENSION: &str = "safetensors";
const CONTEXT_EXTENSION: &str = "context.json";

fn default_batch_size() -> usize {
    5000
}

/// What `test` needs besides the parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointContext {
    pub version: u32,
    #[serde(default)]
    pub model: ModelConfig,
    pub loader: DataLoader,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl CheckpointContext {
    pub fn new(model: ModelConfig, loader: DataLoader, batch_size: usize, seed: Option<u64>) -> Self {
        Self {
            version: CONTEXT_VERSION,
            model,
            loader,
            batch_size,
            seed,
        }
    }
}

/// Context file belonging to a parameter file.
pub fn context_path(model_file: &Path) -> PathBuf {
    model_file.with_extension(CONTEXT_EXTENSION)
}

/// Reads the context saved next to `model_file`.
pub fn load_context(model_file: &Path) -> Result<CheckpointContext> {
    let path = context_path(model_file);
    let file = std::fs::File::open(&path).map_err(|e| {
        TrainError::Checkpoint(format!("cannot open {}: {e}", path.display()))
    })?;
    let context: CheckpointContext = serde_json::from_reader(BufReader::new(file))?;
    if context.version > CONTEXT_VERSION {
        return Err(TrainError::Checkpoint(format!(
            "{} has context version {}, this build reads up to {CONTEXT_VERSION}",
            path.display(),
            context.version
        )));
    }
    Ok(context)
}

fn write_context(path: &Path, context: &CheckpointContext) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, context)?;
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| TrainError::Io(e.error))?;
    Ok(())
}

/// Eight hex digits identifying one run.
pub fn access_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64);
    let mut rng = Rand32::new(nanos ^ u64::from(std::process::id()));
    format!("{:08x}", rng.rand_u32())
}

/// `<YYYYMMDD>-<access id>`.
pub fn default_basename() -> String {
    format!("{}-{}", chrono::Local::now().format("%Y%m%d"), access_id())
}

/// Reads the metric a [`Saver`] compares checkpoints by.
pub type Evaluate = Box<dyn Fn(&Observation) -> Option<f64>>;

/// Saves the model after validation.
///
/// With `save_best` (the default) a checkpoint is written only when the
/// metric strictly improves on every earlier value, always to the same
/// basename. Otherwise every epoch gets its own checkpoint. A missing
/// metric skips saving.
pub struct Saver {
    directory: PathBuf,
    basename: String,
    context: CheckpointContext,
    evaluate: Evaluate,
    save_best: bool,
    best: Option<f64>,
    saves: usize,
    span: Span,
}

impl Saver {
    pub fn new(
        directory: impl Into<PathBuf>,
        basename: impl Into<String>,
        context: CheckpointContext,
        evaluate: Evaluate,
    ) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        let basename = basename.into();
        let span = info_span!("saver", basename = %basename);
        Ok(Self {
            directory,
            basename,
            context,
            evaluate,
            save_best: true,
            best: None,
            saves: 0,
            span,
        })
    }

    pub fn with_save_best(mut self, save_best: bool) -> Self {
        self.save_best = save_best;
        self
    }

    /// Parameter file for `epoch`, or the single best-model file.
    pub fn model_path(&self, epoch: Option<usize>) -> PathBuf {
        let name = match epoch {
            Some(epoch) => format!("{}.epoch{epoch}.{MODEL_EXTENSION}", self.basename),
            None => format!("{}.{MODEL_EXTENSION}", self.basename),
        };
        self.directory.join(name)
    }

    pub fn saves(&self) -> usize {
        self.saves
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Saves `model` if the observed metric warrants it and returns the
    /// parameter file written.
    pub fn observe<M: DependencyParser>(
        &mut self,
        model: &M,
        epoch: usize,
        observation: &Observation,
    ) -> Result<Option<PathBuf>> {
        let _guard = self.span.clone().entered();
        let Some(value) = (self.evaluate)(observation).filter(|v| !v.is_nan()) else {
            debug!(epoch, "no metric to compare, skipping save");
            return Ok(None);
        };

        let improved = self.best.is_none_or(|best| value > best);
        if improved {
            self.best = Some(value);
        }
        let path = if self.save_best {
            if !improved {
                debug!(epoch, value, best = ?self.best, "no improvement");
                return Ok(None);
            }
            self.model_path(None)
        } else {
            self.model_path(Some(epoch))
        };

        self.save(model, &path)?;
        self.saves += 1;
        info!(epoch, value, path = %path.display(), "saved model");
        Ok(Some(path))
    }

    fn save<M: DependencyParser>(&self, model: &M, path: &Path) -> Result<()> {
        // Safetensors writes are not atomic; stage next to the target.
        let staging = path.with_extension(format!("{MODEL_EXTENSION}.tmp"));
        model.save(&staging)?;
        std::fs::rename(&staging, path)?;
        write_context(&context_path(path), &self.context)
    }
}

impl<M: DependencyParser> Listener<M> for Saver {
    fn name(&self) -> &str {
        "saver"
    }

    fn on_epoch_validate_end(&mut self, ctx: &mut EventContext<'_, M>) -> Result<()> {
        self.observe(ctx.model, ctx.epoch, ctx.observation)?;
        Ok(())
    }
}
