//! # Commands
//!
//! The two end-to-end workflows behind the `kakari` binary: training a
//! parser (with optional validation and checkpointing) and evaluating a
//! saved checkpoint on a test treebank.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use candle_core::Device;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use kakari_core::{BaselineParser, DataLoader, Dataset, DependencyParser};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::{code_fingerprint, CacheKey, ContentCache};
use crate::checkpoint::{default_basename, load_context, CheckpointContext, Saver};
use crate::config::{require_file, ScorerConfig, TrainConfig};
use crate::error::{ConfigError, Result};
use crate::evaluator::{EvaluationResult, Evaluator, EVALUATOR_PRIORITY};
use crate::scorer::ExternalScorer;
use crate::training::{
    parameter_count, Event, ExponentialDecayAnnealing, GradientClipping, Observation,
    ProgressListener, Trainer, DEFAULT_PRIORITY, PROGRESS_PRIORITY,
};

/// Fitted loader and encoded datasets, as stored in the cache.
#[derive(Debug, Serialize, Deserialize)]
struct PreparedData {
    loader: DataLoader,
    train: Dataset,
    dev: Option<Dataset>,
}

/// What a finished training run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutcome {
    pub seed: u64,
    pub steps: u64,
    /// Best checkpoint, when one was saved.
    pub model_file: Option<PathBuf>,
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

fn prepare(config: &TrainConfig) -> Result<PreparedData> {
    let key = CacheKey::new(code_fingerprint())
        .with_file(&config.train_file)?
        .with_optional_file(config.dev_file.as_deref())?;
    let cache = ContentCache::new(&config.cache_dir, true)?;

    let prepared = cache.load_or_create(&key, config.refresh_cache, || {
        let mut loader = DataLoader::new();
        let train = loader.load(&config.train_file, true, true)?;
        let dev = match &config.dev_file {
            Some(path) => Some(loader.load(path, false, true)?),
            None => None,
        };
        Ok::<_, kakari_core::CoreError>(PreparedData { loader, train, dev })
    })?;

    if prepared.train.is_empty() {
        return Err(ConfigError::Invalid {
            field: "training file",
            message: format!("{} contains no sentences", config.train_file.display()),
        }
        .into());
    }
    Ok(prepared)
}

/// Trains a parser as configured.
pub fn train(config: &TrainConfig) -> Result<TrainOutcome> {
    config.validate()?;
    // Governs batch shuffling only; candle's CPU generator cannot be seeded.
    let seed = config.seed.unwrap_or_else(time_seed);
    info!(seed, "random seed");

    let PreparedData { loader, train, dev } = prepare(config)?;
    info!(
        train = train.len(),
        dev = dev.as_ref().map_or(0, Dataset::len),
        words = loader.words().len(),
        tags = loader.tags().len(),
        relations = loader.deprels().len(),
        "data prepared"
    );

    let model = BaselineParser::new(&config.model, &loader, &Device::Cpu)?;
    info!(parameters = parameter_count(&model.trainable_vars()), "model built");
    let optimizer = AdamW::new(
        model.trainable_vars(),
        ParamsAdamW {
            lr: config.lr,
            beta1: 0.9,
            beta2: 0.9,
            eps: 1e-12,
            weight_decay: 0.0,
        },
    )?;

    let mut trainer = Trainer::new(model, optimizer).with_shuffle(seed);
    trainer.add_optimizer_hook(Box::new(GradientClipping::new(config.grad_clip)));
    trainer.add_optimizer_hook(Box::new(ExponentialDecayAnnealing::new(
        config.lr,
        config.decay_rate,
        config.decay_step,
    )));
    trainer.add_listener(Box::new(ProgressListener::new()), PROGRESS_PRIORITY);
    trainer.add_hook(
        Event::BatchEnd,
        DEFAULT_PRIORITY,
        Box::new(|ctx| {
            if let (Some(ys), Some(batch)) = (ctx.ys, ctx.batch) {
                let accuracy = ctx.model.compute_accuracy(ys, &batch)?;
                ctx.observation.report("arc_accuracy", accuracy.arc);
                ctx.observation.report("rel_accuracy", accuracy.rel);
            }
            Ok(())
        }),
    );

    let mut model_file = None;
    match &config.dev_file {
        Some(dev_file) => {
            let scorer = ExternalScorer::from_config(&config.scorer)?;
            let evaluator = Evaluator::new(Box::new(scorer), loader.deprels().clone(), dev_file)?;
            trainer.add_listener(Box::new(evaluator), EVALUATOR_PRIORITY);

            if let Some(save_dir) = &config.save_dir {
                let context = CheckpointContext::new(
                    config.model.clone(),
                    loader.clone(),
                    config.batch_size,
                    Some(seed),
                );
                let saver = Saver::new(
                    save_dir,
                    default_basename(),
                    context,
                    Box::new(|obs: &Observation| obs.get("UAS")),
                )?;
                model_file = Some(saver.model_path(None));
                trainer.add_listener(Box::new(saver), DEFAULT_PRIORITY);
            }
        }
        None if config.save_dir.is_some() => {
            warn!("no development file, models will not be saved");
        }
        None => {}
    }

    trainer.fit(&train, dev.as_ref(), config.n_epoch, config.batch_size)?;

    let model_file = model_file.filter(|path| path.exists());
    if let Some(path) = &model_file {
        info!(path = %path.display(), "best model");
    }
    Ok(TrainOutcome {
        seed,
        steps: trainer.steps(),
        model_file,
    })
}

/// Parses `test_file` with a saved model and scores the result.
pub fn test(model_file: &Path, test_file: &Path, scorer: &ScorerConfig) -> Result<EvaluationResult> {
    require_file("model file", model_file)?;
    require_file("test file", test_file)?;

    let mut context = load_context(model_file)?;
    let dataset = context.loader.load(test_file, false, true)?;
    let model = BaselineParser::load(&context.model, &context.loader, model_file, &Device::Cpu)?;
    info!(
        model = %model_file.display(),
        sentences = dataset.len(),
        "testing"
    );

    let scorer = ExternalScorer::from_config(scorer)?;
    let mut evaluator = Evaluator::new(Box::new(scorer), context.loader.deprels().clone(), test_file)?;
    let mut progress = ProgressListener::new();
    progress.start(dataset.len(), "test");
    for batch in dataset.batches(context.batch_size, None) {
        let parsed = model.parse(&batch)?;
        evaluator.append(&batch.sentences(), &parsed)?;
        progress.advance(batch.len(), None);
    }
    progress.finish();

    Ok(evaluator.report(false)?)
}
