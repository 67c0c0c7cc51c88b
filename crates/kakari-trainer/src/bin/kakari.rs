//! Kakari command-line interface
//!
//! `kakari train` fits a parser on a treebank, validating and saving the
//! best model when a development file is given. `kakari test` scores a
//! saved model on a test treebank.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kakari_core::ModelConfig;
use kakari_trainer::app;
use kakari_trainer::config::{
    default_cache_dir, DEFAULT_EVAL_PROGRAM, DEFAULT_EVAL_SCRIPT, DEFAULT_EVAL_TIMEOUT_SECS,
};
use kakari_trainer::{ScorerConfig, TrainConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI arguments
#[derive(Parser)]
#[command(name = "kakari")]
#[command(about = "Train and evaluate graph-based dependency parsers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// External scorer options
#[derive(Args)]
struct ScorerArgs {
    /// CoNLL evaluation script
    #[arg(long = "eval-script", env = "KAKARI_EVAL_SCRIPT", default_value = DEFAULT_EVAL_SCRIPT, value_name = "FILE")]
    script: PathBuf,

    /// Interpreter running the evaluation script
    #[arg(long = "eval-program", env = "KAKARI_EVAL_PROGRAM", default_value = DEFAULT_EVAL_PROGRAM, value_name = "FILE")]
    program: PathBuf,

    /// Seconds before a scoring run is killed (0 waits forever)
    #[arg(long = "eval-timeout", default_value_t = DEFAULT_EVAL_TIMEOUT_SECS, value_name = "SECS")]
    timeout: u64,
}

impl ScorerArgs {
    fn into_config(self) -> ScorerConfig {
        let timeout = (self.timeout > 0).then(|| Duration::from_secs(self.timeout));
        ScorerConfig::new()
            .with_program(self.program)
            .with_script(self.script)
            .with_timeout(timeout)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Train a parser
    Train {
        /// Training data file
        #[arg(long = "trainfile", value_name = "FILE")]
        train_file: PathBuf,

        /// Development data file
        #[arg(long = "devfile", value_name = "FILE")]
        dev_file: Option<PathBuf>,

        /// Number of sweeps over the dataset to train
        #[arg(long = "epoch", default_value_t = 20, value_name = "NUM")]
        n_epoch: usize,

        /// Number of tokens in each mini-batch
        #[arg(long = "batchsize", default_value_t = 5000, value_name = "NUM")]
        batch_size: usize,

        /// Learning rate
        #[arg(long, default_value_t = 2e-3, allow_negative_numbers = true, value_name = "VALUE")]
        lr: f64,

        /// Dropout ratio
        #[arg(long = "dropout", default_value_t = 0.33, allow_negative_numbers = true, value_name = "PROB")]
        dropout_ratio: f64,

        /// Random seed
        #[arg(long, value_name = "VALUE")]
        seed: Option<u64>,

        /// Cache directory
        #[arg(long = "cachedir", env = "KAKARI_CACHE_DIR", value_name = "DIR")]
        cache_dir: Option<PathBuf>,

        /// Refresh cache
        #[arg(short, long)]
        refresh: bool,

        /// Directory to save the model
        #[arg(long = "savedir", value_name = "DIR")]
        save_dir: Option<PathBuf>,

        #[command(flatten)]
        scorer: ScorerArgs,
    },
    /// Evaluate a trained model
    Test {
        /// Trained model file
        #[arg(long = "modelfile", value_name = "FILE")]
        model_file: PathBuf,

        /// Test data file
        #[arg(long = "testfile", value_name = "FILE")]
        test_file: PathBuf,

        #[command(flatten)]
        scorer: ScorerArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            train_file,
            dev_file,
            n_epoch,
            batch_size,
            lr,
            dropout_ratio,
            seed,
            cache_dir,
            refresh,
            save_dir,
            scorer,
        } => {
            let mut config = TrainConfig::new(train_file)
                .with_epochs(n_epoch)
                .with_batch_size(batch_size)
                .with_lr(lr)
                .with_model(ModelConfig::new().with_dropout(dropout_ratio))
                .with_seed(seed)
                .with_cache_dir(cache_dir.unwrap_or_else(default_cache_dir))
                .with_refresh_cache(refresh)
                .with_scorer(scorer.into_config());
            if let Some(dev_file) = dev_file {
                config = config.with_dev_file(dev_file);
            }
            if let Some(save_dir) = save_dir {
                config = config.with_save_dir(save_dir);
            }

            let outcome = app::train(&config).context("Training failed")?;
            match outcome.model_file {
                Some(path) => info!(path = %path.display(), steps = outcome.steps, "done"),
                None => info!(steps = outcome.steps, "done"),
            }
        }
        Commands::Test {
            model_file,
            test_file,
            scorer,
        } => {
            let result = app::test(&model_file, &test_file, &scorer.into_config())
                .with_context(|| format!("Testing {} failed", model_file.display()))?;
            match (result.uas, result.las) {
                (Some(uas), Some(las)) => info!(uas, las, "done"),
                _ => info!("done without scores"),
            }
        }
    }

    Ok(())
}
