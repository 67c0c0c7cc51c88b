//! # Evaluator
//!
//! Accumulates predicted trees over a validation or test pass and scores
//! them with an external [`Scorer`].
//!
//! ```text
//! Empty --append--> Accumulating --report--> Scored
//!   ^                                          |
//!   +------------------- reset ----------------+
//! ```
//!
//! When scoring against the configured gold file fails (for instance
//! because bucketing reordered the sentences), the gold reference is
//! regenerated from the accumulated sentences and scoring is retried once.

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use kakari_core::conll::write_conll;
use kakari_core::types::{DeprelMap, ParseResult, Sentence};
use kakari_core::DependencyParser;
use tempfile::NamedTempFile;
use tracing::{error, info, info_span, warn, Span};

use crate::config::require_file;
use crate::error::{EvalError, Result};
use crate::scorer::{ScoreOutput, Scorer};
use crate::training::{EventContext, Listener};

/// Priority the `train` command registers the evaluator with.
pub const EVALUATOR_PRIORITY: i32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalState {
    Empty,
    Accumulating,
    Scored,
}

/// Attachment scores of the last report, unset when scoring failed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvaluationResult {
    pub uas: Option<f64>,
    pub las: Option<f64>,
}

pub struct Evaluator {
    scorer: Box<dyn Scorer>,
    deprels: DeprelMap,
    gold: PathBuf,
    sentences: Vec<Sentence>,
    heads: Vec<Vec<usize>>,
    labels: Vec<Vec<String>>,
    result: EvaluationResult,
    state: EvalState,
    span: Span,
}

impl Evaluator {
    pub fn new(
        scorer: Box<dyn Scorer>,
        deprels: DeprelMap,
        gold: impl AsRef<Path>,
    ) -> std::result::Result<Self, EvalError> {
        let mut evaluator = Self {
            scorer,
            deprels,
            gold: PathBuf::new(),
            sentences: Vec::new(),
            heads: Vec::new(),
            labels: Vec::new(),
            result: EvaluationResult::default(),
            state: EvalState::Empty,
            span: Span::none(),
        };
        evaluator.set_gold(gold)?;
        Ok(evaluator)
    }

    /// Points the evaluator at another gold file and resets it.
    pub fn set_gold(&mut self, gold: impl AsRef<Path>) -> std::result::Result<(), EvalError> {
        let gold = expand_home(gold.as_ref());
        let gold = std::path::absolute(&gold)?;
        require_file("gold file", &gold)?;
        self.span = info_span!("evaluator", gold = %gold.display());
        self.gold = gold;
        self.reset();
        Ok(())
    }

    pub fn gold(&self) -> &Path {
        &self.gold
    }

    pub fn reset(&mut self) {
        self.sentences.clear();
        self.heads.clear();
        self.labels.clear();
        self.result = EvaluationResult::default();
        self.state = EvalState::Empty;
    }

    /// Adds predictions for `sentences`, one [`ParseResult`] each.
    pub fn append(
        &mut self,
        sentences: &[Sentence],
        parsed: &[ParseResult],
    ) -> std::result::Result<(), EvalError> {
        if sentences.len() != parsed.len() {
            return Err(EvalError::LengthMismatch(format!(
                "{} sentences but {} predictions",
                sentences.len(),
                parsed.len()
            )));
        }
        for (i, (sentence, prediction)) in sentences.iter().zip(parsed).enumerate() {
            if prediction.heads.len() != sentence.len() || prediction.deprels.len() != sentence.len() {
                return Err(EvalError::LengthMismatch(format!(
                    "sentence {i} has {} tokens but {} heads and {} relations",
                    sentence.len(),
                    prediction.heads.len(),
                    prediction.deprels.len()
                )));
            }
        }

        for (sentence, prediction) in sentences.iter().zip(parsed) {
            self.sentences.push(sentence.clone());
            self.heads.push(prediction.heads.clone());
            self.labels.push(
                prediction
                    .deprels
                    .iter()
                    .map(|&id| self.deprels.lookup(id).to_string())
                    .collect(),
            );
        }
        if self.state == EvalState::Scored {
            self.result = EvaluationResult::default();
        }
        self.state = EvalState::Accumulating;
        Ok(())
    }

    /// Scores everything appended since the last reset.
    ///
    /// A scorer that keeps failing is logged and leaves the metrics unset;
    /// only unreadable scorer output or a scorer that cannot be started is
    /// returned as an error.
    pub fn report(&mut self, show_details: bool) -> std::result::Result<EvaluationResult, EvalError> {
        let span = self.span.clone();
        let _guard = span.enter();
        self.result = EvaluationResult::default();

        if self.sentences.is_empty() {
            warn!("[evaluation] no sentences to evaluate");
            self.state = EvalState::Scored;
            return Ok(self.result);
        }

        let hypothesis = self.write_temp(true)?;
        let mut output = self
            .scorer
            .score(hypothesis.path(), &self.gold, show_details)?;
        if !output.is_success() {
            warn!(code = output.code, "scoring failed, retrying against regenerated gold");
            let gold = self.write_temp(false)?;
            output = self
                .scorer
                .score(hypothesis.path(), gold.path(), show_details)?;
        }

        self.state = EvalState::Scored;
        self.record(&output);
        Ok(self.result)
    }

    fn record(&mut self, output: &ScoreOutput) {
        if output.is_success() {
            self.result = EvaluationResult {
                uas: output.uas,
                las: output.las,
            };
            info!(
                uas = ?output.uas,
                las = ?output.las,
                sentences = self.sentences.len(),
                "[evaluation]\n{}",
                output.raw.trim_end()
            );
        } else {
            error!("[evaluation] ERROR({}): {}", output.code, output.raw.trim_end());
        }
    }

    /// Writes the accumulated sentences, with predictions when `predicted`
    /// and with their own annotation otherwise.
    fn write_temp(&self, predicted: bool) -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("kakari-")
            .suffix(".conll")
            .tempfile()?;
        let mut writer = BufWriter::new(file.as_file_mut());
        if predicted {
            write_conll(
                &mut writer,
                &self.sentences,
                Some(self.heads.as_slice()),
                Some(self.labels.as_slice()),
            )?;
        } else {
            write_conll(&mut writer, &self.sentences, None, None)?;
        }
        drop(writer);
        Ok(file)
    }

    pub fn result(&self) -> EvaluationResult {
        self.result
    }

    pub fn state(&self) -> EvalState {
        self.state
    }

    /// Sentences appended since the last reset.
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

impl<M: DependencyParser> Listener<M> for Evaluator {
    fn name(&self) -> &str {
        "evaluator"
    }

    /// A batch that cannot be parsed or appended is logged and skipped.
    fn on_batch_end(&mut self, ctx: &mut EventContext<'_, M>) -> Result<()> {
        if ctx.train {
            return Ok(());
        }
        let Some(batch) = ctx.batch else {
            return Ok(());
        };
        let _guard = self.span.clone().entered();
        let parsed = match ctx.model.parse(&batch) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(epoch = ctx.epoch, error = %e, "[evaluation] parse failed, batch skipped");
                return Ok(());
            }
        };
        if let Err(e) = self.append(&batch.sentences(), &parsed) {
            error!(epoch = ctx.epoch, error = %e, "[evaluation] batch skipped");
        }
        Ok(())
    }

    fn on_epoch_validate_begin(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        self.reset();
        Ok(())
    }

    fn on_epoch_validate_end(&mut self, ctx: &mut EventContext<'_, M>) -> Result<()> {
        match self.report(false) {
            Ok(result) => {
                if let Some(uas) = result.uas {
                    ctx.observation.set("UAS", uas);
                }
                if let Some(las) = result.las {
                    ctx.observation.set("LAS", las);
                }
            }
            Err(e) => error!(error = %e, "[evaluation] scoring failed"),
        }
        Ok(())
    }
}
