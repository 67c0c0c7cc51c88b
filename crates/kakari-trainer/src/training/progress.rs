//! Terminal progress bar over the sentences of a phase.

use indicatif::{ProgressBar, ProgressStyle};
use kakari_core::DependencyParser;

use crate::error::Result;
use crate::training::event::EventContext;
use crate::training::listener::Listener;

/// Priority the `train` command registers the progress bar with.
pub const PROGRESS_PRIORITY: i32 = 200;

/// Draws one bar per training or validation pass.
pub struct ProgressListener {
    bar: Option<ProgressBar>,
    hidden: bool,
}

impl ProgressListener {
    pub fn new() -> Self {
        Self {
            bar: None,
            hidden: false,
        }
    }

    /// Tracks progress without drawing anything.
    pub fn hidden() -> Self {
        Self {
            bar: None,
            hidden: true,
        }
    }

    /// Starts a new bar of `total` sentences, replacing any previous one.
    pub fn start(&mut self, total: usize, prefix: &str) {
        self.finish();
        let bar = if self.hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        bar.set_length(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:>8} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar.set_prefix(prefix.to_string());
        self.bar = Some(bar);
    }

    pub fn advance(&mut self, sentences: usize, message: Option<String>) {
        if let Some(bar) = &self.bar {
            if let Some(message) = message {
                bar.set_message(message);
            }
            bar.inc(sentences as u64);
        }
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    /// Sentences counted so far in the current bar.
    pub fn position(&self) -> u64 {
        self.bar.as_ref().map_or(0, ProgressBar::position)
    }
}

impl Default for ProgressListener {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: DependencyParser> Listener<M> for ProgressListener {
    fn name(&self) -> &str {
        "progress"
    }

    fn on_epoch_train_begin(&mut self, ctx: &mut EventContext<'_, M>) -> Result<()> {
        self.start(ctx.size, &format!("{}/{}", ctx.epoch, ctx.n_epoch));
        Ok(())
    }

    fn on_epoch_validate_begin(&mut self, ctx: &mut EventContext<'_, M>) -> Result<()> {
        self.start(ctx.size, "valid");
        Ok(())
    }

    fn on_batch_end(&mut self, ctx: &mut EventContext<'_, M>) -> Result<()> {
        let sentences = ctx.batch.map_or(0, |b| b.len());
        self.advance(sentences, ctx.loss.map(|loss| format!("loss: {loss:.4}")));
        Ok(())
    }

    fn on_epoch_train_end(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        self.finish();
        Ok(())
    }

    fn on_epoch_validate_end(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        self.finish();
        Ok(())
    }
}
