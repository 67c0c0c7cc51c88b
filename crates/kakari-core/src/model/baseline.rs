//! # Baseline Graph Parser
//!
//! A small arc-factored parser: word and tag embeddings feed a tanh
//! projection, a bilinear-style product scores every (dependent, head)
//! pair, and a classifier over the (dependent, head) pair picks the
//! relation. Runs on candle, CPU by default.

use std::path::Path;

use candle_core::{D, DType, Device, Tensor, Var};
use candle_nn::{Embedding, Linear, Module, VarBuilder, VarMap};

use crate::data::{Batch, DataLoader, Sample};
use crate::error::{CoreError, Result};
use crate::model::{Accuracy, DependencyParser, ModelConfig};
use crate::types::ParseResult;

/// Scores for one sentence of `n` tokens.
#[derive(Debug, Clone)]
pub struct SentenceScores {
    /// `[n, n + 1]`: row `i` scores every candidate head of token `i + 1`,
    /// column 0 being the root.
    pub arcs: Tensor,
    /// `[n, n_rels]`: relation scores given the gold heads.
    pub rels: Tensor,
}

pub struct BaselineParser {
    config: ModelConfig,
    varmap: VarMap,
    word_embed: Embedding,
    tag_embed: Embedding,
    encoder: Linear,
    arc_dep: Linear,
    arc_head: Linear,
    rel_dep: Linear,
    rel_head: Linear,
    rel_out: Linear,
    device: Device,
}

impl BaselineParser {
    /// Builds a freshly initialized parser sized for the loader's
    /// vocabularies.
    pub fn new(config: &ModelConfig, loader: &DataLoader, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let word_embed = candle_nn::embedding(
            loader.words().len(),
            config.word_embed_size,
            vb.pp("word_embed"),
        )?;
        let tag_embed =
            candle_nn::embedding(loader.tags().len(), config.tag_embed_size, vb.pp("tag_embed"))?;
        let encoder = candle_nn::linear(
            config.word_embed_size + config.tag_embed_size,
            config.hidden_size,
            vb.pp("encoder"),
        )?;
        let arc_dep = candle_nn::linear(config.hidden_size, config.arc_mlp_units, vb.pp("arc_dep"))?;
        let arc_head =
            candle_nn::linear(config.hidden_size, config.arc_mlp_units, vb.pp("arc_head"))?;
        let rel_dep = candle_nn::linear(config.hidden_size, config.rel_mlp_units, vb.pp("rel_dep"))?;
        let rel_head =
            candle_nn::linear(config.hidden_size, config.rel_mlp_units, vb.pp("rel_head"))?;
        let rel_out = candle_nn::linear(
            2 * config.rel_mlp_units,
            loader.deprels().len(),
            vb.pp("rel_out"),
        )?;

        Ok(Self {
            config: config.clone(),
            varmap,
            word_embed,
            tag_embed,
            encoder,
            arc_dep,
            arc_head,
            rel_dep,
            rel_head,
            rel_out,
            device: device.clone(),
        })
    }

    /// Rebuilds a parser and loads saved parameters into it.
    pub fn load<P: AsRef<Path>>(
        config: &ModelConfig,
        loader: &DataLoader,
        path: P,
        device: &Device,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut parser = Self::new(config, loader, device)?;
        parser
            .varmap
            .load(path)
            .map_err(|e| CoreError::ModelLoad(format!("{}: {e}", path.display())))?;
        Ok(parser)
    }

    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn dropout(&self, xs: Tensor, train: bool) -> Result<Tensor> {
        if train && self.config.dropout_ratio > 0.0 {
            Ok(candle_nn::ops::dropout(&xs, self.config.dropout_ratio as f32)?)
        } else {
            Ok(xs)
        }
    }

    /// `[n + 1, hidden_size]` token representations, root first.
    fn encode(&self, sample: &Sample, train: bool) -> Result<Tensor> {
        let words = Tensor::new(sample.words.as_slice(), &self.device)?;
        let tags = Tensor::new(sample.tags.as_slice(), &self.device)?;
        let xs = Tensor::cat(
            &[&self.word_embed.forward(&words)?, &self.tag_embed.forward(&tags)?],
            1,
        )?;
        let xs = self.dropout(xs, train)?;
        let hs = self.encoder.forward(&xs)?.tanh()?;
        self.dropout(hs, train)
    }

    fn arc_scores(&self, hs: &Tensor, n: usize) -> Result<Tensor> {
        let deps = self.arc_dep.forward(&hs.narrow(0, 1, n)?)?.tanh()?;
        let heads = self.arc_head.forward(hs)?.tanh()?;
        Ok(deps.matmul(&heads.t()?.contiguous()?)?)
    }

    fn rel_scores(&self, hs: &Tensor, heads: &[u32]) -> Result<Tensor> {
        let deps = self.rel_dep.forward(&hs.narrow(0, 1, heads.len())?)?.tanh()?;
        let candidates = self.rel_head.forward(hs)?.tanh()?;
        let index = Tensor::new(heads, &self.device)?;
        let governors = candidates.index_select(&index, 0)?;
        Ok(self.rel_out.forward(&Tensor::cat(&[&deps, &governors], 1)?)?)
    }

    fn check_output(ys: &[SentenceScores], batch: &Batch<'_>) -> Result<()> {
        if ys.len() != batch.len() {
            return Err(CoreError::OutputMismatch(format!(
                "{} score sets for {} sentences",
                ys.len(),
                batch.len()
            )));
        }
        Ok(())
    }
}

impl DependencyParser for BaselineParser {
    type Output = Vec<SentenceScores>;

    fn forward(&self, batch: &Batch<'_>, train: bool) -> Result<Self::Output> {
        batch
            .samples
            .iter()
            .map(|sample| {
                let hs = self.encode(sample, train)?;
                Ok(SentenceScores {
                    arcs: self.arc_scores(&hs, sample.len())?,
                    rels: self.rel_scores(&hs, &sample.heads)?,
                })
            })
            .collect()
    }

    fn compute_loss(&self, ys: &Self::Output, batch: &Batch<'_>) -> Result<Tensor> {
        Self::check_output(ys, batch)?;
        let total = batch.num_tokens();
        if total == 0 {
            return Ok(Tensor::zeros((), DType::F32, &self.device)?);
        }

        let mut losses = Vec::with_capacity(ys.len());
        for (scores, sample) in ys.iter().zip(batch.samples) {
            let heads = Tensor::new(sample.heads.as_slice(), &self.device)?;
            let rels = Tensor::new(sample.deprels.as_slice(), &self.device)?;
            let arc_loss = candle_nn::loss::cross_entropy(&scores.arcs, &heads)?;
            let rel_loss = candle_nn::loss::cross_entropy(&scores.rels, &rels)?;
            // Weight each sentence by its length so the mean is per token.
            losses.push(arc_loss.add(&rel_loss)?.affine(sample.len() as f64, 0.0)?);
        }

        let loss = Tensor::stack(&losses, 0)?
            .sum_all()?
            .affine(1.0 / total as f64, 0.0)?;
        Ok(loss)
    }

    fn compute_accuracy(&self, ys: &Self::Output, batch: &Batch<'_>) -> Result<Accuracy> {
        Self::check_output(ys, batch)?;
        let total = batch.num_tokens();
        if total == 0 {
            return Ok(Accuracy::default());
        }

        let mut arc_correct = 0usize;
        let mut rel_correct = 0usize;
        for (scores, sample) in ys.iter().zip(batch.samples) {
            let heads = scores.arcs.argmax(D::Minus1)?.to_vec1::<u32>()?;
            let rels = scores.rels.argmax(D::Minus1)?.to_vec1::<u32>()?;
            arc_correct += heads.iter().zip(&sample.heads).filter(|(p, g)| p == g).count();
            rel_correct += rels.iter().zip(&sample.deprels).filter(|(p, g)| p == g).count();
        }

        Ok(Accuracy {
            arc: arc_correct as f64 / total as f64,
            rel: rel_correct as f64 / total as f64,
        })
    }

    fn parse(&self, batch: &Batch<'_>) -> Result<Vec<ParseResult>> {
        batch
            .samples
            .iter()
            .map(|sample| {
                let hs = self.encode(sample, false)?;
                let heads = self
                    .arc_scores(&hs, sample.len())?
                    .argmax(D::Minus1)?
                    .to_vec1::<u32>()?;
                let rels = self
                    .rel_scores(&hs, &heads)?
                    .argmax(D::Minus1)?
                    .to_vec1::<u32>()?;
                Ok(ParseResult::new(
                    heads.into_iter().map(|h| h as usize).collect(),
                    rels.into_iter().map(i64::from).collect(),
                ))
            })
            .collect()
    }

    fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }
}
