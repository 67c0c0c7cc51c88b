//! Fixtures shared by the trainer tests.

use std::path::Path;

use candle_core::{Device, Tensor, Var};
use kakari_core::data::{Batch, DataLoader, Dataset};
use kakari_core::model::Accuracy;
use kakari_core::types::{ParseResult, Sentence, Token};
use kakari_core::DependencyParser;

/// One scalar parameter pulled towards 1.0; parses every sentence with
/// its gold annotation.
pub struct StubParser {
    pub weight: Var,
    /// Drops the last sentence of every batch from `parse`.
    pub lossy: bool,
}

impl StubParser {
    pub fn new() -> Self {
        Self {
            weight: Var::new(0.0f32, &Device::Cpu).unwrap(),
            lossy: false,
        }
    }

    pub fn lossy() -> Self {
        Self {
            lossy: true,
            ..Self::new()
        }
    }
}

impl DependencyParser for StubParser {
    type Output = Tensor;

    fn forward(&self, _batch: &Batch<'_>, _train: bool) -> kakari_core::Result<Tensor> {
        Ok(self.weight.as_tensor().clone())
    }

    fn compute_loss(&self, ys: &Tensor, _batch: &Batch<'_>) -> kakari_core::Result<Tensor> {
        Ok(ys.affine(1.0, -1.0)?.sqr()?)
    }

    fn compute_accuracy(&self, _ys: &Tensor, _batch: &Batch<'_>) -> kakari_core::Result<Accuracy> {
        Ok(Accuracy { arc: 0.5, rel: 0.25 })
    }

    fn parse(&self, batch: &Batch<'_>) -> kakari_core::Result<Vec<ParseResult>> {
        let mut parsed: Vec<ParseResult> = batch
            .samples
            .iter()
            .map(|s| {
                ParseResult::new(
                    s.heads.iter().map(|&h| h as usize).collect(),
                    s.deprels.iter().map(|&d| i64::from(d)).collect(),
                )
            })
            .collect();
        if self.lossy {
            parsed.pop();
        }
        Ok(parsed)
    }

    fn trainable_vars(&self) -> Vec<Var> {
        vec![self.weight.clone()]
    }

    fn save(&self, path: &Path) -> kakari_core::Result<()> {
        std::fs::write(path, "stub")?;
        Ok(())
    }
}

pub fn dog_barks() -> Sentence {
    Sentence::new(vec![
        Token::new(1, "Dog", 2, "nsubj").with_pos("NN", "NN"),
        Token::new(2, "barks", 0, "root").with_pos("VB", "VBZ"),
    ])
}

pub fn cat_sleeps() -> Sentence {
    Sentence::new(vec![
        Token::new(1, "The", 2, "det").with_pos("DT", "DT"),
        Token::new(2, "cat", 3, "nsubj").with_pos("NN", "NN"),
        Token::new(3, "sleeps", 0, "root").with_pos("VB", "VBZ"),
    ])
}

/// A loader trained on two sentences and the encoded sentences.
pub fn treebank() -> (DataLoader, Dataset) {
    let mut loader = DataLoader::new();
    let dataset = loader
        .encode(vec![dog_barks(), cat_sleeps()], true, false)
        .unwrap();
    (loader, dataset)
}
