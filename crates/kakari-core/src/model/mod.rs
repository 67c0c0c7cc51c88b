//! # Parser Model Boundary
//!
//! The training loop and the evaluator only talk to a model through
//! [`DependencyParser`]. Any architecture that can score a batch, turn the
//! scores into a loss and an accuracy, and decode heads and relations can
//! be trained by `kakari-trainer`.

pub mod baseline;
pub mod config;

use std::path::Path;

use candle_core::{DType, Tensor, Var};

use crate::data::Batch;
use crate::error::Result;
use crate::types::ParseResult;

pub use baseline::{BaselineParser, SentenceScores};
pub use config::ModelConfig;

/// Head and relation accuracy over the tokens of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accuracy {
    /// Fraction of tokens with the correct governor.
    pub arc: f64,
    /// Fraction of tokens with the correct relation label.
    pub rel: f64,
}

/// A trainable graph-based dependency parser.
pub trait DependencyParser {
    /// Scores produced by [`forward`](Self::forward) and consumed by the
    /// loss and accuracy computations.
    type Output;

    /// Scores every sentence of the batch. `train` enables dropout.
    fn forward(&self, batch: &Batch<'_>, train: bool) -> Result<Self::Output>;

    /// Scalar training loss for the batch's gold targets.
    fn compute_loss(&self, ys: &Self::Output, batch: &Batch<'_>) -> Result<Tensor>;

    fn compute_accuracy(&self, ys: &Self::Output, batch: &Batch<'_>) -> Result<Accuracy>;

    /// Decodes heads and relation ids, one result per sentence.
    fn parse(&self, batch: &Batch<'_>) -> Result<Vec<ParseResult>>;

    /// Parameters updated by the optimizer.
    fn trainable_vars(&self) -> Vec<Var>;

    /// Writes the parameters to `path`.
    fn save(&self, path: &Path) -> Result<()>;
}

/// Reads a rank-0 tensor as `f64`.
pub fn scalar(tensor: &Tensor) -> Result<f64> {
    Ok(tensor.to_dtype(DType::F64)?.to_scalar::<f64>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn scalar_reads_f32_tensors() {
        let t = Tensor::new(2.5f32, &Device::Cpu).unwrap();
        assert_eq!(scalar(&t).unwrap(), 2.5);
    }
}
