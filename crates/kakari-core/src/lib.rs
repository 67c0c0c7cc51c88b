//! # Kakari Core
//!
//! Treebank data model and parser boundary for the Kakari dependency
//! parser: CoNLL reading and writing, vocabularies and batching, and the
//! [`DependencyParser`](model::DependencyParser) trait with a baseline
//! candle implementation.
//!
//! ## Quick Start
//!
//! ```rust
//! use kakari_core::conll;
//!
//! let text = "1\tDog\t_\tNN\tNN\t_\t2\tnsubj\t_\t_\n2\tbarks\t_\tVB\tVBZ\t_\t0\troot\t_\t_\n";
//! let sentences = conll::decode(text).unwrap();
//!
//! assert_eq!(sentences.len(), 1);
//! assert_eq!(sentences[0].heads(), vec![2, 0]);
//! ```
pub mod conll;
pub mod data;
pub mod error;
pub mod model;
pub mod types;

// Re-export primary API
pub use data::{Batch, DataLoader, Dataset, Sample, Vocab};
pub use error::{CoreError, Result};
pub use model::{Accuracy, BaselineParser, DependencyParser, ModelConfig, SentenceScores};
pub use types::{DeprelMap, ParseResult, Sentence, Token};
