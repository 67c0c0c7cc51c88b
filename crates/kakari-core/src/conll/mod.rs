//! # CoNLL Codec
//!
//! Reads and writes the tab-separated treebank format: ten columns per
//! token (`id form lemma cpostag postag feats head deprel phead pdeprel`),
//! one blank line after every sentence, no header.
//!
//! The same writer produces system output (heads and relations overridden
//! by predictions) and gold references (the tokens' own annotation).

pub mod reader;
pub mod writer;

pub use reader::{decode, read_conll, read_file, NUM_FIELDS};
pub use writer::{encode, write_conll};
