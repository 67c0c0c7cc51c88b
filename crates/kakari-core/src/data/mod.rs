pub mod dataset;
pub mod loader;
pub mod vocab;

pub use dataset::{Batch, Dataset, Sample};
pub use loader::DataLoader;
pub use vocab::{Vocab, ROOT, ROOT_ID, UNKNOWN, UNKNOWN_ID};
