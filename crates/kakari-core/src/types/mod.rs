pub mod deprel;
pub mod result;
pub mod token;

pub use deprel::{DeprelMap, DEFAULT_DEPREL};
pub use result::ParseResult;
pub use token::{Sentence, Token, EMPTY_FIELD};
