use thiserror::Error;

/// Errors that can occur in Kakari core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A treebank line could not be decoded.
    #[error("malformed CoNLL input at line {line}: {message}")]
    Conll {
        /// 1-based line number in the input.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// Reading or writing treebank data failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A dataset was requested before the loader had any vocabulary.
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// Model output did not line up with the batch it was computed for.
    #[error("model output mismatch: {0}")]
    OutputMismatch(String),

    /// The model weights file could not be loaded or saved.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Candle ML framework error.
    #[error("ML error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for Kakari core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = CoreError::Conll {
            line: 7,
            message: "expected 10 fields, found 3".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed CoNLL input at line 7: expected 10 fields, found 3"
        );

        let err = CoreError::OutputMismatch("2 sentences, 3 results".into());
        assert!(err.to_string().contains("3 results"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoreError>();
    }
}
