use candle_core::Error as TensorError;
use thiserror::Error;

/// Error type for the model pipeline.
///
/// Shape violations are fatal to the request that triggered them and are
/// never repaired by reshaping or truncation.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    #[error("fusion order violated: {0}")]
    FusionOrder(&'static str),

    #[error("tensor operation failed: {0}")]
    Tensor(#[from] TensorError),

    #[error("missing weight tensor `{0}`")]
    MissingWeight(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("model load failed: {0}")]
    Load(String),
}

impl ModelError {
    pub(crate) fn shape(context: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        ModelError::ShapeMismatch {
            context,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
