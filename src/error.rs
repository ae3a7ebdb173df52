use thiserror::Error;

/// Errors surfaced by the MADDPG learner.
#[derive(Debug, Error)]
pub enum MaddpgError {
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("replay buffer holds {len} experiences, cannot sample {requested}")]
    InsufficientData { len: usize, requested: usize },

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, MaddpgError>;

impl MaddpgError {
    pub(crate) fn shape(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}

/// Fails with [`MaddpgError::ShapeMismatch`] unless `actual == expected`.
pub(crate) fn ensure_len(context: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(MaddpgError::shape(context, expected, actual))
    }
}
