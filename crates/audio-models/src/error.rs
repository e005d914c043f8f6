use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wav decode error: {0}")]
    Wav(#[from] hound::Error),

    #[error("input audio is empty")]
    Empty,
}
