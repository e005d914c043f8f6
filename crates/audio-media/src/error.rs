use thiserror::Error;

pub type Result<T> = std::result::Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wav decode error: {0}")]
    Wav(#[from] hound::Error),

    #[error("ffmpeg failed (exit {code:?}): {stderr}")]
    Ffmpeg { code: Option<i32>, stderr: String },

    #[error("input file has no audio samples")]
    Empty,
}
