mod error;
mod ffmpeg;
mod segmenter;

pub use error::{MediaError, Result};
pub use ffmpeg::{preprocess, transcode_to_hls};
pub use segmenter::{ChunkMeta, split_audio_smart};
