use serde::{Deserialize, Serialize};

pub use audio_align::SpeakerTurn;

/// One recognized word, in chunk-local seconds, as written to `transcripts/<job>/N.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
}
