use serde::{Deserialize, Serialize};

use crate::base::SpeakerTurn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUploadedEvent {
    pub job_id: String,
    pub user_id: String,
    /// A prefix, not a file key; the first listed file under it is authoritative.
    pub storage_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessCompletedEvent {
    pub job_id: String,
    pub clean_audio_path: String,
}

/// One entry of `segment.done`'s `segments` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub index: u32,
    pub s3_path: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCompletedEvent {
    pub job_id: String,
    pub audio_path: String,
    pub segments: Vec<SegmentDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizationCompletedEvent {
    pub job_id: String,
    pub speaker_segments: Vec<SpeakerTurn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeCompletedEvent {
    pub job_id: String,
    pub hls_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementCompletedEvent {
    pub job_id: String,
    pub index: u32,
    pub s3_path: String,
    pub snr: f64,
    pub is_denoised: bool,
    pub start_ms: u64,
    pub end_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDetectionCompletedEvent {
    pub job_id: String,
    pub index: u32,
    pub s3_path: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionCompletedEvent {
    pub job_id: String,
    pub index: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub transcript_s3_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFinalizedEvent {
    pub job_id: String,
    pub metadata_path: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailedEvent {
    pub job_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCancelledEvent {
    pub job_id: String,
    pub reason: String,
}
