use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessCommand {
    pub job_id: String,
    pub storage_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCommand {
    pub job_id: String,
    pub clean_audio_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizeCommand {
    pub job_id: String,
    pub clean_audio_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeCommand {
    pub job_id: String,
    pub clean_audio_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhanceCommand {
    pub job_id: String,
    pub index: u32,
    pub s3_path: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDetectCommand {
    pub job_id: String,
    pub index: u32,
    pub s3_path: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizeCommand {
    pub job_id: String,
    pub index: u32,
    pub s3_path: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProcessCommand {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelCommand {
    pub job_id: String,
    pub reason: String,
}
