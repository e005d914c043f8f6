use serde::{Deserialize, Serialize};

/// Per-job lifecycle status. Mutated only by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Preprocessing,
    Segmenting,
    Processing,
    PostProcessing,
    Completed,
    Failed,
    Cancelled,
    Cancelling,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Preprocessing => "PREPROCESSING",
            Self::Segmenting => "SEGMENTING",
            Self::Processing => "PROCESSING",
            Self::PostProcessing => "POST_PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Cancelling => "CANCELLING",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "QUEUED" => Self::Queued,
            "PREPROCESSING" => Self::Preprocessing,
            "SEGMENTING" => Self::Segmenting,
            "PROCESSING" => Self::Processing,
            "POST_PROCESSING" => Self::PostProcessing,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            "CANCELLING" => Self::Cancelling,
            other => return Err(format!("unknown job status: {other}")),
        })
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-job step keys, once set never cleared. See orchestrator idempotence discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKey {
    Preprocess,
    SegmentingTrigger,
    TranscodeTrigger,
    Transcode,
    Diarization,
    RecognitionAll,
    PostprocessTriggered,
}

impl StepKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preprocess => "preprocess",
            Self::SegmentingTrigger => "segmenting_trigger",
            Self::TranscodeTrigger => "transcode_trigger",
            Self::Transcode => "transcode",
            Self::Diarization => "diarization",
            Self::RecognitionAll => "recognition_all",
            Self::PostprocessTriggered => "postprocess_triggered",
        }
    }
}

/// Snapshot of `job:<id>` as read back from the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub user_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
}

/// `{index, start_ms, end_ms, transcript_s3_path}` appended per `recognize.done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub index: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub transcript_s3_path: String,
}

/// A progress frame published to `job_progress:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressFrame {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
}
