use serde::{Deserialize, Serialize};

use audio_align::AlignedSegment;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Assets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResultsBlock {
    #[serde(default)]
    pub transcript_aligned: Vec<AlignedSegment>,
}

/// `results/<id>/metadata.json`, the final persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalMetadata {
    pub job_id: String,
    pub status: String,
    pub processed_at: String,
    #[serde(default)]
    pub assets: Assets,
    #[serde(default)]
    pub results: ResultsBlock,
}

impl FinalMetadata {
    pub fn fresh(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: "COMPLETED".to_string(),
            processed_at: String::new(),
            assets: Assets::default(),
            results: ResultsBlock::default(),
        }
    }
}
