use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;

use audio_align::AlignedSegment;
use audio_schemas::{FinalMetadata, JobRecord, ResultsBlock};

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobRecord>> {
    let job = state
        .jobs()
        .get_job(&job_id)
        .await?
        .ok_or_else(|| ApiError::JobNotFound(job_id.clone()))?;

    Ok(Json(job))
}

/// Opens an SSE stream yielding the job's current snapshot, then every frame
/// published to its progress channel from here on. Closes itself once the job
/// reaches a terminal status, so a well-behaved client doesn't need to guess.
pub async fn stream_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<ReceiverStream<std::result::Result<Event, Infallible>>>> {
    let current = state.jobs().get_job(&job_id).await?;
    let mut frames = state.jobs().subscribe_progress(&job_id).await?;

    let (tx, rx) = tokio::sync::mpsc::channel(16);

    if let Some(job) = current {
        let event = Event::default().json_data(&job).expect("JobRecord always serializes");
        if tx.send(Ok(event)).await.is_err() {
            return Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()));
        }
        if job.status.is_terminal() {
            return Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()));
        }
    }

    tokio::spawn(async move {
        while let Some(frame) = frames.next().await {
            let terminal = frame.status.is_terminal();
            let event = Event::default()
                .json_data(&frame)
                .unwrap_or_else(|_| Event::default().data("serialization_error"));
            if tx.send(Ok(event)).await.is_err() {
                break;
            }
            if terminal {
                break;
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TranscriptEditSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default = "unknown_speaker")]
    pub speaker: String,
}

fn unknown_speaker() -> String {
    audio_align::UNKNOWN_SPEAKER.to_string()
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TranscriptEditRequest {
    pub segments: Vec<TranscriptEditSegment>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TranscriptEditResponse {
    pub job_id: String,
    pub segments_count: usize,
    pub processed_at: String,
    pub written_keys: Vec<String>,
}

fn transcript_txt(job_id: &str, segments: &[TranscriptEditSegment]) -> String {
    let mut out = format!("TRANSCRIPT FOR JOB: {job_id} (edited)\n{}\n", "=".repeat(50));
    for segment in segments {
        let total_secs = segment.start.max(0.0) as u64;
        out.push_str(&format!(
            "[{:02}:{:02}] {}\n",
            total_secs / 60,
            total_secs % 60,
            segment.text
        ));
    }
    out
}

/// Writes the three artifacts of an external edit sync, in order: canonical
/// metadata JSON (merged with any prior value), flat TXT, per-job analysis JSON.
pub async fn sync_transcript(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<TranscriptEditRequest>,
) -> Result<Json<TranscriptEditResponse>> {
    let key_metadata = format!("results/{job_id}/metadata.json");
    let key_txt = format!("results/{job_id}/transcript.txt");
    let key_analysis = format!("analysis/{job_id}/transcript_final.json");

    let aligned: Vec<AlignedSegment> = request
        .segments
        .iter()
        .map(|s| AlignedSegment {
            speaker: s.speaker.clone(),
            start: s.start,
            end: s.end,
            text: s.text.clone(),
        })
        .collect();

    let mut metadata = state
        .s3()
        .read_json::<FinalMetadata>(&key_metadata)
        .await?
        .unwrap_or_else(|| FinalMetadata::fresh(&job_id));

    let processed_at = Utc::now().to_rfc3339();
    metadata.processed_at = processed_at.clone();
    metadata.results = ResultsBlock {
        transcript_aligned: aligned.clone(),
    };

    let metadata_json = serde_json::to_vec_pretty(&metadata)?;
    state.s3().upload_bytes(metadata_json, &key_metadata).await?;

    let txt = transcript_txt(&job_id, &request.segments);
    state
        .s3()
        .upload_bytes(txt.into_bytes(), &key_txt)
        .await?;

    let analysis_json = serde_json::to_vec_pretty(&aligned)?;
    state
        .s3()
        .upload_bytes(analysis_json, &key_analysis)
        .await?;

    tracing::info!(job_id = %job_id, segments = aligned.len(), "transcript_synced");

    Ok(Json(TranscriptEditResponse {
        job_id,
        segments_count: aligned.len(),
        processed_at,
        written_keys: vec![key_metadata, key_txt, key_analysis],
    }))
}
