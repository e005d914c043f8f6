use axum::Json;
use axum::extract::{Path, State};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use audio_schemas::{FileUploadedEvent, MEDIA_EVENTS};

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Matches the original ingestion's date-stamped prefix (`raw/<date>/<job_id>/<filename>`),
/// itself in UTC+7.
const UPLOAD_TZ_OFFSET_SECS: i32 = 7 * 3600;

fn date_prefix() -> String {
    let tz = FixedOffset::east_opt(UPLOAD_TZ_OFFSET_SECS).expect("valid fixed offset");
    chrono::Utc::now().with_timezone(&tz).format("%Y-%m-%d").to_string()
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UploadInitRequest {
    pub filename: String,
    pub content_type: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_user_id() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadInitResponse {
    pub job_id: String,
    pub upload_url: String,
}

pub async fn init_upload(
    State(state): State<AppState>,
    Json(request): Json<UploadInitRequest>,
) -> Result<Json<UploadInitResponse>> {
    let job_id = Uuid::new_v4().to_string();
    let storage_path = format!("raw/{}/{}/", date_prefix(), job_id);
    let object_key = format!("{storage_path}{}", request.filename);

    let upload_url = state
        .s3()
        .generate_presigned_url(&object_key, &request.content_type)
        .await?;

    state.jobs().init_job(&job_id, &request.user_id).await?;
    state.jobs().set_storage_path(&job_id, &storage_path).await?;

    tracing::info!(job_id = %job_id, %object_key, "upload_session_created");

    Ok(Json(UploadInitResponse { job_id, upload_url }))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadConfirmResponse {
    pub status: &'static str,
}

pub async fn confirm_upload(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<UploadConfirmResponse>> {
    let job = state
        .jobs()
        .get_job(&job_id)
        .await?
        .ok_or_else(|| ApiError::JobNotFound(job_id.clone()))?;

    let storage_path = state
        .jobs()
        .get_storage_path(&job_id)
        .await?
        .ok_or_else(|| ApiError::JobNotFound(job_id.clone()))?;

    let event = FileUploadedEvent {
        job_id: job_id.clone(),
        user_id: job.user_id,
        storage_path,
    };

    state
        .producer()
        .publish(MEDIA_EVENTS, "file.uploaded", &event)
        .await?;

    tracing::info!(job_id = %job_id, "upload_confirmed");

    Ok(Json(UploadConfirmResponse { status: "queued" }))
}
