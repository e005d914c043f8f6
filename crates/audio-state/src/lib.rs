mod error;

use std::str::FromStr;

use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use audio_schemas::{JobRecord, JobStatus, ProgressFrame, SegmentRecord, StepKey};

pub use error::{Result, StateError};

fn job_key(job_id: &str) -> String {
    format!("job:{job_id}")
}

fn steps_key(job_id: &str) -> String {
    format!("job:{job_id}:steps")
}

fn counters_key(job_id: &str) -> String {
    format!("job:{job_id}:cnt")
}

fn transcripts_key(job_id: &str) -> String {
    format!("job:{job_id}:transcripts")
}

fn recognized_key(job_id: &str) -> String {
    format!("job:{job_id}:recognized")
}

fn storage_path_key(job_id: &str) -> String {
    format!("job:{job_id}:storage_path")
}

fn progress_channel(job_id: &str) -> String {
    format!("job_progress:{job_id}")
}

/// Redis-backed per-job state store: status hash, step-completion set, segment
/// counters, the append-only transcript list, and the progress pub/sub channel.
#[derive(Clone)]
pub struct JobStateStore {
    client: redis::Client,
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl JobStateStore {
    pub async fn connect(redis_url: &str, ttl_secs: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            client,
            conn,
            ttl_secs,
        })
    }

    /// Initializes `QUEUED, 0, "Starting..."` with a TTL, unless the job already exists.
    pub async fn init_job(&self, job_id: &str, user_id: &str) -> Result<()> {
        let key = job_key(job_id);
        let mut conn = self.conn.clone();

        let exists: bool = conn.exists(&key).await?;
        if exists {
            return Ok(());
        }

        let () = conn
            .hset_multiple(
                &key,
                &[
                    ("user_id", user_id),
                    ("status", JobStatus::Queued.as_str()),
                    ("progress", "0"),
                    ("message", "Starting..."),
                ],
            )
            .await?;
        let _: bool = conn.expire(&key, self.ttl_secs as i64).await?;
        Ok(())
    }

    /// Updates status/progress/message and republishes a progress frame.
    pub async fn update_progress(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: u8,
        message: &str,
    ) -> Result<()> {
        let key = job_key(job_id);
        let mut conn = self.conn.clone();

        let () = conn
            .hset_multiple(
                &key,
                &[
                    ("status", status.as_str()),
                    ("progress", &progress.to_string()),
                    ("message", message),
                ],
            )
            .await?;
        let _: bool = conn.expire(&key, self.ttl_secs as i64).await?;

        let frame = ProgressFrame {
            job_id: job_id.to_string(),
            status,
            progress,
            message: message.to_string(),
        };
        self.publish_progress(&frame).await?;

        tracing::info!(job_id = %job_id, %status, progress, "job_progress_updated");
        Ok(())
    }

    async fn publish_progress(&self, frame: &ProgressFrame) -> Result<()> {
        let payload = serde_json::to_string(frame).map_err(|e| StateError::Json {
            job_id: frame.job_id.clone(),
            source: e,
        })?;
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .publish(progress_channel(&frame.job_id), payload)
            .await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let key = job_key(job_id);
        let mut conn = self.conn.clone();

        let fields: std::collections::HashMap<String, String> = conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let status_str = fields
            .get("status")
            .ok_or_else(|| StateError::JobNotFound(job_id.to_string()))?;
        let status = JobStatus::from_str(status_str)
            .map_err(|_| StateError::UnknownStatus(status_str.clone()))?;

        Ok(Some(JobRecord {
            job_id: job_id.to_string(),
            user_id: fields.get("user_id").cloned().unwrap_or_default(),
            status,
            progress: fields
                .get("progress")
                .and_then(|p| p.parse().ok())
                .unwrap_or(0),
            message: fields.get("message").cloned().unwrap_or_default(),
        }))
    }

    pub async fn is_cancelling(&self, job_id: &str) -> Result<bool> {
        Ok(matches!(
            self.get_job(job_id).await?.map(|j| j.status),
            Some(JobStatus::Cancelling) | Some(JobStatus::Cancelled)
        ))
    }

    /// Check-and-set: returns `true` the first time this step is marked for this job,
    /// `false` on every subsequent call (the step was already done).
    pub async fn mark_step(&self, job_id: &str, step: StepKey) -> Result<bool> {
        let mut conn = self.conn.clone();
        let newly_set: bool = conn
            .hset_nx(steps_key(job_id), step.as_str(), "done")
            .await?;
        Ok(newly_set)
    }

    pub async fn is_step_done(&self, job_id: &str, step: StepKey) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.hexists(steps_key(job_id), step.as_str()).await?;
        Ok(exists)
    }

    /// Sets the segment total and resets `done` to 0 (segment.done handler).
    pub async fn set_segment_total(&self, job_id: &str, total: u32) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn
            .hset_multiple(
                counters_key(job_id),
                &[("total", total.to_string()), ("done", "0".to_string())],
            )
            .await?;
        Ok(())
    }

    pub async fn get_counters(&self, job_id: &str) -> Result<(u32, u32)> {
        let mut conn = self.conn.clone();
        let total: Option<u32> = conn.hget(counters_key(job_id), "total").await?;
        let done: Option<u32> = conn.hget(counters_key(job_id), "done").await?;
        Ok((total.unwrap_or(0), done.unwrap_or(0)))
    }

    /// Atomically increments `done`, returning its new value.
    pub async fn increment_done(&self, job_id: &str) -> Result<u32> {
        let mut conn = self.conn.clone();
        let done: u32 = conn.hincr(counters_key(job_id), "done", 1).await?;
        Ok(done)
    }

    /// Check-and-set per chunk index: returns `true` the first time this index is
    /// marked recognized for this job, `false` on every redelivery of the same
    /// `recognize.done` event. Guards `append_transcript_record`/`increment_done`
    /// so an at-least-once-delivered index counts exactly once.
    pub async fn mark_recognized(&self, job_id: &str, index: u32) -> Result<bool> {
        let mut conn = self.conn.clone();
        let newly_set: bool = conn
            .hset_nx(recognized_key(job_id), index.to_string(), "done")
            .await?;
        Ok(newly_set)
    }

    pub async fn append_transcript_record(
        &self,
        job_id: &str,
        record: &SegmentRecord,
    ) -> Result<()> {
        let payload = serde_json::to_string(record).map_err(|e| StateError::Json {
            job_id: job_id.to_string(),
            source: e,
        })?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(transcripts_key(job_id), payload).await?;
        Ok(())
    }

    /// Full range read of the append-only transcript list, in insertion order.
    pub async fn read_transcript_records(&self, job_id: &str) -> Result<Vec<SegmentRecord>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(transcripts_key(job_id), 0, -1).await?;

        raw.into_iter()
            .map(|s| {
                serde_json::from_str(&s).map_err(|e| StateError::Json {
                    job_id: job_id.to_string(),
                    source: e,
                })
            })
            .collect()
    }

    /// Records the upload-time object prefix so a later confirm can recover it
    /// without recomputing a date-stamped path that could roll over at midnight.
    pub async fn set_storage_path(&self, job_id: &str, storage_path: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.set_ex(storage_path_key(job_id), storage_path, self.ttl_secs).await?;
        Ok(())
    }

    pub async fn get_storage_path(&self, job_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let path: Option<String> = conn.get(storage_path_key(job_id)).await?;
        Ok(path)
    }

    /// Subscribes to `job_progress:<id>`, yielding every frame published from here on.
    /// Callers wanting "current value then subsequent frames" semantics should read
    /// `get_job` first and prepend it before consuming this stream.
    pub async fn subscribe_progress(
        &self,
        job_id: &str,
    ) -> Result<impl Stream<Item = ProgressFrame> + use<>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(progress_channel(job_id)).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_naming_matches_external_interface_contract() {
        assert_eq!(job_key("abc"), "job:abc");
        assert_eq!(steps_key("abc"), "job:abc:steps");
        assert_eq!(counters_key("abc"), "job:abc:cnt");
        assert_eq!(transcripts_key("abc"), "job:abc:transcripts");
        assert_eq!(recognized_key("abc"), "job:abc:recognized");
        assert_eq!(storage_path_key("abc"), "job:abc:storage_path");
        assert_eq!(progress_channel("abc"), "job_progress:abc");
    }
}
