use async_trait::async_trait;

use audio_schemas::{JobRecord, JobStatus, SegmentRecord, StepKey};

use crate::error::Result;

/// Publishes a JSON body to a topic exchange under a routing key. Implemented
/// in `apps/orchestrator` as a thin wrapper over `audio_broker::BrokerProducer`;
/// this trait carries no dependency on that crate so the handlers below can be
/// exercised against an in-memory fake.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: serde_json::Value,
    ) -> Result<()>;
}

/// Bytes and JSON in/out, addressed by key, plus prefix deletion and listing.
/// Implemented in `apps/orchestrator` as a thin wrapper over `s3::S3Client`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_text(&self, key: &str, content: &str) -> Result<()>;
    async fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<()>;
    async fn read_text(&self, key: &str) -> Result<Option<String>>;
    async fn read_json(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn list_files(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}

/// The per-job hash, step set, counters, and transcript list. Implemented in
/// `apps/orchestrator` as a thin wrapper over `audio_state::JobStateStore` — the
/// method shapes below mirror that crate's public API exactly so the adapter is
/// a pass-through, not a translation layer.
#[async_trait]
pub trait JobStateStore: Send + Sync {
    async fn init_job(&self, job_id: &str, user_id: &str) -> Result<()>;
    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>>;
    async fn update_progress(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: u8,
        message: &str,
    ) -> Result<()>;
    async fn is_cancelling(&self, job_id: &str) -> Result<bool>;

    /// Check-and-set: `true` the first time this step is marked for this job.
    async fn mark_step(&self, job_id: &str, step: StepKey) -> Result<bool>;
    async fn is_step_done(&self, job_id: &str, step: StepKey) -> Result<bool>;

    async fn set_segment_total(&self, job_id: &str, total: u32) -> Result<()>;
    async fn get_counters(&self, job_id: &str) -> Result<(u32, u32)>;
    /// Atomically increments `done`, returning its new value.
    async fn increment_done(&self, job_id: &str) -> Result<u32>;

    /// Check-and-set: `true` the first time this chunk index is marked recognized
    /// for this job, `false` on every redelivery of the same `recognize.done` event.
    async fn mark_recognized(&self, job_id: &str, index: u32) -> Result<bool>;

    async fn append_transcript_record(&self, job_id: &str, record: &SegmentRecord)
    -> Result<()>;
    async fn read_transcript_records(&self, job_id: &str) -> Result<Vec<SegmentRecord>>;
}
