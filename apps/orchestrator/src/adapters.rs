//! Thin wrappers turning the concrete `audio-broker`/`s3`/`audio-state` clients
//! into the `Broker`/`ObjectStore`/`JobStateStore` traits `audio-orchestrator-core`
//! is generic over. No logic lives here beyond error-type translation.

use std::sync::Arc;

use async_trait::async_trait;

use audio_broker::BrokerProducer;
use audio_orchestrator_core::{Broker, JobStateStore, ObjectStore, OrchestratorError, Result};
use audio_schemas::{JobRecord, JobStatus, SegmentRecord, StepKey};
use s3::S3Client;

pub struct BrokerAdapter(pub Arc<BrokerProducer>);

#[async_trait]
impl Broker for BrokerAdapter {
    async fn publish(&self, exchange: &str, routing_key: &str, body: serde_json::Value) -> Result<()> {
        self.0
            .publish(exchange, routing_key, &body)
            .await
            .map_err(|e| OrchestratorError::Broker(e.to_string()))
    }
}

pub struct ObjectStoreAdapter(pub Arc<S3Client>);

#[async_trait]
impl ObjectStore for ObjectStoreAdapter {
    async fn put_text(&self, key: &str, content: &str) -> Result<()> {
        self.0
            .upload_bytes(content.as_bytes().to_vec(), key)
            .await
            .map_err(|e| OrchestratorError::ObjectStore(e.to_string()))
    }

    async fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.0
            .upload_bytes(bytes, key)
            .await
            .map_err(|e| OrchestratorError::ObjectStore(e.to_string()))
    }

    async fn read_text(&self, key: &str) -> Result<Option<String>> {
        self.0
            .read_text(key)
            .await
            .map_err(|e| OrchestratorError::ObjectStore(e.to_string()))
    }

    async fn read_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.0
            .read_json(key)
            .await
            .map_err(|e| OrchestratorError::ObjectStore(e.to_string()))
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        self.0
            .list_files(prefix)
            .await
            .map_err(|e| OrchestratorError::ObjectStore(e.to_string()))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        self.0
            .delete_folder(prefix)
            .await
            .map_err(|e| OrchestratorError::ObjectStore(e.to_string()))
    }
}

pub struct JobStateAdapter(pub Arc<audio_state::JobStateStore>);

#[async_trait]
impl JobStateStore for JobStateAdapter {
    async fn init_job(&self, job_id: &str, user_id: &str) -> Result<()> {
        self.0
            .init_job(job_id, user_id)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        self.0
            .get_job(job_id)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }

    async fn update_progress(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: u8,
        message: &str,
    ) -> Result<()> {
        self.0
            .update_progress(job_id, status, progress, message)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }

    async fn is_cancelling(&self, job_id: &str) -> Result<bool> {
        self.0
            .is_cancelling(job_id)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }

    async fn mark_step(&self, job_id: &str, step: StepKey) -> Result<bool> {
        self.0
            .mark_step(job_id, step)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }

    async fn is_step_done(&self, job_id: &str, step: StepKey) -> Result<bool> {
        self.0
            .is_step_done(job_id, step)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }

    async fn set_segment_total(&self, job_id: &str, total: u32) -> Result<()> {
        self.0
            .set_segment_total(job_id, total)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }

    async fn get_counters(&self, job_id: &str) -> Result<(u32, u32)> {
        self.0
            .get_counters(job_id)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }

    async fn increment_done(&self, job_id: &str) -> Result<u32> {
        self.0
            .increment_done(job_id)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }

    async fn mark_recognized(&self, job_id: &str, index: u32) -> Result<bool> {
        self.0
            .mark_recognized(job_id, index)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }

    async fn append_transcript_record(&self, job_id: &str, record: &SegmentRecord) -> Result<()> {
        self.0
            .append_transcript_record(job_id, record)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }

    async fn read_transcript_records(&self, job_id: &str) -> Result<Vec<SegmentRecord>> {
        self.0
            .read_transcript_records(job_id)
            .await
            .map_err(|e| OrchestratorError::StateStore(e.to_string()))
    }
}
