use audio_schemas::{
    AUDIO_EVENTS, AUDIO_OPS, CancelCommand, DiarizationCompletedEvent, EnhancementCompletedEvent,
    JobStatus, LanguageDetectCommand, LanguageDetectionCompletedEvent, MEDIA_EVENTS,
    PreprocessCompletedEvent, RecognitionCompletedEvent, RecognizeCommand, SegmentCompletedEvent,
    SegmentRecord, StepKey, TranscodeCompletedEvent,
};

use crate::error::{OrchestratorError, Result};
use crate::traits::{Broker, JobStateStore, ObjectStore};

/// Prefixes wiped on the happy-path `job.finalized` cleanup. `results/` and
/// `hls/` are deliberately excluded; a job's deliverables outlive the job.
const SUCCESS_CLEANUP_TARGETS: &[&str] = &["clean", "segments", "enhanced", "transcripts"];

/// Prefixes wiped on `terminate_job` (DLQ failure or explicit cancel). Unlike
/// the success path, this sweeps every namespace a job could have written to,
/// including `results/` and `hls/` — a terminated job has no deliverables.
const TERMINAL_CLEANUP_TARGETS: &[&str] = &[
    "raw",
    "segments",
    "transcripts",
    "enhanced",
    "analysis",
    "hls",
    "results",
    "clean",
];

/// Drives the per-job state machine across three storage seams: a message
/// broker, an object store, and a job state store. Holds no I/O of its own;
/// every side effect goes through `B`/`O`/`S`, which is what makes this
/// exercisable with in-memory fakes instead of a real broker/Redis/S3.
pub struct Orchestrator<B, O, S> {
    broker: B,
    store: O,
    state: S,
}

impl<B, O, S> Orchestrator<B, O, S>
where
    B: Broker,
    O: ObjectStore,
    S: JobStateStore,
{
    pub fn new(broker: B, store: O, state: S) -> Self {
        Self {
            broker,
            store,
            state,
        }
    }

    async fn is_cancelling(&self, job_id: &str) -> Result<bool> {
        self.state.is_cancelling(job_id).await
    }

    async fn publish_command(&self, routing_key: &str, body: serde_json::Value) -> Result<()> {
        self.broker.publish(AUDIO_OPS, routing_key, body).await
    }

    /// `file.uploaded`. Initializes job state on first sight and kicks off
    /// preprocessing, guarded by the `preprocess` step key so a redelivered
    /// upload event never republishes `cmd.preprocess`.
    pub async fn handle_file_uploaded(&self, event: audio_schemas::FileUploadedEvent) -> Result<()> {
        let job_id = &event.job_id;
        if self.state.get_job(job_id).await?.is_none() {
            tracing::info!(%job_id, "job_started");
            self.state.init_job(job_id, &event.user_id).await?;
        } else {
            tracing::info!(%job_id, "job_resumed");
        }

        if !self.state.is_step_done(job_id, StepKey::Preprocess).await? {
            self.state
                .update_progress(job_id, JobStatus::Preprocessing, 5, "Cleaning audio...")
                .await?;
            let cmd = audio_schemas::PreprocessCommand {
                job_id: job_id.clone(),
                storage_path: event.storage_path.clone(),
            };
            self.publish_command("cmd.preprocess", serde_json::to_value(&cmd)?)
                .await?;
        }
        Ok(())
    }

    pub async fn handle_preprocess_done(&self, event: PreprocessCompletedEvent) -> Result<()> {
        if self.is_cancelling(&event.job_id).await? {
            return Ok(());
        }
        self.state.mark_step(&event.job_id, StepKey::Preprocess).await?;

        if self
            .state
            .mark_step(&event.job_id, StepKey::SegmentingTrigger)
            .await?
        {
            self.state
                .update_progress(
                    &event.job_id,
                    JobStatus::Segmenting,
                    15,
                    "Analyzing structure...",
                )
                .await?;
            let seg = audio_schemas::SegmentCommand {
                job_id: event.job_id.clone(),
                clean_audio_path: event.clean_audio_path.clone(),
            };
            self.publish_command("cmd.segment", serde_json::to_value(&seg)?)
                .await?;
            let diar = audio_schemas::DiarizeCommand {
                job_id: event.job_id.clone(),
                clean_audio_path: event.clean_audio_path,
            };
            self.publish_command("cmd.diarize", serde_json::to_value(&diar)?)
                .await?;
        }
        Ok(())
    }

    /// `segment.done`. Guarded as a single unit by `transcode_trigger`: a
    /// redelivered `segment.done` must not reset the done-counter to zero out
    /// from under in-flight `recognize.done` increments, so the counter reset,
    /// the transcode command, and the per-chunk enhance fan-out all happen
    /// only on the delivery that wins the guard.
    pub async fn handle_segment_done(&self, event: SegmentCompletedEvent) -> Result<()> {
        if self.is_cancelling(&event.job_id).await? {
            return Ok(());
        }
        let job_id = &event.job_id;
        let total = event.segments.len() as u32;

        if self.state.mark_step(job_id, StepKey::TranscodeTrigger).await? {
            self.state.set_segment_total(job_id, total).await?;

            let transcode = audio_schemas::TranscodeCommand {
                job_id: job_id.clone(),
                clean_audio_path: event.audio_path.clone(),
            };
            self.publish_command("cmd.transcode", serde_json::to_value(&transcode)?)
                .await?;

            for seg in &event.segments {
                let cmd = audio_schemas::EnhanceCommand {
                    job_id: job_id.clone(),
                    index: seg.index,
                    s3_path: seg.s3_path.clone(),
                    start_ms: seg.start_ms,
                    end_ms: seg.end_ms,
                };
                self.publish_command("cmd.enhance", serde_json::to_value(&cmd)?)
                    .await?;
            }

            self.state
                .update_progress(
                    job_id,
                    JobStatus::Processing,
                    30,
                    &format!("Processing {total} chunks..."),
                )
                .await?;
        }
        Ok(())
    }

    pub async fn handle_diarization_done(&self, event: DiarizationCompletedEvent) -> Result<()> {
        if self.is_cancelling(&event.job_id).await? {
            return Ok(());
        }
        let key = format!("analysis/{}/diarization.json", event.job_id);
        self.store
            .put_json(&key, &serde_json::to_value(&event.speaker_segments)?)
            .await?;
        self.state.mark_step(&event.job_id, StepKey::Diarization).await?;
        self.check_finish_and_trigger_post(&event.job_id).await
    }

    pub async fn handle_transcode_done(&self, event: TranscodeCompletedEvent) -> Result<()> {
        if self.is_cancelling(&event.job_id).await? {
            return Ok(());
        }
        self.state.mark_step(&event.job_id, StepKey::Transcode).await?;
        self.check_finish_and_trigger_post(&event.job_id).await
    }

    /// `enhancement.done`. Pure forward: no state mutation, only a hop to
    /// `cmd.lang_detect` carrying the same chunk identity.
    pub async fn handle_enhancement_done(&self, event: EnhancementCompletedEvent) -> Result<()> {
        if self.is_cancelling(&event.job_id).await? {
            return Ok(());
        }
        let cmd = LanguageDetectCommand {
            job_id: event.job_id,
            index: event.index,
            s3_path: event.s3_path,
            start_ms: event.start_ms,
            end_ms: event.end_ms,
        };
        self.publish_command("cmd.lang_detect", serde_json::to_value(&cmd)?)
            .await
    }

    /// `lang_detect.done`. Pure forward: attaches the detected language and
    /// hops to `cmd.recognize`.
    pub async fn handle_language_detection_done(
        &self,
        event: LanguageDetectionCompletedEvent,
    ) -> Result<()> {
        if self.is_cancelling(&event.job_id).await? {
            return Ok(());
        }
        let cmd = RecognizeCommand {
            job_id: event.job_id,
            index: event.index,
            s3_path: event.s3_path,
            start_ms: event.start_ms,
            end_ms: event.end_ms,
            language: event.language,
        };
        self.publish_command("cmd.recognize", serde_json::to_value(&cmd)?)
            .await
    }

    pub async fn handle_recognition_done(&self, event: RecognitionCompletedEvent) -> Result<()> {
        if self.is_cancelling(&event.job_id).await? {
            return Ok(());
        }
        let job_id = &event.job_id;

        // Guards append+increment against redelivery: two (or five) deliveries of
        // the same index must still count once, or `done` overruns `total` and the
        // manifest ends up with duplicate or missing indices.
        if !self.state.mark_recognized(job_id, event.index).await? {
            return Ok(());
        }

        let record = SegmentRecord {
            index: event.index,
            start_ms: event.start_ms,
            end_ms: event.end_ms,
            transcript_s3_path: event.transcript_s3_path,
        };
        self.state.append_transcript_record(job_id, &record).await?;
        let done = self.state.increment_done(job_id).await?;
        let (total, _) = self.state.get_counters(job_id).await?;

        if total > 0 {
            let progress = 30 + (40 * done / total).min(40);
            self.state
                .update_progress(
                    job_id,
                    JobStatus::Processing,
                    progress as u8,
                    &format!("Recognized {done}/{total} chunks"),
                )
                .await?;
        }

        if total > 0 && done >= total {
            self.state.mark_step(job_id, StepKey::RecognitionAll).await?;
            self.check_finish_and_trigger_post(job_id).await?;
        }
        Ok(())
    }

    /// The fan-in guard. Publishes `cmd.postprocess` iff all three
    /// prerequisites are marked and this call is the one that wins the
    /// `postprocess_triggered` compare-and-set — so exactly one caller, ever,
    /// builds and writes the manifest for a given job.
    async fn check_finish_and_trigger_post(&self, job_id: &str) -> Result<()> {
        if self.is_cancelling(job_id).await? {
            return Ok(());
        }
        let recognition_all = self.state.is_step_done(job_id, StepKey::RecognitionAll).await?;
        let diarization = self.state.is_step_done(job_id, StepKey::Diarization).await?;
        let transcode = self.state.is_step_done(job_id, StepKey::Transcode).await?;

        if !(recognition_all && diarization && transcode) {
            return Ok(());
        }
        if !self
            .state
            .mark_step(job_id, StepKey::PostprocessTriggered)
            .await?
        {
            return Ok(());
        }

        let mut records = self.state.read_transcript_records(job_id).await?;
        if records.is_empty() {
            return Err(OrchestratorError::EmptyManifest(job_id.to_string()));
        }
        records.sort_by_key(|r| r.start_ms);

        let manifest_key = format!("analysis/{job_id}/segments_manifest.json");
        self.store
            .put_json(&manifest_key, &serde_json::to_value(&records)?)
            .await?;

        let cmd = audio_schemas::PostProcessCommand {
            job_id: job_id.to_string(),
        };
        self.publish_command("cmd.postprocess", serde_json::to_value(&cmd)?)
            .await?;
        self.state
            .update_progress(job_id, JobStatus::PostProcessing, 80, "Finalizing...")
            .await
    }

    /// `job.finalized`. Terminal happy-path transition: retains `results/` and
    /// `hls/` since those are the job's deliverables.
    pub async fn handle_job_finalized(&self, job_id: &str) -> Result<()> {
        self.state
            .update_progress(
                job_id,
                JobStatus::Completed,
                100,
                "Audio has been recognized successfully",
            )
            .await?;
        for target in SUCCESS_CLEANUP_TARGETS {
            self.store.delete_prefix(&format!("{target}/{job_id}/")).await?;
        }
        Ok(())
    }

    /// Dead-letter arrival for any stage: terminal failure for the whole job.
    pub async fn handle_dlq_arrival(&self, job_id: &str) -> Result<()> {
        self.terminate_job(
            job_id,
            JobStatus::Failed,
            "System error: processing failed and rolled back.",
        )
        .await
    }

    /// `cmd.cancel`. Transitions to `CANCELLING` first so in-flight handlers
    /// that re-check `is_cancelling` short-circuit, then runs the same
    /// terminal cleanup path as a DLQ failure.
    pub async fn handle_cancel_command(&self, cmd: CancelCommand) -> Result<()> {
        let progress = self
            .state
            .get_job(&cmd.job_id)
            .await?
            .map(|j| j.progress)
            .unwrap_or(0);
        self.state
            .update_progress(&cmd.job_id, JobStatus::Cancelling, progress, &cmd.reason)
            .await?;
        self.terminate_job(&cmd.job_id, JobStatus::Cancelled, &cmd.reason).await
    }

    /// Single convergence point for every failure/cancellation path: sets the
    /// terminal status, publishes the matching terminal event, and sweeps
    /// every job-owned prefix (including `results/`/`hls/`, unlike the
    /// success-path cleanup).
    async fn terminate_job(&self, job_id: &str, status: JobStatus, reason: &str) -> Result<()> {
        tracing::warn!(%job_id, %status, %reason, "terminating_job");
        self.state.update_progress(job_id, status, 0, reason).await?;

        match status {
            JobStatus::Failed => {
                let event = audio_schemas::JobFailedEvent {
                    job_id: job_id.to_string(),
                    reason: reason.to_string(),
                };
                self.broker
                    .publish(AUDIO_EVENTS, "event.job_failed", serde_json::to_value(&event)?)
                    .await?;
            }
            JobStatus::Cancelled => {
                let event = audio_schemas::JobCancelledEvent {
                    job_id: job_id.to_string(),
                    reason: reason.to_string(),
                };
                self.broker
                    .publish(AUDIO_EVENTS, "event.job_cancelled", serde_json::to_value(&event)?)
                    .await?;
            }
            _ => {}
        }

        for target in TERMINAL_CLEANUP_TARGETS {
            self.store.delete_prefix(&format!("{target}/{job_id}/")).await?;
        }
        Ok(())
    }
}
