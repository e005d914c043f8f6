use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use audio_schemas::{
    DiarizationCompletedEvent, FileUploadedEvent, JobRecord, JobStatus, PreprocessCompletedEvent,
    RecognitionCompletedEvent, SegmentCompletedEvent, SegmentDescriptor, SegmentRecord, StepKey,
    TranscodeCompletedEvent,
};

use crate::error::Result;
use crate::traits::{Broker, JobStateStore, ObjectStore};
use crate::Orchestrator;

#[derive(Debug, Clone)]
struct Published {
    exchange: String,
    routing_key: String,
    body: serde_json::Value,
}

#[derive(Clone, Default)]
struct FakeBroker {
    published: Arc<Mutex<Vec<Published>>>,
}

#[async_trait]
impl Broker for FakeBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: serde_json::Value,
    ) -> Result<()> {
        self.published.lock().unwrap().push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body,
        });
        Ok(())
    }
}

impl FakeBroker {
    fn count(&self, routing_key: &str) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.routing_key == routing_key)
            .count()
    }
}

#[derive(Clone, Default)]
struct FakeObjectStore {
    data: Arc<Mutex<HashMap<String, String>>>,
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put_text(&self, key: &str, content: &str) -> Result<()> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), content.to_string());
        Ok(())
    }

    async fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn read_text(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn read_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(key)
            .map(|s| serde_json::from_str(s).unwrap()))
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        self.data.lock().unwrap().retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FakeJobStateStore {
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
    steps: Arc<Mutex<HashSet<(String, &'static str)>>>,
    counters: Arc<Mutex<HashMap<String, (u32, u32)>>>,
    recognized: Arc<Mutex<HashSet<(String, u32)>>>,
    transcripts: Arc<Mutex<HashMap<String, Vec<SegmentRecord>>>>,
    progress_log: Arc<Mutex<Vec<(String, JobStatus, u8)>>>,
}

#[async_trait]
impl JobStateStore for FakeJobStateStore {
    async fn init_job(&self, job_id: &str, user_id: &str) -> Result<()> {
        self.jobs.lock().unwrap().entry(job_id.to_string()).or_insert(JobRecord {
            job_id: job_id.to_string(),
            user_id: user_id.to_string(),
            status: JobStatus::Queued,
            progress: 0,
            message: "Starting...".to_string(),
        });
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        Ok(self.jobs.lock().unwrap().get(job_id).cloned())
    }

    async fn update_progress(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: u8,
        message: &str,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let record = jobs.entry(job_id.to_string()).or_insert(JobRecord {
            job_id: job_id.to_string(),
            user_id: String::new(),
            status,
            progress,
            message: message.to_string(),
        });
        record.status = status;
        record.progress = progress;
        record.message = message.to_string();
        self.progress_log
            .lock()
            .unwrap()
            .push((job_id.to_string(), status, progress));
        Ok(())
    }

    async fn is_cancelling(&self, job_id: &str) -> Result<bool> {
        Ok(matches!(
            self.jobs.lock().unwrap().get(job_id).map(|j| j.status),
            Some(JobStatus::Cancelling) | Some(JobStatus::Cancelled)
        ))
    }

    async fn mark_step(&self, job_id: &str, step: StepKey) -> Result<bool> {
        Ok(self
            .steps
            .lock()
            .unwrap()
            .insert((job_id.to_string(), step.as_str())))
    }

    async fn is_step_done(&self, job_id: &str, step: StepKey) -> Result<bool> {
        Ok(self
            .steps
            .lock()
            .unwrap()
            .contains(&(job_id.to_string(), step.as_str())))
    }

    async fn set_segment_total(&self, job_id: &str, total: u32) -> Result<()> {
        self.counters
            .lock()
            .unwrap()
            .insert(job_id.to_string(), (total, 0));
        Ok(())
    }

    async fn get_counters(&self, job_id: &str) -> Result<(u32, u32)> {
        Ok(self.counters.lock().unwrap().get(job_id).copied().unwrap_or((0, 0)))
    }

    async fn increment_done(&self, job_id: &str) -> Result<u32> {
        let mut counters = self.counters.lock().unwrap();
        let entry = counters.entry(job_id.to_string()).or_insert((0, 0));
        entry.1 += 1;
        Ok(entry.1)
    }

    async fn mark_recognized(&self, job_id: &str, index: u32) -> Result<bool> {
        Ok(self.recognized.lock().unwrap().insert((job_id.to_string(), index)))
    }

    async fn append_transcript_record(&self, job_id: &str, record: &SegmentRecord) -> Result<()> {
        self.transcripts
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn read_transcript_records(&self, job_id: &str) -> Result<Vec<SegmentRecord>> {
        Ok(self.transcripts.lock().unwrap().get(job_id).cloned().unwrap_or_default())
    }
}

fn harness() -> (Orchestrator<FakeBroker, FakeObjectStore, FakeJobStateStore>, FakeBroker, FakeObjectStore, FakeJobStateStore) {
    let broker = FakeBroker::default();
    let store = FakeObjectStore::default();
    let state = FakeJobStateStore::default();
    let orchestrator = Orchestrator::new(broker.clone(), store.clone(), state.clone());
    (orchestrator, broker, store, state)
}

fn segment_done(job_id: &str, n: u32) -> SegmentCompletedEvent {
    SegmentCompletedEvent {
        job_id: job_id.to_string(),
        audio_path: format!("clean/{job_id}/audio.wav"),
        segments: (0..n)
            .map(|i| SegmentDescriptor {
                index: i,
                s3_path: format!("segments/{job_id}/chunk_{i:04}.wav"),
                start_ms: (i as u64) * 1000,
                end_ms: (i as u64) * 1000 + 900,
            })
            .collect(),
    }
}

async fn drive_through_segment_and_diarize_and_transcode(
    o: &Orchestrator<FakeBroker, FakeObjectStore, FakeJobStateStore>,
    job_id: &str,
    n: u32,
) {
    o.handle_segment_done(segment_done(job_id, n)).await.unwrap();
    o.handle_diarization_done(DiarizationCompletedEvent {
        job_id: job_id.to_string(),
        speaker_segments: vec![],
    })
    .await
    .unwrap();
    o.handle_transcode_done(TranscodeCompletedEvent {
        job_id: job_id.to_string(),
        hls_path: format!("hls/{job_id}/playlist.m3u8"),
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn file_uploaded_is_idempotent_under_redelivery() {
    let (o, broker, _store, _state) = harness();
    let event = FileUploadedEvent {
        job_id: "job-1".to_string(),
        user_id: "user-1".to_string(),
        storage_path: "raw/2026-01-01/job-1/".to_string(),
    };
    for _ in 0..3 {
        o.handle_file_uploaded(event.clone()).await.unwrap();
    }
    assert_eq!(broker.count("cmd.preprocess"), 1);
}

#[tokio::test]
async fn preprocess_done_publishes_segment_and_diarize_exactly_once() {
    let (o, broker, _store, _state) = harness();
    let event = PreprocessCompletedEvent {
        job_id: "job-2".to_string(),
        clean_audio_path: "clean/job-2/audio.wav".to_string(),
    };
    for _ in 0..5 {
        o.handle_preprocess_done(event.clone()).await.unwrap();
    }
    assert_eq!(broker.count("cmd.segment"), 1);
    assert_eq!(broker.count("cmd.diarize"), 1);
}

/// Fan-in exactness: out-of-order, duplicated recognize.done arrivals still
/// trigger exactly one `cmd.postprocess`, and the manifest is sorted by
/// `start_ms` regardless of arrival order.
#[tokio::test]
async fn fan_in_is_exact_under_out_of_order_duplicate_delivery() {
    let (o, broker, store, state) = harness();
    let job_id = "job-3";
    drive_through_segment_and_diarize_and_transcode(&o, job_id, 5).await;

    let arrival_order = [3u32, 1, 4, 0, 2];
    for &index in &arrival_order {
        for _ in 0..2 {
            o.handle_recognition_done(RecognitionCompletedEvent {
                job_id: job_id.to_string(),
                index,
                start_ms: (index as u64) * 1000,
                end_ms: (index as u64) * 1000 + 900,
                transcript_s3_path: format!("transcripts/{job_id}/{index}.json"),
            })
            .await
            .unwrap();
        }
    }

    assert_eq!(broker.count("cmd.postprocess"), 1);

    let (total, done) = state.get_counters(job_id).await.unwrap();
    assert_eq!((total, done), (5, 5), "each index counts once despite redelivery");

    let manifest = store
        .read_json(&format!("analysis/{job_id}/segments_manifest.json"))
        .await
        .unwrap()
        .unwrap();
    let records: Vec<SegmentRecord> = serde_json::from_value(manifest).unwrap();
    assert_eq!(records.len(), 5, "exactly one appended record per index, not per delivery");
    let mut start_ms: Vec<u64> = records.iter().map(|r| r.start_ms).collect();
    let mut sorted = start_ms.clone();
    sorted.sort();
    assert_eq!(start_ms, sorted, "manifest is non-decreasing in start_ms");
    start_ms.dedup();
    assert_eq!(start_ms.len(), 5);
}

/// A single index redelivered `total` times must not, on its own, drive `done`
/// up to `total` and falsely trigger fan-in — that would publish a manifest
/// missing every other index.
#[tokio::test]
async fn redelivering_one_index_does_not_falsely_complete_recognition() {
    let (o, broker, _store, state) = harness();
    let job_id = "job-3b";
    drive_through_segment_and_diarize_and_transcode(&o, job_id, 5).await;

    for _ in 0..5 {
        o.handle_recognition_done(RecognitionCompletedEvent {
            job_id: job_id.to_string(),
            index: 0,
            start_ms: 0,
            end_ms: 900,
            transcript_s3_path: format!("transcripts/{job_id}/0.json"),
        })
        .await
        .unwrap();
    }

    let (total, done) = state.get_counters(job_id).await.unwrap();
    assert_eq!((total, done), (5, 1), "index 0 counts once no matter how many times it's redelivered");
    assert_eq!(broker.count("cmd.postprocess"), 0, "recognition is not complete with 4 indices never seen");
}

#[tokio::test]
async fn progress_is_monotone_across_a_full_run() {
    let (o, _broker, _store, state) = harness();
    let job_id = "job-4";

    o.handle_file_uploaded(FileUploadedEvent {
        job_id: job_id.to_string(),
        user_id: "user-4".to_string(),
        storage_path: "raw/2026-01-01/job-4/".to_string(),
    })
    .await
    .unwrap();
    o.handle_preprocess_done(PreprocessCompletedEvent {
        job_id: job_id.to_string(),
        clean_audio_path: format!("clean/{job_id}/audio.wav"),
    })
    .await
    .unwrap();
    drive_through_segment_and_diarize_and_transcode(&o, job_id, 2).await;
    for index in 0..2u32 {
        o.handle_recognition_done(RecognitionCompletedEvent {
            job_id: job_id.to_string(),
            index,
            start_ms: (index as u64) * 1000,
            end_ms: (index as u64) * 1000 + 900,
            transcript_s3_path: format!("transcripts/{job_id}/{index}.json"),
        })
        .await
        .unwrap();
    }
    o.handle_job_finalized(job_id).await.unwrap();

    let log = state.progress_log.lock().unwrap();
    let mut last = 0u8;
    for (logged_job, _status, progress) in log.iter() {
        if logged_job != job_id {
            continue;
        }
        assert!(*progress >= last, "progress regressed: {progress} < {last}");
        last = *progress;
    }
    assert_eq!(last, 100);
}

#[tokio::test]
async fn job_finalized_retains_results_and_hls() {
    let (o, _broker, store, _state) = harness();
    let job_id = "job-5";
    store.put_text(&format!("clean/{job_id}/audio.wav"), "x").await.unwrap();
    store.put_text(&format!("segments/{job_id}/chunk_0000.wav"), "x").await.unwrap();
    store.put_text(&format!("enhanced/{job_id}/chunk_0000.wav"), "x").await.unwrap();
    store.put_text(&format!("transcripts/{job_id}/0.json"), "x").await.unwrap();
    store.put_text(&format!("results/{job_id}/metadata.json"), "x").await.unwrap();
    store.put_text(&format!("hls/{job_id}/playlist.m3u8"), "x").await.unwrap();

    o.handle_job_finalized(job_id).await.unwrap();

    assert!(store.list_files(&format!("clean/{job_id}/")).await.unwrap().is_empty());
    assert!(store.list_files(&format!("segments/{job_id}/")).await.unwrap().is_empty());
    assert!(store.list_files(&format!("enhanced/{job_id}/")).await.unwrap().is_empty());
    assert!(store.list_files(&format!("transcripts/{job_id}/")).await.unwrap().is_empty());
    assert_eq!(store.list_files(&format!("results/{job_id}/")).await.unwrap().len(), 1);
    assert_eq!(store.list_files(&format!("hls/{job_id}/")).await.unwrap().len(), 1);
}

/// Terminal failure/cancel cleanup is strictly broader than the happy path:
/// it also wipes `results/` and `hls/`.
#[tokio::test]
async fn terminate_job_wipes_every_prefix_including_results_and_hls() {
    let (o, broker, store, _state) = harness();
    let job_id = "job-6";
    for prefix in ["raw", "segments", "transcripts", "enhanced", "analysis", "hls", "results"] {
        store.put_text(&format!("{prefix}/{job_id}/artifact"), "x").await.unwrap();
    }

    o.handle_dlq_arrival(job_id).await.unwrap();

    for prefix in ["raw", "segments", "transcripts", "enhanced", "analysis", "hls", "results"] {
        assert!(
            store.list_files(&format!("{prefix}/{job_id}/")).await.unwrap().is_empty(),
            "{prefix}/ should be empty after terminate_job"
        );
    }
    assert_eq!(broker.count("event.job_failed"), 1);
}

/// Mid-flight cancel: after 2 of 5 recognize.done, a cancel command must stop
/// any further postprocess trigger and leave intermediate prefixes empty.
#[tokio::test]
async fn mid_flight_cancel_prevents_postprocess_and_cleans_up() {
    let (o, broker, store, _state) = harness();
    let job_id = "job-7";
    drive_through_segment_and_diarize_and_transcode(&o, job_id, 5).await;
    store.put_text(&format!("segments/{job_id}/chunk_0000.wav"), "x").await.unwrap();

    for index in 0..2u32 {
        o.handle_recognition_done(RecognitionCompletedEvent {
            job_id: job_id.to_string(),
            index,
            start_ms: (index as u64) * 1000,
            end_ms: (index as u64) * 1000 + 900,
            transcript_s3_path: format!("transcripts/{job_id}/{index}.json"),
        })
        .await
        .unwrap();
    }

    o.handle_cancel_command(audio_schemas::CancelCommand {
        job_id: job_id.to_string(),
        reason: "user requested".to_string(),
    })
    .await
    .unwrap();

    // Late, duplicate, or remaining recognize.done deliveries must no-op now.
    for index in 2..5u32 {
        o.handle_recognition_done(RecognitionCompletedEvent {
            job_id: job_id.to_string(),
            index,
            start_ms: (index as u64) * 1000,
            end_ms: (index as u64) * 1000 + 900,
            transcript_s3_path: format!("transcripts/{job_id}/{index}.json"),
        })
        .await
        .unwrap();
    }

    assert_eq!(broker.count("cmd.postprocess"), 0);
    assert_eq!(broker.count("event.job_cancelled"), 1);
    assert!(store.list_files(&format!("segments/{job_id}/")).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_manifest_at_fan_in_is_an_error_not_a_silent_publish() {
    let (o, broker, _store, state) = harness();
    let job_id = "job-8";
    // Mark every prerequisite without ever appending a transcript record —
    // an input-not-found condition per the error taxonomy.
    state.mark_step(job_id, StepKey::RecognitionAll).await.unwrap();
    state.mark_step(job_id, StepKey::Diarization).await.unwrap();
    state.mark_step(job_id, StepKey::Transcode).await.unwrap();

    let err = o
        .handle_transcode_done(TranscodeCompletedEvent {
            job_id: job_id.to_string(),
            hls_path: "hls/job-8/playlist.m3u8".to_string(),
        })
        .await;

    assert!(err.is_err());
    assert_eq!(broker.count("cmd.postprocess"), 0);
}
