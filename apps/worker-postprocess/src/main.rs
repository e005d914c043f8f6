use std::sync::Arc;
use std::time::Duration;

use audio_align::{SpeakerTurn, WordRecord, align};
use audio_schemas::{
    AUDIO_OPS, Assets, FinalMetadata, JobFinalizedEvent, PostProcessCommand, ResultsBlock,
    SegmentRecord, TranscriptWord, WORKER_EVENTS,
};
use audio_worker::{HandlerOutcome, HandlerResult, S3Client, WorkerContext};

const SERVICE: &str = "audio-worker-postprocess";

fn main() -> std::io::Result<()> {
    let _guard = sentry::init(sentry::ClientOptions {
        dsn: std::env::var("SENTRY_DSN").ok().and_then(|s| s.parse().ok()),
        environment: Some(if cfg!(debug_assertions) { "development" } else { "production" }.into()),
        traces_sample_rate: 1.0,
        ..Default::default()
    });
    sentry::configure_scope(|scope| scope.set_tag("service", SERVICE));

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run());

    if let Some(client) = sentry::Hub::current().client() {
        client.close(Some(Duration::from_secs(2)));
    }
    Ok(())
}

async fn run() {
    let config = audio_config::config();

    let s3 = S3Client::from_env(&config.s3_bucket_name, config.s3_endpoint.as_deref()).await;
    let producer = audio_worker::BrokerProducer::connect(&config.rabbitmq_url)
        .await
        .expect("failed to connect broker producer");
    let ctx = Arc::new(
        WorkerContext::new(s3, producer, "postprocess")
            .await
            .expect("failed to create worker scratch directory"),
    );

    tracing::info!("worker_started");

    let outcome = audio_worker::subscribe(
        &config.rabbitmq_url,
        SERVICE,
        AUDIO_OPS,
        "cmd.postprocess",
        config.retry_max,
        move |cmd: PostProcessCommand| {
            let ctx = ctx.clone();
            async move { handle(&ctx, cmd).await }
        },
    )
    .await;

    if let Err(e) = outcome {
        tracing::error!(error = %e, "subscription_ended");
    }
}

async fn handle(ctx: &WorkerContext, cmd: PostProcessCommand) -> HandlerResult {
    to_outcome(run_postprocess(ctx, &cmd.job_id).await)
}

async fn run_postprocess(ctx: &WorkerContext, job_id: &str) -> Result<(), String> {
    tracing::info!(%job_id, "postprocess_started");

    let manifest_key = format!("analysis/{job_id}/segments_manifest.json");
    let records: Vec<SegmentRecord> = ctx
        .s3
        .read_json(&manifest_key)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("missing segments manifest at {manifest_key}"))?;

    let mut words = Vec::new();
    for record in &records {
        let chunk_words: Vec<TranscriptWord> = ctx
            .s3
            .read_json(&record.transcript_s3_path)
            .await
            .map_err(|e| e.to_string())?
            .unwrap_or_default();
        let offset = record.start_ms as f64 / 1000.0;
        words.extend(chunk_words.into_iter().map(|w| WordRecord {
            word: w.word,
            start: w.start + offset,
            end: w.end + offset,
        }));
    }

    let diarization_key = format!("analysis/{job_id}/diarization.json");
    let turns: Vec<SpeakerTurn> = ctx
        .s3
        .read_json(&diarization_key)
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_else(|| {
            tracing::warn!(%job_id, "diarization_missing_falling_back_to_unattributed");
            Vec::new()
        });

    let aligned = align(&words, &turns);

    let hls_path = format!("hls/{job_id}/playlist.m3u8");
    let text_path = format!("results/{job_id}/transcript.txt");
    let processed_at = chrono::Utc::now().to_rfc3339();

    let transcript_text = render_transcript(job_id, &processed_at, &aligned);
    ctx.s3
        .upload_bytes(transcript_text.into_bytes(), &text_path)
        .await
        .map_err(|e| e.to_string())?;

    let metadata = FinalMetadata {
        job_id: job_id.to_string(),
        status: "COMPLETED".to_string(),
        processed_at,
        assets: Assets {
            original: None,
            hls: Some(hls_path),
            text_file: Some(text_path),
        },
        results: ResultsBlock {
            transcript_aligned: aligned,
        },
    };

    let metadata_path = format!("results/{job_id}/metadata.json");
    let body = serde_json::to_vec(&metadata).map_err(|e| e.to_string())?;
    ctx.s3.upload_bytes(body, &metadata_path).await.map_err(|e| e.to_string())?;

    let event = JobFinalizedEvent {
        job_id: job_id.to_string(),
        metadata_path,
        status: "COMPLETED".to_string(),
    };
    ctx.producer
        .publish(WORKER_EVENTS, "job.finalized", &event)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(%job_id, segments = records.len(), "postprocess_completed");
    Ok(())
}

fn render_transcript(job_id: &str, processed_at: &str, segments: &[audio_align::AlignedSegment]) -> String {
    let mut out = format!("TRANSCRIPT FOR JOB: {job_id}\nDATE: {processed_at}\n====\n");
    for seg in segments {
        out.push_str(&format!("[{}] {}: {}\n", format_timestamp(seg.start), seg.speaker, seg.text));
    }
    out
}

fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn to_outcome(result: Result<(), String>) -> HandlerResult {
    result.map(|()| HandlerOutcome::Ack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio_align::AlignedSegment;

    #[test]
    fn format_timestamp_pads_minutes_and_seconds() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.0), "01:05");
        assert_eq!(format_timestamp(3725.0), "62:05");
    }

    #[test]
    fn render_transcript_lists_one_line_per_segment() {
        let segments = vec![
            AlignedSegment { speaker: "SPEAKER_00".into(), start: 0.0, end: 1.0, text: "hello".into() },
            AlignedSegment { speaker: "SPEAKER_01".into(), start: 65.0, end: 66.0, text: "world".into() },
        ];
        let text = render_transcript("job-1", "2026-01-01T00:00:00Z", &segments);
        assert!(text.starts_with("TRANSCRIPT FOR JOB: job-1\nDATE: 2026-01-01T00:00:00Z\n====\n"));
        assert!(text.contains("[00:00] SPEAKER_00: hello\n"));
        assert!(text.contains("[01:05] SPEAKER_01: world\n"));
    }
}
