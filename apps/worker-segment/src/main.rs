use std::sync::Arc;
use std::time::Duration;

use audio_schemas::{AUDIO_OPS, SegmentCommand, SegmentCompletedEvent, SegmentDescriptor, WORKER_EVENTS};
use audio_worker::{HandlerOutcome, HandlerResult, S3Client, WorkerContext};

const SERVICE: &str = "audio-worker-segment";

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
        WorkerContext::new(s3, producer, "segment")
            .await
            .expect("failed to create worker scratch directory"),
    );

    tracing::info!("worker_started");

    let outcome = audio_worker::subscribe(
        &config.rabbitmq_url,
        SERVICE,
        AUDIO_OPS,
        "cmd.segment",
        config.retry_max,
        move |cmd: SegmentCommand| {
            let ctx = ctx.clone();
            async move { handle(&ctx, cmd).await }
        },
    )
    .await;

    if let Err(e) = outcome {
        tracing::error!(error = %e, "subscription_ended");
    }
}

async fn handle(ctx: &WorkerContext, cmd: SegmentCommand) -> HandlerResult {
    let job_id = cmd.job_id;
    let local_input = ctx.local_path(&format!("{job_id}_input.wav"));
    let chunks_dir = ctx.local_path(&format!("{job_id}_chunks"));

    let result = run_segment(ctx, &job_id, &cmd.clean_audio_path, &local_input, &chunks_dir).await;

    ctx.cleanup(&local_input).await;
    let _ = tokio::fs::remove_dir_all(&chunks_dir).await;

    to_outcome(result)
}

async fn run_segment(
    ctx: &WorkerContext,
    job_id: &str,
    clean_audio_path: &str,
    local_input: &std::path::Path,
    chunks_dir: &std::path::Path,
) -> Result<(), String> {
    tracing::info!(%job_id, "segment_started");

    ctx.s3.download_file(clean_audio_path, local_input).await.map_err(|e| e.to_string())?;

    let local_input = local_input.to_path_buf();
    let chunks_dir_owned = chunks_dir.to_path_buf();
    let chunks = tokio::task::spawn_blocking(move || audio_media::split_audio_smart(&local_input, &chunks_dir_owned))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())?;

    tracing::info!(%job_id, chunks = chunks.len(), "segment_split_complete");

    let mut segments = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let s3_key = format!("segments/{job_id}/chunk_{}.wav", chunk.index);
        ctx.s3.upload_file(&chunk.local_path, &s3_key).await.map_err(|e| e.to_string())?;
        segments.push(SegmentDescriptor {
            index: chunk.index,
            s3_path: s3_key,
            start_ms: chunk.start_ms,
            end_ms: chunk.end_ms,
        });
    }

    let event = SegmentCompletedEvent {
        job_id: job_id.to_string(),
        audio_path: clean_audio_path.to_string(),
        segments,
    };
    ctx.producer
        .publish(WORKER_EVENTS, "segment.done", &event)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(%job_id, "segment_completed");
    Ok(())
}

fn to_outcome(result: Result<(), String>) -> HandlerResult {
    result.map(|()| HandlerOutcome::Ack)
}
