use std::sync::Arc;
use std::time::Duration;

use audio_schemas::{AUDIO_OPS, TranscodeCommand, TranscodeCompletedEvent, WORKER_EVENTS};
use audio_worker::{HandlerOutcome, HandlerResult, S3Client, WorkerContext};

const SERVICE: &str = "audio-worker-transcode";

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
        WorkerContext::new(s3, producer, "transcode")
            .await
            .expect("failed to create worker scratch directory"),
    );

    tracing::info!("worker_started");

    let outcome = audio_worker::subscribe(
        &config.rabbitmq_url,
        SERVICE,
        AUDIO_OPS,
        "cmd.transcode",
        config.retry_max,
        move |cmd: TranscodeCommand| {
            let ctx = ctx.clone();
            async move { handle(&ctx, cmd).await }
        },
    )
    .await;

    if let Err(e) = outcome {
        tracing::error!(error = %e, "subscription_ended");
    }
}

async fn handle(ctx: &WorkerContext, cmd: TranscodeCommand) -> HandlerResult {
    let job_id = cmd.job_id.clone();
    let local_input = ctx.local_path(&format!("{job_id}_clean.wav"));
    let local_output_dir = ctx.local_path(&format!("{job_id}_hls"));

    let result = run_transcode(ctx, &cmd, &local_input, &local_output_dir).await;

    ctx.cleanup(&local_input).await;
    if let Err(e) = tokio::fs::remove_dir_all(&local_output_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, path = %local_output_dir.display(), "hls_scratch_cleanup_failed");
        }
    }

    to_outcome(result)
}

async fn run_transcode(
    ctx: &WorkerContext,
    cmd: &TranscodeCommand,
    local_input: &std::path::Path,
    local_output_dir: &std::path::Path,
) -> Result<(), String> {
    let job_id = &cmd.job_id;
    tracing::info!(%job_id, "transcode_started");

    ctx.s3
        .download_file(&cmd.clean_audio_path, local_input)
        .await
        .map_err(|e| e.to_string())?;

    audio_media::transcode_to_hls(local_input, local_output_dir)
        .await
        .map_err(|e| e.to_string())?;

    let prefix = format!("hls/{job_id}");
    let mut entries = tokio::fs::read_dir(local_output_dir).await.map_err(|e| e.to_string())?;
    while let Some(entry) = entries.next_entry().await.map_err(|e| e.to_string())? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let object_key = format!("{prefix}/{file_name}");
        ctx.s3.upload_file(&path, &object_key).await.map_err(|e| e.to_string())?;
    }

    let event = TranscodeCompletedEvent {
        job_id: job_id.clone(),
        hls_path: format!("{prefix}/playlist.m3u8"),
    };
    ctx.producer
        .publish(WORKER_EVENTS, "transcode.done", &event)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(%job_id, "transcode_completed");
    Ok(())
}

fn to_outcome(result: Result<(), String>) -> HandlerResult {
    result.map(|()| HandlerOutcome::Ack)
}
