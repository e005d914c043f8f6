use std::sync::Arc;
use std::time::Duration;

use audio_schemas::{AUDIO_OPS, PreprocessCommand, PreprocessCompletedEvent, WORKER_EVENTS};
use audio_worker::{HandlerOutcome, HandlerResult, S3Client, WorkerContext};

const SERVICE: &str = "audio-worker-preprocess";

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
        WorkerContext::new(s3, producer, "preprocess")
            .await
            .expect("failed to create worker scratch directory"),
    );

    tracing::info!("worker_started");

    let outcome = audio_worker::subscribe(
        &config.rabbitmq_url,
        SERVICE,
        AUDIO_OPS,
        "cmd.preprocess",
        config.retry_max,
        move |cmd: PreprocessCommand| {
            let ctx = ctx.clone();
            async move { handle(&ctx, cmd).await }
        },
    )
    .await;

    if let Err(e) = outcome {
        tracing::error!(error = %e, "subscription_ended");
    }
}

async fn handle(ctx: &WorkerContext, cmd: PreprocessCommand) -> HandlerResult {
    let job_id = cmd.job_id;
    let local_input = ctx.local_path(&format!("{job_id}_input"));
    let local_output = ctx.local_path(&format!("{job_id}_clean.wav"));

    let result = run_preprocess(ctx, &job_id, &cmd.storage_path, &local_input, &local_output).await;

    ctx.cleanup(&local_input).await;
    ctx.cleanup(&local_output).await;

    to_outcome(result)
}

async fn run_preprocess(
    ctx: &WorkerContext,
    job_id: &str,
    storage_path: &str,
    local_input: &std::path::Path,
    local_output: &std::path::Path,
) -> Result<(), String> {
    tracing::info!(%job_id, "preprocess_started");

    let files = ctx.s3.list_files(storage_path).await.map_err(|e| e.to_string())?;
    let source_key = files
        .first()
        .ok_or_else(|| format!("no files found under {storage_path}"))?;

    ctx.s3.download_file(source_key, local_input).await.map_err(|e| e.to_string())?;
    audio_media::preprocess(local_input, local_output).await.map_err(|e| e.to_string())?;

    let output_key = format!("clean/{job_id}/audio.wav");
    ctx.s3.upload_file(local_output, &output_key).await.map_err(|e| e.to_string())?;

    let event = PreprocessCompletedEvent {
        job_id: job_id.to_string(),
        clean_audio_path: output_key,
    };
    ctx.producer
        .publish(WORKER_EVENTS, "preprocess.done", &event)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(%job_id, "preprocess_completed");
    Ok(())
}

fn to_outcome(result: Result<(), String>) -> HandlerResult {
    result.map(|()| HandlerOutcome::Ack)
}
