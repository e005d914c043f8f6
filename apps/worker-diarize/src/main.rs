use std::sync::Arc;
use std::time::Duration;

use audio_models::{Diarizer, PlaceholderDiarizer};
use audio_schemas::{AUDIO_OPS, DiarizationCompletedEvent, DiarizeCommand, WORKER_EVENTS};
use audio_worker::{HandlerOutcome, HandlerResult, S3Client, WorkerContext};

const SERVICE: &str = "audio-worker-diarize";

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
        WorkerContext::new(s3, producer, "diarize")
            .await
            .expect("failed to create worker scratch directory"),
    );
    let diarizer = Arc::new(PlaceholderDiarizer);

    tracing::info!("worker_started");

    let outcome = audio_worker::subscribe(
        &config.rabbitmq_url,
        SERVICE,
        AUDIO_OPS,
        "cmd.diarize",
        config.retry_max,
        move |cmd: DiarizeCommand| {
            let ctx = ctx.clone();
            let diarizer = diarizer.clone();
            async move { handle(&ctx, diarizer.as_ref(), cmd).await }
        },
    )
    .await;

    if let Err(e) = outcome {
        tracing::error!(error = %e, "subscription_ended");
    }
}

async fn handle(ctx: &WorkerContext, diarizer: &dyn Diarizer, cmd: DiarizeCommand) -> HandlerResult {
    let job_id = cmd.job_id;
    let local_input = ctx.local_path(&format!("{job_id}.wav"));

    let result = run_diarize(ctx, diarizer, &job_id, &cmd.clean_audio_path, &local_input).await;

    ctx.cleanup(&local_input).await;

    to_outcome(result)
}

async fn run_diarize(
    ctx: &WorkerContext,
    diarizer: &dyn Diarizer,
    job_id: &str,
    clean_audio_path: &str,
    local_input: &std::path::Path,
) -> Result<(), String> {
    tracing::info!(%job_id, "diarize_started");

    ctx.s3.download_file(clean_audio_path, local_input).await.map_err(|e| e.to_string())?;
    let speaker_segments = diarizer.diarize(local_input).await.map_err(|e| e.to_string())?;

    tracing::info!(%job_id, turns = speaker_segments.len(), "diarize_found_turns");

    let event = DiarizationCompletedEvent {
        job_id: job_id.to_string(),
        speaker_segments,
    };
    ctx.producer
        .publish(WORKER_EVENTS, "diarization.done", &event)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(%job_id, "diarize_completed");
    Ok(())
}

fn to_outcome(result: Result<(), String>) -> HandlerResult {
    result.map(|()| HandlerOutcome::Ack)
}
