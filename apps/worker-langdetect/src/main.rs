use std::sync::Arc;
use std::time::Duration;

use audio_models::{LanguageDetector, PlaceholderLanguageDetector};
use audio_schemas::{AUDIO_OPS, LanguageDetectCommand, LanguageDetectionCompletedEvent, WORKER_EVENTS};
use audio_worker::{HandlerOutcome, HandlerResult, S3Client, WorkerContext};

const SERVICE: &str = "audio-worker-langdetect";

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
        WorkerContext::new(s3, producer, "langdetect")
            .await
            .expect("failed to create worker scratch directory"),
    );
    let detector = Arc::new(PlaceholderLanguageDetector);

    tracing::info!("worker_started");

    let outcome = audio_worker::subscribe(
        &config.rabbitmq_url,
        SERVICE,
        AUDIO_OPS,
        "cmd.lang_detect",
        config.retry_max,
        move |cmd: LanguageDetectCommand| {
            let ctx = ctx.clone();
            let detector = detector.clone();
            async move { handle(&ctx, detector.as_ref(), cmd).await }
        },
    )
    .await;

    if let Err(e) = outcome {
        tracing::error!(error = %e, "subscription_ended");
    }
}

async fn handle(ctx: &WorkerContext, detector: &dyn LanguageDetector, cmd: LanguageDetectCommand) -> HandlerResult {
    let job_id = cmd.job_id.clone();
    let local_input = ctx.local_path(&format!("{job_id}_{}.wav", cmd.index));

    let result = run_detect(ctx, detector, &cmd, &local_input).await;

    ctx.cleanup(&local_input).await;

    to_outcome(result)
}

async fn run_detect(
    ctx: &WorkerContext,
    detector: &dyn LanguageDetector,
    cmd: &LanguageDetectCommand,
    local_input: &std::path::Path,
) -> Result<(), String> {
    let job_id = &cmd.job_id;
    tracing::info!(%job_id, index = cmd.index, "lang_detect_started");

    ctx.download_if_absent(&cmd.s3_path, local_input).await.map_err(|e| e.to_string())?;
    let language = detector.detect(local_input).await.map_err(|e| e.to_string())?;

    tracing::info!(%job_id, index = cmd.index, ?language, "lang_detect_resolved");

    let event = LanguageDetectionCompletedEvent {
        job_id: job_id.clone(),
        index: cmd.index,
        s3_path: cmd.s3_path.clone(),
        start_ms: cmd.start_ms,
        end_ms: cmd.end_ms,
        language,
    };
    ctx.producer
        .publish(WORKER_EVENTS, "lang_detect.done", &event)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(%job_id, index = cmd.index, "lang_detect_completed");
    Ok(())
}

fn to_outcome(result: Result<(), String>) -> HandlerResult {
    result.map(|()| HandlerOutcome::Ack)
}
