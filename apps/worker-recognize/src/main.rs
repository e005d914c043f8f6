use std::sync::Arc;
use std::time::Duration;

use audio_models::{PlaceholderRecognizer, SpeechRecognizer};
use audio_schemas::{AUDIO_OPS, RecognitionCompletedEvent, RecognizeCommand, WORKER_EVENTS};
use audio_worker::{HandlerOutcome, HandlerResult, S3Client, WorkerContext};

const SERVICE: &str = "audio-worker-recognize";

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
        WorkerContext::new(s3, producer, "recognize")
            .await
            .expect("failed to create worker scratch directory"),
    );
    let recognizer = Arc::new(PlaceholderRecognizer);

    tracing::info!("worker_started");

    let outcome = audio_worker::subscribe(
        &config.rabbitmq_url,
        SERVICE,
        AUDIO_OPS,
        "cmd.recognize",
        config.retry_max,
        move |cmd: RecognizeCommand| {
            let ctx = ctx.clone();
            let recognizer = recognizer.clone();
            async move { handle(&ctx, recognizer.as_ref(), cmd).await }
        },
    )
    .await;

    if let Err(e) = outcome {
        tracing::error!(error = %e, "subscription_ended");
    }
}

async fn handle(ctx: &WorkerContext, recognizer: &dyn SpeechRecognizer, cmd: RecognizeCommand) -> HandlerResult {
    let job_id = cmd.job_id.clone();
    let local_input = ctx.local_path(&format!("{job_id}_{}.wav", cmd.index));

    let result = run_recognize(ctx, recognizer, &cmd, &local_input).await;

    ctx.cleanup(&local_input).await;

    to_outcome(result)
}

async fn run_recognize(
    ctx: &WorkerContext,
    recognizer: &dyn SpeechRecognizer,
    cmd: &RecognizeCommand,
    local_input: &std::path::Path,
) -> Result<(), String> {
    let job_id = &cmd.job_id;
    tracing::info!(%job_id, index = cmd.index, "recognize_started");

    ctx.download_if_absent(&cmd.s3_path, local_input).await.map_err(|e| e.to_string())?;

    let words = recognizer
        .recognize(local_input, cmd.language.as_deref())
        .await
        .map_err(|e| e.to_string())?;

    let transcript_s3_path = format!("transcripts/{job_id}/{}.json", cmd.index);
    let body = serde_json::to_vec(&words).map_err(|e| e.to_string())?;
    ctx.s3
        .upload_bytes(body, &transcript_s3_path)
        .await
        .map_err(|e| e.to_string())?;

    let event = RecognitionCompletedEvent {
        job_id: job_id.clone(),
        index: cmd.index,
        start_ms: cmd.start_ms,
        end_ms: cmd.end_ms,
        transcript_s3_path,
    };
    ctx.producer
        .publish(WORKER_EVENTS, "recognition.done", &event)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(%job_id, index = cmd.index, words = words.len(), "recognize_completed");
    Ok(())
}

fn to_outcome(result: Result<(), String>) -> HandlerResult {
    result.map(|()| HandlerOutcome::Ack)
}
