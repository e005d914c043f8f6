mod adapters;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use audio_broker::{BrokerProducer, HandlerOutcome, HandlerResult};
use audio_orchestrator_core::{AUDIO_OPS, MEDIA_EVENTS, Orchestrator, WORKER_EVENTS};
use audio_schemas::{
    CancelCommand, DiarizationCompletedEvent, EnhancementCompletedEvent, FileUploadedEvent,
    JobFinalizedEvent, LanguageDetectionCompletedEvent, PreprocessCompletedEvent,
    RecognitionCompletedEvent, SegmentCompletedEvent, TranscodeCompletedEvent,
};
use s3::S3Client;

use adapters::{BrokerAdapter, JobStateAdapter, ObjectStoreAdapter};

const SERVICE: &str = "audio-orchestrator";

/// Every dead-lettered body carries a `job_id` regardless of which command or
/// event it originally was; this is all `handle_dlq_arrival` needs.
#[derive(Debug, Deserialize)]
struct DeadLetter {
    job_id: String,
}

type Core = Orchestrator<BrokerAdapter, ObjectStoreAdapter, JobStateAdapter>;

fn main() -> std::io::Result<()> {
    let env = std::env::var("SENTRY_DSN").ok();

    let _guard = sentry::init(sentry::ClientOptions {
        dsn: env.and_then(|s| s.parse().ok()),
        environment: Some(
            if cfg!(debug_assertions) {
                "development"
            } else {
                "production"
            }
            .into(),
        ),
        traces_sample_rate: 1.0,
        ..Default::default()
    });

    sentry::configure_scope(|scope| {
        scope.set_tag("service", SERVICE);
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
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
    let producer = BrokerProducer::connect(&config.rabbitmq_url)
        .await
        .expect("failed to connect broker producer");
    let jobs = audio_state::JobStateStore::connect(&config.redis_url, config.job_ttl_secs)
        .await
        .expect("failed to connect job state store");

    let core: Arc<Core> = Arc::new(Orchestrator::new(
        BrokerAdapter(Arc::new(producer)),
        ObjectStoreAdapter(Arc::new(s3)),
        JobStateAdapter(Arc::new(jobs)),
    ));

    let amqp_url = config.rabbitmq_url.clone();
    let max_retries = config.retry_max;

    let mut tasks = Vec::new();

    macro_rules! spawn_subscription {
        ($exchange:expr, $routing_key:expr, |$core:ident, $event:ident: $ty:ty| $body:expr) => {{
            let core = core.clone();
            let amqp_url = amqp_url.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = audio_broker::subscribe::<$ty, _, _>(
                    &amqp_url,
                    SERVICE,
                    $exchange,
                    $routing_key,
                    max_retries,
                    move |event: $ty| {
                        let $core = core.clone();
                        let $event = event;
                        async move { $body }
                    },
                )
                .await;
                if let Err(e) = outcome {
                    tracing::error!(error = %e, exchange = $exchange, routing_key = $routing_key, "subscription_ended");
                }
            }));
        }};
    }

    spawn_subscription!(MEDIA_EVENTS, "file.uploaded", |core, event: FileUploadedEvent| {
        to_outcome(core.handle_file_uploaded(event).await)
    });
    spawn_subscription!(WORKER_EVENTS, "preprocess.done", |core, event: PreprocessCompletedEvent| {
        to_outcome(core.handle_preprocess_done(event).await)
    });
    spawn_subscription!(WORKER_EVENTS, "segment.done", |core, event: SegmentCompletedEvent| {
        to_outcome(core.handle_segment_done(event).await)
    });
    spawn_subscription!(WORKER_EVENTS, "diarization.done", |core, event: DiarizationCompletedEvent| {
        to_outcome(core.handle_diarization_done(event).await)
    });
    spawn_subscription!(WORKER_EVENTS, "transcode.done", |core, event: TranscodeCompletedEvent| {
        to_outcome(core.handle_transcode_done(event).await)
    });
    spawn_subscription!(WORKER_EVENTS, "enhancement.done", |core, event: EnhancementCompletedEvent| {
        to_outcome(core.handle_enhancement_done(event).await)
    });
    spawn_subscription!(WORKER_EVENTS, "lang_detect.done", |core, event: LanguageDetectionCompletedEvent| {
        to_outcome(core.handle_language_detection_done(event).await)
    });
    spawn_subscription!(WORKER_EVENTS, "recognition.done", |core, event: RecognitionCompletedEvent| {
        to_outcome(core.handle_recognition_done(event).await)
    });
    spawn_subscription!(WORKER_EVENTS, "job.finalized", |core, event: JobFinalizedEvent| {
        to_outcome(core.handle_job_finalized(&event.job_id).await)
    });
    spawn_subscription!(AUDIO_OPS, "cmd.cancel", |core, cmd: CancelCommand| {
        to_outcome(core.handle_cancel_command(cmd).await)
    });

    for dlq_exchange in [
        format!("{AUDIO_OPS}.dlq"),
        format!("{WORKER_EVENTS}.dlq"),
        format!("{MEDIA_EVENTS}.dlq"),
    ] {
        let core = core.clone();
        let amqp_url = amqp_url.clone();
        tasks.push(tokio::spawn(async move {
            let outcome = audio_broker::subscribe::<DeadLetter, _, _>(
                &amqp_url,
                SERVICE,
                &dlq_exchange,
                "#",
                max_retries,
                move |letter: DeadLetter| {
                    let core = core.clone();
                    async move { to_outcome(core.handle_dlq_arrival(&letter.job_id).await) }
                },
            )
            .await;
            if let Err(e) = outcome {
                tracing::error!(error = %e, exchange = %dlq_exchange, "dlq_subscription_ended");
            }
        }));
    }

    tracing::info!(subscriptions = tasks.len(), "orchestrator_started");

    tokio::select! {
        _ = futures_util::future::join_all(tasks) => {
            tracing::error!("all_subscriptions_exited");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown_signal_received");
        }
    }
}

fn to_outcome(result: audio_orchestrator_core::Result<()>) -> HandlerResult {
    result
        .map(|()| HandlerOutcome::Ack)
        .map_err(|e| e.to_string())
}
