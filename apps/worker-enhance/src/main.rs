use std::sync::Arc;
use std::time::Duration;

use audio_models::{Enhancer, SpectralGateEnhancer};
use audio_schemas::{AUDIO_OPS, EnhanceCommand, EnhancementCompletedEvent, WORKER_EVENTS};
use audio_worker::{HandlerOutcome, HandlerResult, S3Client, WorkerContext};

const SERVICE: &str = "audio-worker-enhance";

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
        WorkerContext::new(s3, producer, "enhance")
            .await
            .expect("failed to create worker scratch directory"),
    );
    let enhancer = Arc::new(SpectralGateEnhancer);

    tracing::info!("worker_started");

    let outcome = audio_worker::subscribe(
        &config.rabbitmq_url,
        SERVICE,
        AUDIO_OPS,
        "cmd.enhance",
        config.retry_max,
        move |cmd: EnhanceCommand| {
            let ctx = ctx.clone();
            let enhancer = enhancer.clone();
            async move { handle(&ctx, enhancer.as_ref(), cmd).await }
        },
    )
    .await;

    if let Err(e) = outcome {
        tracing::error!(error = %e, "subscription_ended");
    }
}

async fn handle(ctx: &WorkerContext, enhancer: &dyn Enhancer, cmd: EnhanceCommand) -> HandlerResult {
    let job_id = cmd.job_id.clone();
    let local_input = ctx.local_path(&format!("{job_id}_{}_in.wav", cmd.index));
    let local_output = ctx.local_path(&format!("{job_id}_{}_out.wav", cmd.index));

    let result = run_enhance(ctx, enhancer, &cmd, &local_input, &local_output).await;

    ctx.cleanup(&local_input).await;
    ctx.cleanup(&local_output).await;

    to_outcome(result)
}

async fn run_enhance(
    ctx: &WorkerContext,
    enhancer: &dyn Enhancer,
    cmd: &EnhanceCommand,
    local_input: &std::path::Path,
    local_output: &std::path::Path,
) -> Result<(), String> {
    let job_id = &cmd.job_id;
    tracing::info!(%job_id, index = cmd.index, "enhance_started");

    ctx.download_if_absent(&cmd.s3_path, local_input).await.map_err(|e| e.to_string())?;

    let quality = enhancer.quality(local_input).await.map_err(|e| e.to_string())?;
    tracing::info!(%job_id, index = cmd.index, snr = quality.snr, need_denoise = quality.need_denoise, "enhance_quality_checked");

    let final_s3_path = if quality.need_denoise {
        enhancer.denoise(local_input, local_output).await.map_err(|e| e.to_string())?;
        let denoised_key = enhanced_key(&cmd.s3_path);
        ctx.s3.upload_file(local_output, &denoised_key).await.map_err(|e| e.to_string())?;
        denoised_key
    } else {
        cmd.s3_path.clone()
    };

    let event = EnhancementCompletedEvent {
        job_id: job_id.clone(),
        index: cmd.index,
        s3_path: final_s3_path,
        snr: quality.snr,
        is_denoised: quality.need_denoise,
        start_ms: cmd.start_ms,
        end_ms: cmd.end_ms,
    };
    ctx.producer
        .publish(WORKER_EVENTS, "enhancement.done", &event)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(%job_id, index = cmd.index, "enhance_completed");
    Ok(())
}

/// Only the first `segments/` in the key ever needs replacing: chunk filenames
/// are generated by `worker-segment` and never themselves contain it.
fn enhanced_key(segment_key: &str) -> String {
    segment_key.replacen("segments/", "enhanced/", 1)
}

fn to_outcome(result: Result<(), String>) -> HandlerResult {
    result.map(|()| HandlerOutcome::Ack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enhanced_key_replaces_the_segments_prefix() {
        assert_eq!(
            enhanced_key("segments/job-1/chunk_0.wav"),
            "enhanced/job-1/chunk_0.wav"
        );
    }

    #[test]
    fn enhanced_key_only_replaces_the_first_occurrence() {
        assert_eq!(
            enhanced_key("segments/job-1/segments_backup.wav"),
            "enhanced/job-1/segments_backup.wav"
        );
    }
}
