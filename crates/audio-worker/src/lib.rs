//! The scaffolding every `apps/worker-*` binary shares: a local scratch
//! directory, download-if-absent, best-effort cleanup, and a re-export of
//! `audio_broker::subscribe` so each worker's `main` differs only in its
//! command type and its compute step.

mod error;

use std::path::{Path, PathBuf};

pub use audio_broker::{subscribe, BrokerProducer, HandlerOutcome, HandlerResult};
pub use error::{Result, WorkerError};
pub use s3::S3Client;

/// Bundles the two outbound collaborators every worker needs plus a private
/// scratch directory, constructed once at process startup and held for the
/// worker's lifetime — the "construction-order boundary" replacement for the
/// original's module-global producer and class-level cached model instance.
pub struct WorkerContext {
    pub s3: S3Client,
    pub producer: BrokerProducer,
    temp_dir: PathBuf,
}

fn worker_temp_dir(worker_name: &str) -> PathBuf {
    std::env::temp_dir().join("audio-worker").join(worker_name)
}

impl WorkerContext {
    pub async fn new(s3: S3Client, producer: BrokerProducer, worker_name: &str) -> Result<Self> {
        let temp_dir = worker_temp_dir(worker_name);
        tokio::fs::create_dir_all(&temp_dir).await?;
        Ok(Self {
            s3,
            producer,
            temp_dir,
        })
    }

    pub fn local_path(&self, file_name: &str) -> PathBuf {
        self.temp_dir.join(file_name)
    }

    /// Downloads `remote_key` to `local_path` unless a file is already there —
    /// matching the original workers' `if not local_input.exists(): download`
    /// short-circuit, which lets a redelivered command skip re-downloading
    /// whatever a previous, interrupted attempt already fetched.
    pub async fn download_if_absent(&self, remote_key: &str, local_path: &Path) -> Result<()> {
        if tokio::fs::try_exists(local_path).await? {
            return Ok(());
        }
        self.s3.download_file(remote_key, local_path).await?;
        Ok(())
    }

    /// Best-effort temp file removal; a cleanup failure never fails the
    /// handler, it only gets logged. Mirrors the original's `_safe_cleanup`.
    pub async fn cleanup(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "temp_cleanup_failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_temp_dir_is_scoped_per_worker_name() {
        let enhancer = worker_temp_dir("enhancer");
        let diarizer = worker_temp_dir("diarizer");
        assert_ne!(enhancer, diarizer);
        assert!(enhancer.ends_with("audio-worker/enhancer"));
    }

    #[tokio::test]
    async fn try_exists_detects_an_already_downloaded_file() {
        // `download_if_absent`'s short-circuit rests entirely on this check
        // returning true before any S3 call is made.
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("already_here.wav");
        tokio::fs::write(&local, b"cached").await.unwrap();
        assert!(tokio::fs::try_exists(&local).await.unwrap());
        assert!(!tokio::fs::try_exists(dir.path().join("missing.wav")).await.unwrap());
    }
}
