use std::sync::Arc;

use audio_broker::BrokerProducer;
use audio_state::JobStateStore;
use s3::S3Client;

/// Shared collaborators behind every handler: the object store (for presigned
/// URLs and transcript-sync uploads), the broker producer (for `file.uploaded`
/// and `cmd.cancel`), and the state store (for progress reads and the SSE feed).
#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
    pub s3: S3Client,
    pub producer: BrokerProducer,
    pub jobs: JobStateStore,
}

impl AppState {
    pub fn new(s3: S3Client, producer: BrokerProducer, jobs: JobStateStore) -> Self {
        Self(Arc::new(Inner {
            s3,
            producer,
            jobs,
        }))
    }

    pub fn s3(&self) -> &S3Client {
        &self.0.s3
    }

    pub fn producer(&self) -> &BrokerProducer {
        &self.0.producer
    }

    pub fn jobs(&self) -> &JobStateStore {
        &self.0.jobs
    }
}
