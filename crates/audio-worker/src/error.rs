use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("object store error: {0}")]
    Store(#[from] s3::S3Error),

    #[error("broker error: {0}")]
    Broker(#[from] audio_broker::BrokerError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
