use thiserror::Error;

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("invalid json for job {job_id}: {source}")]
    Json {
        job_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown job status {0:?}")]
    UnknownStatus(String),

    #[error("job {0} has no status recorded")]
    JobNotFound(String),
}
