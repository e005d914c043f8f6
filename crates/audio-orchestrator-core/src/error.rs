use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("state store error: {0}")]
    StateStore(String),

    #[error("job {0} has no segments recorded at fan-in")]
    EmptyManifest(String),

    #[error("manifest serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
