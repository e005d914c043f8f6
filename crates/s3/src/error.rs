use thiserror::Error;

pub type Result<T> = std::result::Result<T, S3Error>;

#[derive(Debug, Error)]
pub enum S3Error {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("presign error: {0}")]
    Presign(String),

    #[error("upload error: {0}")]
    Upload(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("download error: {0}")]
    Download(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("list error: {0}")]
    List(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("delete error: {0}")]
    Delete(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json at {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
