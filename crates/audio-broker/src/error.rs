use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("invalid message body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("handler failed: {0}")]
    Handler(String),
}
