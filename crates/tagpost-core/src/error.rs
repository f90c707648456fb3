use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Record errors
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid signature suffix: {0}")]
    InvalidSignatureSuffix(String),

    #[error("Invalid owner: {0}")]
    InvalidOwner(String),

    // Network errors
    #[error("Invalid collector endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid announcement: {0}")]
    InvalidAnnouncement(String),

    // Queue errors
    #[error("Invalid queue state: {0}")]
    InvalidQueueState(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
