use tagpost_storage::StorageError;
use thiserror::Error;

/// Errors raised while handing an event to the collector.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No collector endpoint is known yet
    #[error("No collector endpoint")]
    NoEndpoint,

    /// Request could not be completed (refused, reset, timed out)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Collector answered with something other than 200 OK
    #[error("Collector rejected event with status {status}")]
    Rejected { status: u16 },

    /// Event could not be encoded for transfer
    #[error("Serialization error: {0}")]
    Serialization(#[from] tagpost_core::Error),

    /// Queue failed underneath the delivery
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl DeliveryError {
    /// Whether the error invalidates the node rather than the link.
    ///
    /// Link failures only drop the deliverer to `Disconnected`; a failing
    /// queue means captured events can no longer be kept safe.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeliveryError::Storage(_))
    }
}

/// Errors raised by the discovery listener.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Socket could not be bound or read
    #[error("Discovery socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Datagram is not a valid announcement
    #[error("Malformed announcement: {0}")]
    Malformed(String),
}
