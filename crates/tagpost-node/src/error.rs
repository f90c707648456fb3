use std::io;
use std::path::PathBuf;

use tagpost_network::DeliveryError;
use tagpost_storage::StorageError;
use thiserror::Error;

/// Errors that stop the node.
///
/// Per-frame and per-delivery problems are handled inside the loop and never
/// surface here; anything that does surface ends the control loop.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration value is unusable
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid TOML for the node
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Reader process could not be started
    #[error("Failed to start reader {command:?}: {source}")]
    ReaderSpawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Reader pipe or process handling failed
    #[error("Reader I/O error: {0}")]
    Reader(#[source] io::Error),

    /// Durable queue failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Delivery failed in a way that affects the node
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Status display failed
    #[error("Display error: {0}")]
    Display(#[source] io::Error),
}

pub type NodeResult<T> = Result<T, NodeError>;
