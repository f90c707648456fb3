//! Error types for the reader side.
//!
//! Errors split into two groups. Per-read failures (a collision, an
//! unreadable sector, bad card data) are reported on the output stream as an
//! `E` line and the reader keeps going. Everything else ends the reader
//! process, which the node observes as child exit.

/// Result type alias for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Errors that can occur while reading tags or emitting records.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// Tag source is gone.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// A single read failed.
    #[error("Card read error: {message}")]
    CardRead { message: String },

    /// Data read from the card or source is unusable.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Reader configuration is unusable.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Record could not be encoded.
    #[error("Protocol error: {0}")]
    Protocol(tagpost_core::Error),

    /// Output stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn card_read(message: impl Into<String>) -> Self {
        Self::CardRead {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the reader must stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ReaderError::CardRead { .. } | ReaderError::InvalidData { .. }
        )
    }

    /// Text for the `E` line reporting this error.
    pub fn report(&self) -> String {
        match self {
            ReaderError::CardRead { message } | ReaderError::InvalidData { message } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

impl From<tagpost_core::Error> for ReaderError {
    fn from(error: tagpost_core::Error) -> Self {
        match error {
            tagpost_core::Error::Io(io) => ReaderError::Io(io),
            other => ReaderError::Protocol(other),
        }
    }
}
