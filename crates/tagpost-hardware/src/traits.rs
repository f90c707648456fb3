//! Tag source abstraction.
//!
//! A [`TagSource`] yields the raw content of every tag presentation: the UID
//! and the text stored in the card's data blocks. Validation, debouncing and
//! emission happen in [`ReaderProcess`](crate::ReaderProcess), so a source
//! only has to talk to its device.

use crate::Result;

/// Raw content of one tag presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRead {
    /// Card UID bytes as reported by anticollision.
    pub uid: Vec<u8>,

    /// Text stored on the card, possibly padded with spaces or NULs.
    pub text: String,
}

impl TagRead {
    pub fn new(uid: impl Into<Vec<u8>>, text: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            text: text.into(),
        }
    }

    /// UID as uppercase hex, for logs.
    pub fn uid_hex(&self) -> String {
        hex::encode_upper(&self.uid)
    }
}

/// Trait for devices that report tag presentations.
///
/// # Example Implementation
///
/// ```no_run
/// use tagpost_hardware::{Result, TagRead, TagSource};
///
/// struct FixedCard;
///
/// impl TagSource for FixedCard {
///     async fn read_tag(&mut self) -> Result<Option<TagRead>> {
///         Ok(Some(TagRead::new(vec![1, 2, 3, 4, 5], "alice,a1b2c3")))
///     }
///
///     fn name(&self) -> &str {
///         "fixed"
///     }
/// }
/// ```
pub trait TagSource: Send {
    /// Wait for the next presentation.
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Per-read failures are returned as non-fatal errors (see
    /// [`ReaderError::is_fatal`](crate::ReaderError::is_fatal)); the caller
    /// reports them and calls again.
    async fn read_tag(&mut self) -> Result<Option<TagRead>>;

    /// Human-readable source name for logs.
    fn name(&self) -> &str;
}
