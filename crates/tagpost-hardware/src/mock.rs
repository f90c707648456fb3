//! Scriptable tag source for tests and bench setups.

use tokio::sync::mpsc;

use crate::{ReaderError, Result, TagRead, TagSource};

#[derive(Debug)]
enum MockEvent {
    Presented(TagRead),
    Failed(String),
    Disconnected,
}

/// Tag source driven through a [`MockTagHandle`].
///
/// The source ends (returns `Ok(None)`) once every handle is dropped.
///
/// # Examples
///
/// ```
/// use tagpost_hardware::{MockTagSource, TagSource};
///
/// #[tokio::main]
/// async fn main() -> tagpost_hardware::Result<()> {
///     let (mut source, handle) = MockTagSource::new();
///
///     handle.present(vec![0x04, 0xAB, 0xCD, 0xEF, 0x01], "alice,a1b2c3").await?;
///     drop(handle);
///
///     let tag = source.read_tag().await?.unwrap();
///     assert_eq!(tag.uid_hex(), "04ABCDEF01");
///     assert!(source.read_tag().await?.is_none());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTagSource {
    event_rx: mpsc::Receiver<MockEvent>,
    name: String,
}

impl MockTagSource {
    pub fn new() -> (Self, MockTagHandle) {
        Self::with_name("Mock Tag Source")
    }

    pub fn with_name(name: impl Into<String>) -> (Self, MockTagHandle) {
        let (event_tx, event_rx) = mpsc::channel(32);
        let source = Self {
            event_rx,
            name: name.into(),
        };
        (source, MockTagHandle { event_tx })
    }
}

impl TagSource for MockTagSource {
    async fn read_tag(&mut self) -> Result<Option<TagRead>> {
        match self.event_rx.recv().await {
            Some(MockEvent::Presented(tag)) => Ok(Some(tag)),
            Some(MockEvent::Failed(message)) => Err(ReaderError::card_read(message)),
            Some(MockEvent::Disconnected) => Err(ReaderError::disconnected(self.name.clone())),
            None => Ok(None),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handle for driving a [`MockTagSource`].
#[derive(Debug, Clone)]
pub struct MockTagHandle {
    event_tx: mpsc::Sender<MockEvent>,
}

impl MockTagHandle {
    /// Present a card with `uid` carrying `text`.
    ///
    /// # Errors
    /// Returns `ReaderError::Disconnected` if the source was dropped.
    pub async fn present(&self, uid: impl Into<Vec<u8>>, text: impl Into<String>) -> Result<()> {
        self.send(MockEvent::Presented(TagRead::new(uid, text))).await
    }

    /// Simulate a failed read.
    ///
    /// # Errors
    /// Returns `ReaderError::Disconnected` if the source was dropped.
    pub async fn fail(&self, message: impl Into<String>) -> Result<()> {
        self.send(MockEvent::Failed(message.into())).await
    }

    /// Simulate the device going away.
    ///
    /// # Errors
    /// Returns `ReaderError::Disconnected` if the source was dropped.
    pub async fn disconnect(&self) -> Result<()> {
        self.send(MockEvent::Disconnected).await
    }

    async fn send(&self, event: MockEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| ReaderError::disconnected("mock tag channel closed"))
    }
}
