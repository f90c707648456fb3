//! Durable event queue for the tagpost edge node.
//!
//! Captured events are written into the `new` state as soon as they are
//! signed and stay there until a collector acknowledges them, at which point
//! they move to `sent`. The queue survives process crashes and power loss at
//! any point of either operation.
//!
//! # Example
//!
//! ```no_run
//! use tagpost_core::QueueState;
//! use tagpost_storage::{EventQueue, FileQueue};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut queue = FileQueue::open("/var/lib/tagpost/queue")?;
//!
//! if let Some(id) = queue.next(QueueState::New)? {
//!     let event = queue.read(QueueState::New, &id)?;
//!     println!("pending: {} at {}", event.owner, event.location);
//!     queue.transition(QueueState::New, QueueState::Sent, &id)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod queue;

pub use error::{StorageError, StorageResult};
pub use queue::{EventQueue, FileQueue, MemoryQueue, TransitionOutcome};
