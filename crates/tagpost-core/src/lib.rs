//! Core domain types for the tagpost edge node.
//!
//! Everything that more than one crate needs to agree on lives here: the
//! reader's [`ScanRecord`], the durable [`Event`], the queue states, the
//! collector endpoint learned from discovery, and the tamper-evidence
//! [`signature`] computed over every event before it is persisted.

pub mod constants;
pub mod error;
pub mod signature;
pub mod types;

pub use error::{Error, Result};
pub use signature::{SignedFields, compute_signature};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
