//! The tagpost edge node.
//!
//! Runs the reader as a child process, turns its output into signed events,
//! keeps them in a durable queue and delivers them to whichever collector is
//! announcing itself on the local network.
//!
//! # Architecture
//!
//! ```text
//! tagpost-reader ──stdout──▶ ScanIngestor ──▶ FileQueue (new)
//!                                                 │
//! collector ◀──HTTP PUT── Deliverer ◀─────────────┘ ──▶ FileQueue (sent)
//!     │                       ▲
//!     └──UDP announcement──▶ DiscoveryListener
//! ```
//!
//! Everything is driven from one [`ControlLoop`] on a single-threaded
//! runtime; no component spawns tasks of its own.

pub mod config;
pub mod control;
pub mod display;
pub mod error;
pub mod identity;
pub mod ingest;

pub use config::{DEFAULT_CONFIG_PATH, NodeConfig};
pub use control::{ControlLoop, LoopSettings, NodeState, ReaderChild};
pub use display::{
    LastScan, MemoryDisplay, PanelDisplay, ScanKind, StatusDisplay, StatusSnapshot, TextPanel,
};
pub use error::{NodeError, NodeResult};
pub use identity::{IdentitySource, LocalIdentity, StaticIdentity, location_badge};
pub use ingest::{IngestReport, ScanIngestor};
