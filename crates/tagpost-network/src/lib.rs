//! Network side of the tagpost node.
//!
//! # Components
//!
//! - **DiscoveryListener**: hears collector announcements on the UDP
//!   discovery port
//! - **Deliverer**: two-state link that PUTs queued events to the collector
//!
//! Both are driven from the node's control loop; neither spawns tasks.

mod deliverer;
mod discovery;
mod error;

pub use deliverer::{Deliverer, DelivererConfig, LinkState, LinkTransition};
pub use discovery::DiscoveryListener;
pub use error::{DeliveryError, DiscoveryError};
