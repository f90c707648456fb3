//! Store-and-forward delivery of queued events.
//!
//! # States
//!
//! - `Disconnected`: initial state; nothing is sent.
//! - `Connected`: a collector endpoint is known and the last exchange with it
//!   succeeded.
//!
//! # Transitions
//!
//! - Disconnected → Connected: a discovery announcement supplied an endpoint
//!   ([`Deliverer::connect`]).
//! - Connected → Connected: a newer announcement replaced the endpoint.
//! - Connected → Disconnected: a delivery attempt failed.
//!
//! There is no retry timer. After a failure the deliverer waits for the next
//! announcement, so the retry cadence is the collector's broadcast interval.
//!
//! # Delivery
//!
//! One call to [`Deliverer::deliver_one`] sends at most one event:
//!
//! ```text
//! PUT http://<host>:<port>/event/<event-id>
//! Content-Type: application/x-www-form-urlencoded
//!
//! data=<event JSON with timestamp-transferred>
//! ```
//!
//! A `200 OK` answer moves the event from `new` to `sent`. Any other outcome
//! leaves it in `new`. The collector may have processed a request whose answer
//! was lost, so delivery is at-least-once and the collector deduplicates by
//! event id.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tagpost_core::CollectorEndpoint;
//! use tagpost_network::{Deliverer, DelivererConfig};
//! use tagpost_storage::FileQueue;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut queue = FileQueue::open("/var/lib/tagpost/queue")?;
//! let mut deliverer = Deliverer::new(DelivererConfig {
//!     timeout: Duration::from_millis(3000),
//! })?;
//!
//! deliverer.connect(CollectorEndpoint::new("10.0.0.5", 9000)?);
//! while deliverer.is_connected() {
//!     if deliverer.deliver_one(&mut queue).await?.is_none() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use tagpost_core::{
    CollectorEndpoint, QueueState, Timestamp,
    constants::{DEFAULT_DELIVERY_TIMEOUT_MS, DELIVERY_FORM_FIELD},
};
use tagpost_storage::{EventQueue, TransitionOutcome};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DeliveryError;

/// Number of link transitions kept for diagnostics.
const MAX_HISTORY_SIZE: usize = 32;

/// Link state of the deliverer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Disconnected,
    Connected,
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "Disconnected"),
            LinkState::Connected => write!(f, "Connected"),
        }
    }
}

/// A recorded change of [`LinkState`].
#[derive(Debug, Clone)]
pub struct LinkTransition {
    pub from: LinkState,
    pub to: LinkState,
    pub reason: String,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub struct DelivererConfig {
    /// Upper bound for one delivery request, connect included.
    pub timeout: Duration,
}

impl Default for DelivererConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_DELIVERY_TIMEOUT_MS),
        }
    }
}

/// Sends queued events to the current collector.
pub struct Deliverer {
    client: Client,
    endpoint: Option<CollectorEndpoint>,
    state: LinkState,
    history: VecDeque<LinkTransition>,
}

impl Deliverer {
    /// # Errors
    /// Returns `DeliveryError::Transport` if the HTTP client cannot be built.
    pub fn new(config: DelivererConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: None,
            state: LinkState::Disconnected,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        })
    }

    pub fn link_state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn endpoint(&self) -> Option<&CollectorEndpoint> {
        self.endpoint.as_ref()
    }

    /// Link transitions, oldest first.
    pub fn history(&self) -> &VecDeque<LinkTransition> {
        &self.history
    }

    /// Adopt `endpoint` and enter `Connected`.
    ///
    /// Called for every announcement; a newer endpoint always replaces the
    /// previous one.
    pub fn connect(&mut self, endpoint: CollectorEndpoint) {
        if self.endpoint.as_ref() != Some(&endpoint) {
            info!(endpoint = %endpoint, "Collector endpoint updated");
        }
        let reason = format!("announcement from {endpoint}");
        self.endpoint = Some(endpoint);
        self.set_state(LinkState::Connected, reason);
    }

    /// Drop to `Disconnected`, keeping the endpoint for display.
    pub fn disconnect(&mut self, reason: impl Into<String>) {
        self.set_state(LinkState::Disconnected, reason.into());
    }

    /// Attempt delivery of one event from `new`.
    ///
    /// Returns `Ok(None)` when disconnected or when nothing is pending, and
    /// `Ok(Some(id))` after an event was acknowledged and moved to `sent`.
    ///
    /// # Errors
    /// A failed request moves the deliverer to `Disconnected` and returns the
    /// transport or rejection error; the event stays in `new`. A record that
    /// cannot be decoded is quarantined and the next one is tried. Other
    /// queue failures are returned as `DeliveryError::Storage` and are fatal,
    /// see [`DeliveryError::is_fatal`].
    pub async fn deliver_one<Q: EventQueue>(
        &mut self,
        queue: &mut Q,
    ) -> Result<Option<Uuid>, DeliveryError> {
        if !self.is_connected() {
            return Ok(None);
        }
        let Some(endpoint) = self.endpoint.clone() else {
            self.disconnect("no endpoint");
            return Err(DeliveryError::NoEndpoint);
        };
        let (id, event) = loop {
            let Some(id) = queue.next(QueueState::New)? else {
                return Ok(None);
            };
            match queue.read(QueueState::New, &id) {
                Ok(event) => break (id, event),
                Err(e) if e.is_corrupt() => {
                    warn!(event_id = %id, error = %e, "Skipping undecodable event");
                    queue.quarantine(QueueState::New, &id)?;
                }
                Err(e) => return Err(e.into()),
            }
        };
        let body = event.for_transfer(Timestamp::now()).to_json()?;

        match self.put(&endpoint, &id, body).await {
            Ok(()) => {
                if queue.transition(QueueState::New, QueueState::Sent, &id)?
                    == TransitionOutcome::AlreadyApplied
                {
                    warn!(event_id = %id, "Event was already marked sent");
                }
                info!(event_id = %id, endpoint = %endpoint, "Delivered event");
                Ok(Some(id))
            }
            Err(e) => {
                warn!(event_id = %id, endpoint = %endpoint, error = %e, "Delivery failed");
                self.disconnect(e.to_string());
                Err(e)
            }
        }
    }

    async fn put(
        &self,
        endpoint: &CollectorEndpoint,
        id: &Uuid,
        body: String,
    ) -> Result<(), DeliveryError> {
        let url = endpoint.event_url(id);
        debug!(url = %url, bytes = body.len(), "PUT event");

        let response = self
            .client
            .put(&url)
            .form(&[(DELIVERY_FORM_FIELD, body)])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(DeliveryError::Rejected {
                status: status.as_u16(),
            }),
        }
    }

    fn set_state(&mut self, to: LinkState, reason: String) {
        let from = self.state;
        if from != to {
            info!(from = %from, to = %to, reason = %reason, "Link state changed");
        }
        self.state = to;

        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(LinkTransition {
            from,
            to,
            reason,
            at: Instant::now(),
        });
    }
}

impl fmt::Debug for Deliverer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deliverer")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .finish()
    }
}
