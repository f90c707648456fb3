//! Linger window for repeated presentations.
//!
//! A card held against the antenna is read many times per second. The
//! debouncer lets the first read of a (card, owner, outcome) tuple through,
//! suppresses identical reads for the linger window, then lets one through
//! again as a heartbeat and restarts the window. A different tuple is always
//! let through immediately.

use std::time::Duration;

use tagpost_core::{CardId, ScanRecord};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Seen {
    card_id: CardId,
    owner: String,
    outcome: bool,
}

impl Seen {
    fn of(record: &ScanRecord) -> Self {
        let (card_id, owner, outcome) = record.debounce_key();
        Self {
            card_id,
            owner: owner.to_string(),
            outcome,
        }
    }

    fn matches(&self, record: &ScanRecord) -> bool {
        let (card_id, owner, outcome) = record.debounce_key();
        self.card_id == card_id && self.owner == owner && self.outcome == outcome
    }
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<(Seen, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a read at `now`; returns whether it should be emitted.
    pub fn observe(&mut self, record: &ScanRecord, now: Instant) -> bool {
        if let Some((seen, since)) = &mut self.last
            && seen.matches(record)
        {
            if now.saturating_duration_since(*since) < self.window {
                return false;
            }
            *since = now;
            return true;
        }
        self.last = Some((Seen::of(record), now));
        true
    }

    /// Forget the last emission.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
