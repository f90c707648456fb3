//! Shared constants for the tagpost pipeline.
//!
//! The values here are part of the observable contract between the node, the
//! reader process and the collector. Changing a wire-level constant (sentinel,
//! field names, paths, ports) breaks compatibility with deployed peers.
//!
//! # Usage
//!
//! ```
//! use tagpost_core::constants::*;
//!
//! assert_eq!(READER_ERROR_SENTINEL, 'E');
//! assert_eq!(SIGNATURE_SUFFIX_LEN, 6);
//! assert_eq!(DEFAULT_DISCOVERY_PORT, 5000);
//! ```

// ============================================================================
// Reader line protocol
// ============================================================================

/// First character of a reader line that reports a reader-side error.
///
/// Such lines carry no record; the node shows a no-read placeholder.
pub const READER_ERROR_SENTINEL: char = 'E';

/// Line terminator used by the reader protocol.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Number of hex characters in the signature suffix stored on a card.
pub const SIGNATURE_SUFFIX_LEN: usize = 6;

/// Number of UID bytes folded into the numeric card id.
pub const CARD_UID_BYTES: usize = 5;

// ============================================================================
// Wire field names
// ============================================================================

/// Field name of the card id in reader records and events.
pub const FIELD_CARD_ID: &str = "cardid";

/// Field name of the card owner.
pub const FIELD_OWNER: &str = "owner";

/// Field name of the 6-character suffix read from the card.
pub const FIELD_SIGNATURE_SUFFIX: &str = "sha";

/// Field name of the validation outcome.
pub const FIELD_OUTCOME: &str = "outcome";

/// Field name of the event id.
pub const FIELD_EVENT_ID: &str = "event_id";

/// Field name of the capture location.
pub const FIELD_LOCATION: &str = "location";

/// Field name of the capturing device.
pub const FIELD_DEVICE: &str = "device";

/// Field name of the capture timestamp.
pub const FIELD_TIMESTAMP_DEVICE: &str = "timestamp-device";

/// Field name of the delivery timestamp. Never part of the signature.
pub const FIELD_TIMESTAMP_TRANSFERRED: &str = "timestamp-transferred";

/// Field name of the integrity signature. Never part of the signature.
pub const FIELD_SIGNATURE: &str = "signature";

// ============================================================================
// Discovery and delivery
// ============================================================================

/// Well-known UDP port collectors announce themselves on.
pub const DEFAULT_DISCOVERY_PORT: u16 = 5000;

/// Largest announcement datagram accepted, in bytes.
pub const MAX_ANNOUNCEMENT_LEN: usize = 100;

/// Path prefix of the collector's event resource.
pub const EVENT_PATH_PREFIX: &str = "/event";

/// Name of the form field carrying the JSON-encoded event.
pub const DELIVERY_FORM_FIELD: &str = "data";

/// Default timeout for one delivery attempt, in milliseconds.
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 3000;

// ============================================================================
// Timers
// ============================================================================

/// Default reader linger window, in seconds.
pub const DEFAULT_LINGER_SECS: u64 = 1;

/// How long the last scanned name stays on the panel, in seconds.
pub const DEFAULT_NAME_LINGER_SECS: u64 = 5;

/// Interval between status panel refreshes, in seconds.
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 5;

/// Interval between network identity refreshes, in seconds.
pub const DEFAULT_IDENTITY_REFRESH_SECS: u64 = 30;

// ============================================================================
// Placeholders
// ============================================================================

/// Device name used when none is configured.
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Location label used when none is configured.
pub const UNKNOWN_LOCATION: &str = "???";

/// Address label used while the node has no network address.
pub const UNKNOWN_ADDRESS: &str = "...";

/// Label shown when the reader reported an error or a card failed validation.
pub const NO_READ_LABEL: &str = "???";
