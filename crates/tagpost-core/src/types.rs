use crate::{
    Result,
    constants::{
        CARD_UID_BYTES, EVENT_PATH_PREFIX, FIELD_CARD_ID, FIELD_DEVICE, FIELD_EVENT_ID,
        FIELD_LOCATION, FIELD_OUTCOME, FIELD_OWNER, FIELD_SIGNATURE_SUFFIX,
        FIELD_TIMESTAMP_DEVICE, SIGNATURE_SUFFIX_LEN, UNKNOWN_ADDRESS, UNKNOWN_DEVICE,
        UNKNOWN_LOCATION,
    },
    error::Error,
    signature::{SignedFields, compute_signature},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

/// Numeric card identifier derived from the card UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(u64);

impl CardId {
    pub fn new(id: u64) -> Self {
        CardId(id)
    }

    /// Fold the first five UID bytes into a big-endian number.
    ///
    /// # Errors
    /// Returns `Error::InvalidRecord` if the UID is shorter than five bytes.
    pub fn from_uid(uid: &[u8]) -> Result<Self> {
        if uid.len() < CARD_UID_BYTES {
            return Err(Error::InvalidRecord(format!(
                "UID must have at least {CARD_UID_BYTES} bytes, got {}",
                uid.len()
            )));
        }
        let id = uid[..CARD_UID_BYTES]
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
        Ok(CardId(id))
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Six hex characters stored on the card next to the owner name.
///
/// The reader recomputes the suffix from the pre-shared key and compares it
/// with this value to decide the outcome of a presentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SignatureSuffix(String);

impl SignatureSuffix {
    /// Create a suffix, checking length and alphabet.
    ///
    /// # Errors
    /// Returns `Error::InvalidSignatureSuffix` unless the input is exactly six
    /// ASCII hex digits.
    pub fn new(suffix: &str) -> Result<Self> {
        if suffix.len() != SIGNATURE_SUFFIX_LEN {
            return Err(Error::InvalidSignatureSuffix(format!(
                "expected {SIGNATURE_SUFFIX_LEN} characters, got {:?}",
                suffix
            )));
        }
        if !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidSignatureSuffix(format!(
                "non-hex characters in {:?}",
                suffix
            )));
        }
        Ok(SignatureSuffix(suffix.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SignatureSuffix {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        SignatureSuffix::new(&value)
    }
}

impl From<SignatureSuffix> for String {
    fn from(value: SignatureSuffix) -> Self {
        value.0
    }
}

impl fmt::Display for SignatureSuffix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wall-clock instant with microsecond precision.
///
/// On the wire it is a floating point number of seconds since the Unix epoch.
/// For signing it is rendered as `<seconds>.<micros>` with exactly six
/// fractional digits, which is stable across float formatters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    #[must_use]
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// # Errors
    /// Returns `Error::InvalidTimestamp` if the value is out of chrono's range.
    pub fn from_micros(micros: i64) -> Result<Self> {
        DateTime::from_timestamp_micros(micros)
            .map(Timestamp)
            .ok_or_else(|| Error::InvalidTimestamp(format!("{micros} microseconds")))
    }

    #[must_use]
    pub fn as_micros(&self) -> i64 {
        self.0.timestamp_micros()
    }

    #[must_use]
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Canonical text used inside the signature.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{}.{:06}", self.0.timestamp(), self.0.timestamp_subsec_micros())
    }

    fn as_secs_f64(&self) -> f64 {
        self.as_micros() as f64 / 1_000_000.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    /// Truncates to whole microseconds.
    fn from(value: DateTime<Utc>) -> Self {
        let micros = value.timestamp_micros();
        Timestamp(DateTime::from_timestamp_micros(micros).unwrap_or(value))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() {
            return Err(serde::de::Error::custom("timestamp must be finite"));
        }
        Timestamp::from_micros((secs * 1_000_000.0).round() as i64)
            .map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// One validated presentation as reported by the reader process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    #[serde(rename = "cardid")]
    pub card_id: CardId,
    pub owner: String,
    #[serde(rename = "sha")]
    pub signature_suffix: SignatureSuffix,
    pub outcome: bool,
}

impl ScanRecord {
    /// # Errors
    /// Returns `Error::InvalidOwner` if the owner is blank.
    pub fn new(
        card_id: CardId,
        owner: impl Into<String>,
        signature_suffix: SignatureSuffix,
        outcome: bool,
    ) -> Result<Self> {
        let owner = owner.into();
        if owner.trim().is_empty() {
            return Err(Error::InvalidOwner("owner must not be blank".to_string()));
        }
        Ok(Self {
            card_id,
            owner,
            signature_suffix,
            outcome,
        })
    }

    /// The tuple the reader debounces on.
    #[must_use]
    pub fn debounce_key(&self) -> (CardId, &str, bool) {
        (self.card_id, self.owner.as_str(), self.outcome)
    }
}

/// Queue state of a persisted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    New,
    Sent,
}

impl QueueState {
    pub const ALL: [QueueState; 2] = [QueueState::New, QueueState::Sent];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QueueState::New => "new",
            QueueState::Sent => "sent",
        }
    }

    /// Only `new -> sent` is a legal move.
    #[must_use]
    pub fn can_transition_to(self, target: QueueState) -> bool {
        matches!((self, target), (QueueState::New, QueueState::Sent))
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(QueueState::New),
            "sent" => Ok(QueueState::Sent),
            other => Err(Error::InvalidQueueState(other.to_string())),
        }
    }
}

/// Identity annotations stamped onto every captured event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub device_id: String,
    pub location: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self {
            device_id: UNKNOWN_DEVICE.to_string(),
            location: UNKNOWN_LOCATION.to_string(),
        }
    }
}

/// A signed, durable record of one validated presentation.
///
/// Everything except `transferred_timestamp` is covered by `signature` and is
/// immutable once the event has been written to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    #[serde(rename = "cardid")]
    pub card_id: CardId,
    pub owner: String,
    #[serde(rename = "sha")]
    pub signature_suffix: SignatureSuffix,
    pub outcome: bool,
    pub location: String,
    #[serde(rename = "device")]
    pub device_id: String,
    #[serde(rename = "timestamp-device")]
    pub device_timestamp: Timestamp,
    #[serde(
        rename = "timestamp-transferred",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transferred_timestamp: Option<Timestamp>,
    pub signature: String,
}

impl Event {
    /// Build and sign an event for `record`.
    pub fn capture(
        record: &ScanRecord,
        context: &EventContext,
        event_id: Uuid,
        captured_at: Timestamp,
    ) -> Self {
        let mut event = Self {
            event_id,
            card_id: record.card_id,
            owner: record.owner.clone(),
            signature_suffix: record.signature_suffix.clone(),
            outcome: record.outcome,
            location: context.location.clone(),
            device_id: context.device_id.clone(),
            device_timestamp: captured_at,
            transferred_timestamp: None,
            signature: String::new(),
        };
        event.sign();
        event
    }

    /// Recompute and store the signature over the current field values.
    pub fn sign(&mut self) {
        self.signature = self.compute_signature();
    }

    /// The fields covered by the signature, rendered canonically.
    ///
    /// Booleans render as `true`/`false`, ids in their usual text form and
    /// timestamps via [`Timestamp::render`].
    #[must_use]
    pub fn signing_fields(&self) -> SignedFields {
        let mut fields = SignedFields::new();
        fields.insert(FIELD_CARD_ID, self.card_id.to_string());
        fields.insert(FIELD_DEVICE, self.device_id.clone());
        fields.insert(FIELD_EVENT_ID, self.event_id.to_string());
        fields.insert(FIELD_LOCATION, self.location.clone());
        fields.insert(FIELD_OUTCOME, self.outcome.to_string());
        fields.insert(FIELD_OWNER, self.owner.clone());
        fields.insert(FIELD_SIGNATURE_SUFFIX, self.signature_suffix.to_string());
        fields.insert(FIELD_TIMESTAMP_DEVICE, self.device_timestamp.render());
        fields
    }

    #[must_use]
    pub fn compute_signature(&self) -> String {
        compute_signature(&self.signing_fields())
    }

    /// Returns `true` if the stored signature matches the fields.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.signature == self.compute_signature()
    }

    /// Copy of this event stamped with the time it is handed to the collector.
    #[must_use]
    pub fn for_transfer(&self, at: Timestamp) -> Self {
        Self {
            transferred_timestamp: Some(at),
            ..self.clone()
        }
    }

    /// # Errors
    /// Returns `Error::Json` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// # Errors
    /// Returns `Error::Json` if the payload is not a valid event.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Collector address learned from a discovery announcement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectorEndpoint {
    pub host: String,
    pub port: u16,
}

impl CollectorEndpoint {
    /// # Errors
    /// Returns `Error::InvalidEndpoint` if the host is blank or the port is 0.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(Error::InvalidEndpoint("host must not be empty".to_string()));
        }
        if port == 0 {
            return Err(Error::InvalidEndpoint("port must not be 0".to_string()));
        }
        Ok(Self { host, port })
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    /// URL of the collector resource for `event_id`.
    #[must_use]
    pub fn event_url(&self, event_id: &Uuid) -> String {
        format!("{}{}/{}", self.base_url(), EVENT_PATH_PREFIX, event_id)
    }
}

impl fmt::Display for CollectorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for CollectorEndpoint {
    type Err = Error;

    /// Parse `host:port`. IPv6 hosts may be written in brackets.
    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidEndpoint(format!("missing port in {s:?}")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidEndpoint(format!("invalid port in {s:?}")))?;
        CollectorEndpoint::new(host, port)
    }
}

/// Network address and location of this node, owned by the identity source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub address: Option<IpAddr>,
    pub location: String,
}

impl NetworkIdentity {
    pub fn new(address: Option<IpAddr>, location: impl Into<String>) -> Self {
        Self {
            address,
            location: location.into(),
        }
    }

    #[must_use]
    pub fn has_address(&self) -> bool {
        self.address.is_some()
    }

    /// Address for display, or `...` while offline.
    #[must_use]
    pub fn address_label(&self) -> String {
        self.address
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
    }
}

impl Default for NetworkIdentity {
    fn default() -> Self {
        Self::new(None, UNKNOWN_LOCATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn alice() -> ScanRecord {
        ScanRecord::new(
            CardId::new(123),
            "alice",
            SignatureSuffix::new("a1b2c3").unwrap(),
            true,
        )
        .unwrap()
    }

    fn captured() -> Event {
        let context = EventContext {
            device_id: "door-1".to_string(),
            location: "lobby".to_string(),
        };
        Event::capture(
            &alice(),
            &context,
            Uuid::nil(),
            Timestamp::from_micros(1_700_000_000_250_000).unwrap(),
        )
    }

    #[test]
    fn test_card_id_from_uid() {
        let id = CardId::from_uid(&[0x01, 0x02, 0x03, 0x04, 0x05, 0xFF]).unwrap();
        assert_eq!(id.as_u64(), 0x01_0203_0405);
        assert!(CardId::from_uid(&[0x01, 0x02]).is_err());
    }

    #[rstest]
    #[case("a1b2c3")]
    #[case("ABCDEF")]
    #[case("000000")]
    fn test_signature_suffix_valid(#[case] input: &str) {
        assert_eq!(SignatureSuffix::new(input).unwrap().as_str(), input);
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("a1b2c3d")]
    #[case("zzzzzz")]
    fn test_signature_suffix_invalid(#[case] input: &str) {
        assert!(SignatureSuffix::new(input).is_err());
    }

    #[test]
    fn test_scan_record_wire_names() {
        let json = serde_json::to_value(alice()).unwrap();
        assert_eq!(json["cardid"], 123);
        assert_eq!(json["owner"], "alice");
        assert_eq!(json["sha"], "a1b2c3");
        assert_eq!(json["outcome"], true);
    }

    #[test]
    fn test_scan_record_rejects_blank_owner() {
        let result = ScanRecord::new(
            CardId::new(1),
            "  ",
            SignatureSuffix::new("abcdef").unwrap(),
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_queue_state_transitions() {
        assert!(QueueState::New.can_transition_to(QueueState::Sent));
        assert!(!QueueState::Sent.can_transition_to(QueueState::New));
        assert!(!QueueState::New.can_transition_to(QueueState::New));
        assert_eq!("sent".parse::<QueueState>().unwrap(), QueueState::Sent);
        assert!("done".parse::<QueueState>().is_err());
    }

    #[test]
    fn test_timestamp_render_is_fixed_width() {
        let ts = Timestamp::from_micros(1_700_000_000_000_005).unwrap();
        assert_eq!(ts.render(), "1700000000.000005");
    }

    #[test]
    fn test_timestamp_json_preserves_micros() {
        let ts = Timestamp::from_micros(1_712_345_678_123_456).unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_event_capture_is_signed() {
        let event = captured();
        assert!(event.verify());
        assert_eq!(event.signature.len(), 64);
        assert_eq!(event.transferred_timestamp, None);
    }

    #[test]
    fn test_event_signature_covers_every_field() {
        let base = captured();

        let mut changed = base.clone();
        changed.location = "garage".to_string();
        assert_ne!(changed.compute_signature(), base.signature);

        let mut changed = base.clone();
        changed.device_timestamp = Timestamp::from_micros(1).unwrap();
        assert_ne!(changed.compute_signature(), base.signature);

        let mut changed = base.clone();
        changed.outcome = false;
        assert_ne!(changed.compute_signature(), base.signature);
    }

    #[test]
    fn test_sign_after_edit() {
        let mut event = captured();
        event.location = "garage".to_string();
        assert!(!event.verify());

        event.sign();
        assert!(event.verify());
    }

    #[test]
    fn test_transfer_timestamp_not_signed() {
        let event = captured();
        let outgoing = event.for_transfer(Timestamp::now());
        assert!(outgoing.verify());
        assert!(outgoing.transferred_timestamp.is_some());
    }

    #[test]
    fn test_event_json_roundtrip_keeps_signature_valid() {
        let event = captured();
        let json = event.to_json().unwrap();
        assert!(json.contains("\"timestamp-device\""));
        assert!(!json.contains("timestamp-transferred"));

        let back = Event::from_json(json.as_bytes()).unwrap();
        assert_eq!(back, event);
        assert!(back.verify());
    }

    #[rstest]
    #[case("10.0.0.5:9000", "10.0.0.5", 9000)]
    #[case("collector.local:80", "collector.local", 80)]
    #[case("[::1]:8080", "::1", 8080)]
    fn test_collector_endpoint_parse(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
        let endpoint: CollectorEndpoint = input.parse().unwrap();
        assert_eq!(endpoint.host, host);
        assert_eq!(endpoint.port, port);
    }

    #[rstest]
    #[case("10.0.0.5")]
    #[case(":9000")]
    #[case("host:0")]
    #[case("host:99999")]
    #[case("host:port")]
    fn test_collector_endpoint_invalid(#[case] input: &str) {
        assert!(input.parse::<CollectorEndpoint>().is_err());
    }

    #[test]
    fn test_event_url() {
        let endpoint = CollectorEndpoint::new("10.0.0.5", 9000).unwrap();
        assert_eq!(
            endpoint.event_url(&Uuid::nil()),
            "http://10.0.0.5:9000/event/00000000-0000-0000-0000-000000000000"
        );
        let v6 = CollectorEndpoint::new("::1", 9000).unwrap();
        assert_eq!(v6.base_url(), "http://[::1]:9000");
    }

    #[test]
    fn test_network_identity_address_label() {
        let offline = NetworkIdentity::default();
        assert_eq!(offline.address_label(), "...");
        assert!(!offline.has_address());

        let online = NetworkIdentity::new(Some("192.168.1.20".parse().unwrap()), "lobby");
        assert_eq!(online.address_label(), "192.168.1.20");
    }
}
