//! Classification and parsing of reader output lines.
//!
//! Each frame from the reader is one of:
//!
//! | Shape | Meaning |
//! |-------|---------|
//! | empty | nothing, ignored |
//! | starts with `E` | reader-side error, shown as a no-read |
//! | JSON with a `log` key | diagnostic emitted in `--debug` mode |
//! | JSON with `cardid`, `owner`, `sha`, `outcome` | a [`ScanRecord`] |
//!
//! Anything else is rejected with an error carrying enough detail to log the
//! raw frame. Unknown extra keys in a record are ignored.
//!
//! # Example
//!
//! ```
//! use tagpost_protocol::ReaderLine;
//!
//! let line = ReaderLine::parse(r#"{"cardid": 123, "owner": "alice", "sha": "a1b2c3", "outcome": true}"#).unwrap();
//! match line {
//!     ReaderLine::Record(record) => assert_eq!(record.owner, "alice"),
//!     other => panic!("unexpected {other:?}"),
//! }
//!
//! assert!(matches!(ReaderLine::parse("E collision").unwrap(), ReaderLine::ReaderError(_)));
//! assert!(ReaderLine::parse("{\"owner\": \"bob\"}").is_err());
//! ```

use serde::{Deserialize, Serialize};
use tagpost_core::{
    CardId, Error, Result, ScanRecord, SignatureSuffix,
    constants::{
        FIELD_CARD_ID, FIELD_OUTCOME, FIELD_OWNER, FIELD_SIGNATURE_SUFFIX, READER_ERROR_SENTINEL,
    },
};

/// One classified frame of reader output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderLine {
    /// Empty line.
    Blank,

    /// Reader-side error report; the text after the sentinel.
    ReaderError(String),

    /// Debug output from the reader.
    Diagnostic(Diagnostic),

    /// A validated presentation.
    Record(ScanRecord),
}

/// Diagnostic record written by the reader in debug mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub log: String,
    pub outcome: bool,
    pub when: String,
}

impl Diagnostic {
    pub fn new(log: impl Into<String>, when: impl Into<String>) -> Self {
        Self {
            log: log.into(),
            outcome: false,
            when: when.into(),
        }
    }
}

/// Wire shape of a record before validation; every field may be missing.
#[derive(Debug, Deserialize)]
struct RawRecord {
    cardid: Option<u64>,
    owner: Option<String>,
    sha: Option<String>,
    outcome: Option<bool>,
    log: Option<String>,
    when: Option<String>,
}

impl ReaderLine {
    /// Classify and validate one frame.
    ///
    /// # Errors
    /// - `Error::Json` if a non-sentinel line is not a JSON object
    /// - `Error::MissingField` if a record lacks a required field
    /// - `Error::InvalidSignatureSuffix` / `Error::InvalidOwner` on bad values
    pub fn parse(frame: &str) -> Result<Self> {
        if frame.trim().is_empty() {
            return Ok(ReaderLine::Blank);
        }
        if let Some(rest) = frame.strip_prefix(READER_ERROR_SENTINEL) {
            return Ok(ReaderLine::ReaderError(rest.trim().to_string()));
        }

        let raw: RawRecord = serde_json::from_str(frame)?;

        if let Some(log) = raw.log {
            return Ok(ReaderLine::Diagnostic(Diagnostic {
                log,
                outcome: raw.outcome.unwrap_or(false),
                when: raw.when.unwrap_or_default(),
            }));
        }

        let card_id = raw
            .cardid
            .ok_or_else(|| Error::MissingField(FIELD_CARD_ID.to_string()))?;
        let owner = raw
            .owner
            .ok_or_else(|| Error::MissingField(FIELD_OWNER.to_string()))?;
        let suffix = raw
            .sha
            .ok_or_else(|| Error::MissingField(FIELD_SIGNATURE_SUFFIX.to_string()))?;
        let outcome = raw
            .outcome
            .ok_or_else(|| Error::MissingField(FIELD_OUTCOME.to_string()))?;

        let record = ScanRecord::new(
            CardId::new(card_id),
            owner,
            SignatureSuffix::new(&suffix)?,
            outcome,
        )?;
        Ok(ReaderLine::Record(record))
    }

    /// Render as a single line, without terminator.
    ///
    /// # Errors
    /// Returns `Error::Json` if serialization fails.
    pub fn encode(&self) -> Result<String> {
        match self {
            ReaderLine::Blank => Ok(String::new()),
            ReaderLine::ReaderError(message) => Ok(format!("{READER_ERROR_SENTINEL} {message}")),
            ReaderLine::Diagnostic(diagnostic) => Ok(serde_json::to_string(diagnostic)?),
            ReaderLine::Record(record) => Ok(serde_json::to_string(record)?),
        }
    }
}
