//! The reader process: tag source in, line protocol out.
//!
//! Every presentation is turned into at most one output line:
//!
//! - a read failure becomes `E <message>`
//! - a card with a UID shorter than five bytes, a malformed suffix or a blank
//!   owner becomes `E <reason>`
//! - a blank or unparseable card produces nothing (a diagnostic in debug mode)
//! - a readable card becomes a JSON record with `outcome` set by the
//!   pre-shared-key check, subject to the linger window
//!
//! The process ends with `Ok` when the source is exhausted and with `Err` on
//! any fatal error; the node treats either as reader exit.

use std::time::Duration;

use futures::SinkExt;
use tagpost_core::{CardId, ScanRecord, SignatureSuffix};
use tagpost_protocol::{Diagnostic, ReaderCodec, ReaderLine};
use tokio::io::AsyncWrite;
use tokio::time::Instant;
use tokio_util::codec::FramedWrite;
use tracing::{debug, info, warn};

use crate::validation::{CardText, validate_card};
use crate::{Debouncer, ReaderError, Result, TagRead, TagSource};

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub pre_shared_key: String,
    pub linger: Duration,
    /// Emit diagnostic records for every step.
    pub debug: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            pre_shared_key: String::new(),
            linger: Duration::from_secs(tagpost_core::constants::DEFAULT_LINGER_SECS),
            debug: false,
        }
    }
}

/// Counters reported when the process ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub reads: u64,
    pub records: u64,
    pub suppressed: u64,
    pub errors: u64,
}

pub struct ReaderProcess<S, W> {
    source: S,
    sink: FramedWrite<W, ReaderCodec>,
    debouncer: Debouncer,
    config: ReaderConfig,
    stats: ReaderStats,
}

impl<S, W> ReaderProcess<S, W>
where
    S: TagSource,
    W: AsyncWrite + Unpin,
{
    pub fn new(source: S, output: W, config: ReaderConfig) -> Self {
        Self {
            source,
            sink: FramedWrite::new(output, ReaderCodec::new()),
            debouncer: Debouncer::new(config.linger),
            config,
            stats: ReaderStats::default(),
        }
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Read, validate and emit until the source ends.
    ///
    /// # Errors
    /// Returns the first fatal error from the source or the output stream.
    pub async fn run(mut self) -> Result<ReaderStats> {
        info!(source = %self.source.name(), linger = ?self.config.linger, "Reader started");

        loop {
            let lines = match self.source.read_tag().await {
                Ok(Some(tag)) => {
                    self.stats.reads += 1;
                    self.process(&tag, Instant::now())
                }
                Ok(None) => break,
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "Reader stopping");
                    return Err(e);
                }
                Err(e) => {
                    self.stats.errors += 1;
                    debug!(error = %e, "Read failed");
                    vec![ReaderLine::ReaderError(e.report())]
                }
            };

            for line in lines {
                self.sink.send(line).await?;
            }
        }

        info!(stats = ?self.stats, "Tag source exhausted");
        Ok(self.stats)
    }

    /// Lines to emit for one presentation at `now`.
    pub fn process(&mut self, tag: &TagRead, now: Instant) -> Vec<ReaderLine> {
        let mut lines = Vec::new();
        self.log(&mut lines, format!("Detected card {}", tag.uid_hex()));

        match self.classify(tag, &mut lines) {
            Ok(Some(record)) => {
                if self.debouncer.observe(&record, now) {
                    self.stats.records += 1;
                    lines.push(ReaderLine::Record(record));
                } else {
                    self.stats.suppressed += 1;
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.stats.errors += 1;
                lines.push(ReaderLine::ReaderError(e.report()));
            }
        }
        lines
    }

    fn classify(
        &self,
        tag: &TagRead,
        lines: &mut Vec<ReaderLine>,
    ) -> Result<Option<ScanRecord>> {
        let card_id = CardId::from_uid(&tag.uid)
            .map_err(|e| ReaderError::invalid_data(e.to_string()))?;

        let card = match CardText::parse(&tag.text) {
            Ok(Some(card)) => card,
            Ok(None) => {
                self.log(lines, "No data read".to_string());
                return Ok(None);
            }
            Err(e) => {
                self.log(lines, format!("Exception: {e}"));
                return Ok(None);
            }
        };

        let suffix = SignatureSuffix::new(&card.suffix)
            .map_err(|e| ReaderError::invalid_data(e.to_string()))?;
        let outcome = validate_card(&card.owner, card_id, &suffix, &self.config.pre_shared_key);
        if !outcome {
            debug!(card_id = %card_id, owner = %card.owner, "Card failed validation");
        }

        let record = ScanRecord::new(card_id, card.owner, suffix, outcome)
            .map_err(|e| ReaderError::invalid_data(e.to_string()))?;
        Ok(Some(record))
    }

    fn log(&self, lines: &mut Vec<ReaderLine>, message: String) {
        if self.config.debug {
            let when = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string();
            lines.push(ReaderLine::Diagnostic(Diagnostic::new(message, when)));
        }
    }
}
