//! Reader output to queued events.
//!
//! The ingestor owns the framing state, so a record split across two reads
//! is assembled before parsing. Each complete frame is handled on its own: a
//! bad frame is logged and dropped without affecting the rest of the batch.

use tagpost_core::{Event, EventContext, QueueState, Timestamp, constants::NO_READ_LABEL};
use tagpost_protocol::{LineFramer, ReaderLine};
use tagpost_storage::{EventQueue, StorageResult};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::display::ScanKind;

/// What one batch of reader output produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Ids of events stored in `new`, in arrival order.
    pub enqueued: Vec<Uuid>,
    /// Records with `outcome = false`.
    pub rejected: usize,
    /// `E` lines from the reader.
    pub no_reads: usize,
    /// Frames that could not be parsed or were diagnostics.
    pub discarded: usize,
    /// Label and kind of the last presentation in the batch.
    pub last_scan: Option<(String, ScanKind)>,
}

impl IngestReport {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug)]
pub struct ScanIngestor {
    framer: LineFramer,
    context: EventContext,
}

impl ScanIngestor {
    pub fn new(context: EventContext) -> Self {
        Self {
            framer: LineFramer::new(),
            context,
        }
    }

    pub fn context(&self) -> &EventContext {
        &self.context
    }

    /// Location stamped on events captured from now on.
    pub fn set_location(&mut self, location: impl Into<String>) {
        self.context.location = location.into();
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending_bytes(&self) -> usize {
        self.framer.pending_len()
    }

    /// Feed a chunk of reader output and process every complete line.
    ///
    /// # Errors
    /// Returns the first queue error; frames after it stay buffered.
    pub fn ingest<Q: EventQueue>(&mut self, bytes: &[u8], queue: &mut Q) -> StorageResult<IngestReport> {
        self.framer.feed(bytes);
        let mut report = IngestReport::default();
        while let Some(frame) = self.framer.next_frame() {
            self.handle_frame(&frame, queue, &mut report)?;
        }
        Ok(report)
    }

    /// Process a trailing fragment left when the reader closed its output.
    ///
    /// # Errors
    /// Returns the queue error if storing fails.
    pub fn finish<Q: EventQueue>(&mut self, queue: &mut Q) -> StorageResult<IngestReport> {
        let mut report = IngestReport::default();
        if let Some(frame) = self.framer.finish() {
            self.handle_frame(&frame, queue, &mut report)?;
        }
        Ok(report)
    }

    fn handle_frame<Q: EventQueue>(
        &self,
        frame: &str,
        queue: &mut Q,
        report: &mut IngestReport,
    ) -> StorageResult<()> {
        match ReaderLine::parse(frame) {
            Ok(ReaderLine::Blank) => {}
            Ok(ReaderLine::ReaderError(message)) => {
                debug!(message = %message, "Reader reported no-read");
                report.no_reads += 1;
                report.last_scan = Some((NO_READ_LABEL.to_string(), ScanKind::NoRead));
            }
            Ok(ReaderLine::Diagnostic(diagnostic)) => {
                debug!(log = %diagnostic.log, when = %diagnostic.when, "Reader diagnostic");
                report.discarded += 1;
            }
            Ok(ReaderLine::Record(record)) if !record.outcome => {
                info!(card_id = %record.card_id, owner = %record.owner, "Rejected card");
                report.rejected += 1;
                report.last_scan = Some((record.owner, ScanKind::Rejected));
            }
            Ok(ReaderLine::Record(record)) => {
                let event = Event::capture(&record, &self.context, Uuid::new_v4(), Timestamp::now());
                queue.store(QueueState::New, &event)?;
                info!(
                    event_id = %event.event_id,
                    card_id = %record.card_id,
                    owner = %record.owner,
                    "Queued scan"
                );
                report.enqueued.push(event.event_id);
                report.last_scan = Some((record.owner, ScanKind::Accepted));
            }
            Err(e) => {
                warn!(raw = %frame, error = %e, "Discarding reader frame");
                report.discarded += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tagpost_storage::MemoryQueue;

    const ALICE: &str = r#"{"cardid": 123, "owner": "alice", "sha": "a1b2c3", "outcome": true}"#;
    const BOB_REJECTED: &str = r#"{"cardid": 7, "owner": "bob", "sha": "000000", "outcome": false}"#;

    fn ingestor() -> ScanIngestor {
        ScanIngestor::new(EventContext {
            device_id: "door-1".to_string(),
            location: "lobby".to_string(),
        })
    }

    #[test]
    fn test_accepted_record_is_queued_and_signed() {
        let mut queue = MemoryQueue::new();
        let report = ingestor()
            .ingest(format!("{ALICE}\n").as_bytes(), &mut queue)
            .unwrap();

        assert_eq!(report.enqueued.len(), 1);
        assert_eq!(report.last_scan, Some(("alice".to_string(), ScanKind::Accepted)));

        let event = queue.read(QueueState::New, &report.enqueued[0]).unwrap();
        assert!(event.verify());
        assert_eq!(event.card_id.as_u64(), 123);
        assert_eq!(event.location, "lobby");
        assert_eq!(event.device_id, "door-1");
        assert!(event.transferred_timestamp.is_none());
    }

    #[test]
    fn test_rejected_record_is_display_only() {
        let mut queue = MemoryQueue::new();
        let report = ingestor()
            .ingest(format!("{BOB_REJECTED}\n").as_bytes(), &mut queue)
            .unwrap();

        assert!(report.enqueued.is_empty());
        assert_eq!(report.rejected, 1);
        assert_eq!(report.last_scan, Some(("bob".to_string(), ScanKind::Rejected)));
        assert_eq!(queue.count(QueueState::New).unwrap(), 0);
    }

    #[test]
    fn test_error_line_is_no_read() {
        let mut queue = MemoryQueue::new();
        let report = ingestor().ingest(b"E collision\n", &mut queue).unwrap();

        assert_eq!(report.no_reads, 1);
        assert_eq!(report.last_scan, Some(("???".to_string(), ScanKind::NoRead)));
        assert_eq!(queue.count(QueueState::New).unwrap(), 0);
    }

    #[test]
    fn test_split_record_waits_for_terminator() {
        let mut queue = MemoryQueue::new();
        let mut ingestor = ingestor();
        let (head, tail) = ALICE.split_at(20);

        let first = ingestor.ingest(head.as_bytes(), &mut queue).unwrap();
        assert!(first.is_empty());
        assert_eq!(ingestor.pending_bytes(), 20);

        let second = ingestor
            .ingest(format!("{tail}\n").as_bytes(), &mut queue)
            .unwrap();
        assert_eq!(second.enqueued.len(), 1);
        assert_eq!(ingestor.pending_bytes(), 0);
    }

    #[rstest]
    #[case::missing_field(r#"{"owner": "bob"}"#)]
    #[case::not_json("hello there")]
    #[case::bad_suffix(r#"{"cardid": 1, "owner": "x", "sha": "zz", "outcome": true}"#)]
    #[case::diagnostic(r#"{"log": "Detected card", "outcome": false, "when": "now"}"#)]
    fn test_bad_frame_does_not_stop_batch(#[case] bad: &str) {
        let mut queue = MemoryQueue::new();
        let batch = format!("{ALICE}\n{bad}\n{ALICE}\n");
        let report = ingestor().ingest(batch.as_bytes(), &mut queue).unwrap();

        assert_eq!(report.enqueued.len(), 2);
        assert_eq!(report.discarded, 1);
        assert_eq!(queue.count(QueueState::New).unwrap(), 2);
    }

    #[test]
    fn test_last_scan_is_latest_in_batch() {
        let mut queue = MemoryQueue::new();
        let batch = format!("{ALICE}\nE timeout\n{BOB_REJECTED}\n");
        let report = ingestor().ingest(batch.as_bytes(), &mut queue).unwrap();
        assert_eq!(report.last_scan, Some(("bob".to_string(), ScanKind::Rejected)));
    }

    #[test]
    fn test_location_change_applies_to_new_events() {
        let mut queue = MemoryQueue::new();
        let mut ingestor = ingestor();
        ingestor.set_location("garage");

        let report = ingestor
            .ingest(format!("{ALICE}\n").as_bytes(), &mut queue)
            .unwrap();
        let event = queue.read(QueueState::New, &report.enqueued[0]).unwrap();
        assert_eq!(event.location, "garage");
    }

    #[test]
    fn test_finish_processes_unterminated_record() {
        let mut queue = MemoryQueue::new();
        let mut ingestor = ingestor();
        ingestor.ingest(ALICE.as_bytes(), &mut queue).unwrap();

        let report = ingestor.finish(&mut queue).unwrap();
        assert_eq!(report.enqueued.len(), 1);
    }
}
