//! Crash-safe event queue keyed by (state, event id).
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── new/<event-id>.json     captured, waiting for delivery
//! ├── sent/<event-id>.json    acknowledged by a collector
//! ├── corrupt/<event-id>.json records that could not be decoded
//! └── tmp/                    staging area for atomic writes
//! ```
//!
//! # Crash Safety
//!
//! - `store` writes the record into `tmp/`, fsyncs it, renames it into the
//!   state directory and fsyncs that directory. A crash leaves either no record
//!   or a complete one; a stale staging file is removed by [`FileQueue::open`].
//! - `transition` is a single `rename(2)` between sibling directories of the
//!   same filesystem. Before the rename the record is in `from`, after it the
//!   record is in `to`; there is no point at which it is in both or neither.
//! - On open, an id found in both `new` and `sent` (only possible if a copy was
//!   restored by hand) resolves to `sent`, since transitions never go back.
//! - A record that exists but cannot be decoded is moved aside into
//!   `corrupt/` by [`EventQueue::quarantine`] so it no longer holds up the
//!   rest of the queue. It is kept for inspection, never deleted.
//!
//! The queue assumes a single writer. Multiple processes sharing one root
//! would additionally need an advisory lock around `transition`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tagpost_core::{Event, QueueState};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

const RECORD_EXTENSION: &str = "json";
const STAGING_DIR: &str = "tmp";
const QUARANTINE_DIR: &str = "corrupt";

/// Outcome of a [`EventQueue::transition`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The record moved from one state to the other.
    Applied,
    /// The record was already in the target state; nothing changed.
    AlreadyApplied,
}

/// Durable store of events, one record per (state, id).
///
/// Implementations are used from a single thread and make no ordering
/// promise for [`list`](EventQueue::list).
pub trait EventQueue {
    /// Persist `event` in `state`, keyed by its event id.
    fn store(&mut self, state: QueueState, event: &Event) -> StorageResult<()>;

    /// Ids currently in `state`.
    fn list(&self, state: QueueState) -> StorageResult<Vec<Uuid>>;

    /// Read the event `id` from `state`.
    fn read(&self, state: QueueState, id: &Uuid) -> StorageResult<Event>;

    /// Move `id` from `from` to `to`.
    ///
    /// Re-applying a completed transition is a no-op that returns
    /// [`TransitionOutcome::AlreadyApplied`].
    fn transition(
        &mut self,
        from: QueueState,
        to: QueueState,
        id: &Uuid,
    ) -> StorageResult<TransitionOutcome>;

    /// Move the undecodable record `id` out of `state`.
    ///
    /// Afterwards the id is no longer listed in any state.
    fn quarantine(&mut self, state: QueueState, id: &Uuid) -> StorageResult<()>;

    /// Exact number of events in `state`.
    fn count(&self, state: QueueState) -> StorageResult<usize> {
        Ok(self.list(state)?.len())
    }

    /// Any one event id in `state`.
    fn next(&self, state: QueueState) -> StorageResult<Option<Uuid>> {
        Ok(self.list(state)?.into_iter().next())
    }
}

/// Filesystem-backed [`EventQueue`].
#[derive(Debug, Clone)]
pub struct FileQueue {
    root: PathBuf,
}

impl FileQueue {
    /// Open (creating if needed) a queue rooted at `root` and recover it.
    ///
    /// # Errors
    /// Returns `StorageError::Io` if the directories cannot be created or
    /// scanned.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        for dir in QueueState::ALL
            .iter()
            .map(|state| root.join(state.as_str()))
            .chain([root.join(STAGING_DIR), root.join(QUARANTINE_DIR)])
        {
            fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        }

        let queue = Self { root };
        queue.recover()?;
        info!(
            root = %queue.root.display(),
            pending = queue.count(QueueState::New)?,
            "Event queue opened"
        );
        Ok(queue)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw bytes of a stored record.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the record does not exist.
    pub fn read_raw(&self, state: QueueState, id: &Uuid) -> StorageResult<Vec<u8>> {
        let path = self.record_path(state, id);
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound { state, id: *id },
            _ => StorageError::io(&path, e),
        })
    }

    /// Remove stale staging files and resolve ids present in both states.
    ///
    /// # Errors
    /// Returns `StorageError::Io` if a directory cannot be read or a file
    /// cannot be removed.
    pub fn recover(&self) -> StorageResult<()> {
        let staging = self.root.join(STAGING_DIR);
        let entries = fs::read_dir(&staging).map_err(|e| StorageError::io(&staging, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&staging, e))?;
            let path = entry.path();
            warn!(path = %path.display(), "Removing interrupted write");
            fs::remove_file(&path).map_err(|e| StorageError::io(&path, e))?;
        }

        let sent = self.list(QueueState::Sent)?;
        for id in self.list(QueueState::New)? {
            if sent.contains(&id) {
                let path = self.record_path(QueueState::New, &id);
                warn!(event_id = %id, "Event present in new and sent, keeping sent");
                fs::remove_file(&path).map_err(|e| StorageError::io(&path, e))?;
            }
        }
        sync_dir(&self.state_dir(QueueState::New))?;
        Ok(())
    }

    fn state_dir(&self, state: QueueState) -> PathBuf {
        self.root.join(state.as_str())
    }

    fn record_path(&self, state: QueueState, id: &Uuid) -> PathBuf {
        self.state_dir(state)
            .join(format!("{}.{RECORD_EXTENSION}", id.hyphenated()))
    }

    fn exists_anywhere(&self, id: &Uuid) -> Option<QueueState> {
        QueueState::ALL
            .into_iter()
            .find(|state| self.record_path(*state, id).exists())
    }
}

impl EventQueue for FileQueue {
    fn store(&mut self, state: QueueState, event: &Event) -> StorageResult<()> {
        let id = event.event_id;
        if let Some(existing) = self.exists_anywhere(&id) {
            return Err(StorageError::AlreadyExists {
                state: existing,
                id,
            });
        }

        let payload = serde_json::to_vec(event)?;
        let staged = self
            .root
            .join(STAGING_DIR)
            .join(format!("{}.{RECORD_EXTENSION}", id.hyphenated()));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged)
            .map_err(|e| StorageError::io(&staged, e))?;
        file.write_all(&payload)
            .and_then(|()| file.sync_all())
            .map_err(|e| StorageError::io(&staged, e))?;
        drop(file);

        let target = self.record_path(state, &id);
        fs::rename(&staged, &target).map_err(|e| StorageError::io(&target, e))?;
        sync_dir(&self.state_dir(state))?;

        debug!(event_id = %id, state = %state, bytes = payload.len(), "Stored event");
        Ok(())
    }

    fn list(&self, state: QueueState) -> StorageResult<Vec<Uuid>> {
        let dir = self.state_dir(state);
        let entries = fs::read_dir(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok())
            {
                Some(id) => ids.push(id),
                None => warn!(path = %path.display(), "Ignoring foreign file in queue"),
            }
        }
        Ok(ids)
    }

    fn read(&self, state: QueueState, id: &Uuid) -> StorageResult<Event> {
        let raw = self.read_raw(state, id)?;
        Event::from_json(&raw).map_err(|e| StorageError::Corrupt {
            path: self.record_path(state, id),
            reason: e.to_string(),
        })
    }

    fn transition(
        &mut self,
        from: QueueState,
        to: QueueState,
        id: &Uuid,
    ) -> StorageResult<TransitionOutcome> {
        if !from.can_transition_to(to) {
            return Err(StorageError::InvalidTransition { from, to });
        }

        let source = self.record_path(from, id);
        let target = self.record_path(to, id);

        match fs::rename(&source, &target) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if target.exists() {
                    debug!(event_id = %id, from = %from, to = %to, "Transition already applied");
                    return Ok(TransitionOutcome::AlreadyApplied);
                }
                return Err(StorageError::NotFound { state: from, id: *id });
            }
            Err(e) => return Err(StorageError::io(&target, e)),
        }

        sync_dir(&self.state_dir(to))?;
        sync_dir(&self.state_dir(from))?;

        debug!(event_id = %id, from = %from, to = %to, "Transitioned event");
        Ok(TransitionOutcome::Applied)
    }

    fn quarantine(&mut self, state: QueueState, id: &Uuid) -> StorageResult<()> {
        let source = self.record_path(state, id);
        let dir = self.root.join(QUARANTINE_DIR);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        let target = dir.join(format!("{}.{RECORD_EXTENSION}", id.hyphenated()));

        fs::rename(&source, &target).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound { state, id: *id },
            _ => StorageError::io(&target, e),
        })?;
        sync_dir(&dir)?;
        sync_dir(&self.state_dir(state))?;

        warn!(event_id = %id, state = %state, path = %target.display(), "Quarantined record");
        Ok(())
    }
}

/// Flush directory metadata so a completed rename survives power loss.
fn sync_dir(dir: &Path) -> StorageResult<()> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| StorageError::io(dir, e))
}

/// In-memory [`EventQueue`] for tests and dry runs.
///
/// Records are kept serialized so reads behave like the file queue.
#[derive(Debug, Default, Clone)]
pub struct MemoryQueue {
    records: HashMap<(QueueState, Uuid), Vec<u8>>,
    quarantined: HashMap<Uuid, Vec<u8>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place raw bytes under `id`, bypassing encoding.
    pub fn insert_raw(&mut self, state: QueueState, id: Uuid, raw: impl Into<Vec<u8>>) {
        self.records.insert((state, id), raw.into());
    }

    /// Ids moved aside by [`EventQueue::quarantine`].
    pub fn quarantined(&self) -> Vec<Uuid> {
        self.quarantined.keys().copied().collect()
    }
}

impl EventQueue for MemoryQueue {
    fn store(&mut self, state: QueueState, event: &Event) -> StorageResult<()> {
        let id = event.event_id;
        if let Some(existing) = QueueState::ALL
            .into_iter()
            .find(|s| self.records.contains_key(&(*s, id)))
        {
            return Err(StorageError::AlreadyExists {
                state: existing,
                id,
            });
        }
        self.records
            .insert((state, id), serde_json::to_vec(event)?);
        Ok(())
    }

    fn list(&self, state: QueueState) -> StorageResult<Vec<Uuid>> {
        Ok(self
            .records
            .keys()
            .filter(|(s, _)| *s == state)
            .map(|(_, id)| *id)
            .collect())
    }

    fn read(&self, state: QueueState, id: &Uuid) -> StorageResult<Event> {
        let raw = self
            .records
            .get(&(state, *id))
            .ok_or(StorageError::NotFound { state, id: *id })?;
        Event::from_json(raw).map_err(|e| StorageError::Corrupt {
            path: PathBuf::from(format!("memory:{state}/{id}")),
            reason: e.to_string(),
        })
    }

    fn transition(
        &mut self,
        from: QueueState,
        to: QueueState,
        id: &Uuid,
    ) -> StorageResult<TransitionOutcome> {
        if !from.can_transition_to(to) {
            return Err(StorageError::InvalidTransition { from, to });
        }
        match self.records.remove(&(from, *id)) {
            Some(raw) => {
                self.records.insert((to, *id), raw);
                Ok(TransitionOutcome::Applied)
            }
            None if self.records.contains_key(&(to, *id)) => Ok(TransitionOutcome::AlreadyApplied),
            None => Err(StorageError::NotFound { state: from, id: *id }),
        }
    }

    fn quarantine(&mut self, state: QueueState, id: &Uuid) -> StorageResult<()> {
        let raw = self
            .records
            .remove(&(state, *id))
            .ok_or(StorageError::NotFound { state, id: *id })?;
        self.quarantined.insert(*id, raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagpost_core::{CardId, EventContext, ScanRecord, SignatureSuffix, Timestamp};
    use tempfile::TempDir;

    fn event(owner: &str) -> Event {
        let record = ScanRecord::new(
            CardId::new(123),
            owner,
            SignatureSuffix::new("a1b2c3").unwrap(),
            true,
        )
        .unwrap();
        Event::capture(
            &record,
            &EventContext::default(),
            Uuid::new_v4(),
            Timestamp::now(),
        )
    }

    fn open() -> (TempDir, FileQueue) {
        let dir = TempDir::new().unwrap();
        let queue = FileQueue::open(dir.path().join("queue")).unwrap();
        (dir, queue)
    }

    #[test]
    fn test_open_creates_layout() {
        let (_dir, queue) = open();
        assert!(queue.root().join("new").is_dir());
        assert!(queue.root().join("sent").is_dir());
        assert!(queue.root().join("tmp").is_dir());
        assert!(queue.root().join("corrupt").is_dir());
    }

    #[test]
    fn test_store_and_read() {
        let (_dir, mut queue) = open();
        let event = event("alice");

        queue.store(QueueState::New, &event).unwrap();

        assert_eq!(queue.read(QueueState::New, &event.event_id).unwrap(), event);
        assert_eq!(queue.list(QueueState::New).unwrap(), vec![event.event_id]);
        assert_eq!(queue.count(QueueState::New).unwrap(), 1);
        assert_eq!(queue.count(QueueState::Sent).unwrap(), 0);
    }

    #[test]
    fn test_store_leaves_no_staging_files() {
        let (_dir, mut queue) = open();
        queue.store(QueueState::New, &event("alice")).unwrap();
        assert_eq!(fs::read_dir(queue.root().join("tmp")).unwrap().count(), 0);
    }

    #[test]
    fn test_store_duplicate_rejected() {
        let (_dir, mut queue) = open();
        let event = event("alice");
        queue.store(QueueState::New, &event).unwrap();

        assert!(matches!(
            queue.store(QueueState::New, &event),
            Err(StorageError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (_dir, queue) = open();
        assert!(matches!(
            queue.read(QueueState::New, &Uuid::new_v4()),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_transition_moves_record() {
        let (_dir, mut queue) = open();
        let event = event("alice");
        queue.store(QueueState::New, &event).unwrap();
        let before = queue.read_raw(QueueState::New, &event.event_id).unwrap();

        let outcome = queue
            .transition(QueueState::New, QueueState::Sent, &event.event_id)
            .unwrap();

        assert_eq!(outcome, TransitionOutcome::Applied);
        assert!(matches!(
            queue.read(QueueState::New, &event.event_id),
            Err(StorageError::NotFound { .. })
        ));
        assert_eq!(
            queue.read_raw(QueueState::Sent, &event.event_id).unwrap(),
            before
        );
    }

    #[test]
    fn test_transition_is_idempotent() {
        let (_dir, mut queue) = open();
        let event = event("alice");
        queue.store(QueueState::New, &event).unwrap();

        queue
            .transition(QueueState::New, QueueState::Sent, &event.event_id)
            .unwrap();
        let again = queue
            .transition(QueueState::New, QueueState::Sent, &event.event_id)
            .unwrap();

        assert_eq!(again, TransitionOutcome::AlreadyApplied);
        assert_eq!(queue.count(QueueState::Sent).unwrap(), 1);
    }

    #[test]
    fn test_transition_backwards_rejected() {
        let (_dir, mut queue) = open();
        let event = event("alice");
        queue.store(QueueState::Sent, &event).unwrap();

        assert!(matches!(
            queue.transition(QueueState::Sent, QueueState::New, &event.event_id),
            Err(StorageError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_transition_unknown_id() {
        let (_dir, mut queue) = open();
        assert!(matches!(
            queue.transition(QueueState::New, QueueState::Sent, &Uuid::new_v4()),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let (_dir, queue) = open();
        fs::write(queue.root().join("new").join("README"), b"x").unwrap();
        fs::write(queue.root().join("new").join("garbage.json"), b"x").unwrap();
        assert!(queue.list(QueueState::New).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_record() {
        let (_dir, queue) = open();
        let id = Uuid::new_v4();
        fs::write(
            queue.root().join("new").join(format!("{id}.json")),
            b"{not json",
        )
        .unwrap();
        assert!(matches!(
            queue.read(QueueState::New, &id),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_quarantine_moves_record_aside() {
        let (_dir, mut queue) = open();
        let id = Uuid::new_v4();
        let path = queue.root().join("new").join(format!("{id}.json"));
        fs::write(&path, b"{trunc").unwrap();

        queue.quarantine(QueueState::New, &id).unwrap();

        assert!(queue.list(QueueState::New).unwrap().is_empty());
        assert!(!path.exists());
        assert_eq!(
            fs::read(queue.root().join("corrupt").join(format!("{id}.json"))).unwrap(),
            b"{trunc"
        );
    }

    #[test]
    fn test_quarantine_missing_record() {
        let (_dir, mut queue) = open();
        assert!(matches!(
            queue.quarantine(QueueState::New, &Uuid::new_v4()),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_memory_queue_quarantine() {
        let mut queue = MemoryQueue::new();
        let id = Uuid::new_v4();
        queue.insert_raw(QueueState::New, id, "{trunc");

        assert!(queue.read(QueueState::New, &id).unwrap_err().is_corrupt());
        queue.quarantine(QueueState::New, &id).unwrap();

        assert_eq!(queue.count(QueueState::New).unwrap(), 0);
        assert_eq!(queue.quarantined(), vec![id]);
    }

    #[test]
    fn test_memory_queue_matches_file_queue_semantics() {
        let mut queue = MemoryQueue::new();
        let event = event("bob");
        queue.store(QueueState::New, &event).unwrap();
        assert_eq!(queue.next(QueueState::New).unwrap(), Some(event.event_id));

        assert_eq!(
            queue
                .transition(QueueState::New, QueueState::Sent, &event.event_id)
                .unwrap(),
            TransitionOutcome::Applied
        );
        assert_eq!(
            queue
                .transition(QueueState::New, QueueState::Sent, &event.event_id)
                .unwrap(),
            TransitionOutcome::AlreadyApplied
        );
        assert_eq!(queue.read(QueueState::Sent, &event.event_id).unwrap(), event);
        assert_eq!(queue.count(QueueState::New).unwrap(), 0);
    }
}
