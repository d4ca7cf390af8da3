// SPDX-License-Identifier: MIT

//! The hash-chained, crash-safe, append-only event log.

use crate::error::JournalError;
use ak_core::{
    compile_default_patterns, redact_json, Clock, Event, EventId, EventPayload, RedactionPattern, SessionId,
    SystemClock,
};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options controlling a journal's durability and privacy behavior.
#[derive(Clone)]
pub struct JournalOptions {
    pub fsync: bool,
    pub redact: bool,
    pub patterns: Vec<Arc<RedactionPattern>>,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self { fsync: true, redact: true, patterns: compile_default_patterns().into_iter().map(Arc::new).collect() }
    }
}

/// Result of [`Journal::verify_integrity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityReport {
    Valid,
    BrokenAt(u64),
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        matches!(self, IntegrityReport::Valid)
    }
}

/// Filesystem health snapshot returned by [`Journal::check_health`].
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub writable: bool,
    pub free_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
}

type Listener = Box<dyn Fn(&Event) + Send + Sync>;

struct JournalState {
    file: File,
    next_seq: u64,
    /// Hash of the most recently appended line; `None` before the first
    /// event is written.
    tip_hash: Option<String>,
    session_index: HashMap<SessionId, Vec<Event>>,
}

/// The journal itself. Cheap to clone (an `Arc` internally would be used by
/// callers that need to share one across threads); holds its own mutex so
/// `emit`/`compact` serialize against each other while `read_all` /
/// `read_session` may run concurrently.
pub struct Journal {
    path: PathBuf,
    options: JournalOptions,
    clock: Box<dyn Clock>,
    state: Mutex<JournalState>,
    /// OS-level advisory lock on a sibling `.lock` file, guarded by an
    /// in-process mutex so `try_write` is only ever called from one thread
    /// at a time. Held only for the duration of a single `emit`/`compact`
    /// call, never across calls.
    file_lock: Mutex<fd_lock::RwLock<File>>,
    listeners: Mutex<Vec<Listener>>,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal").field("path", &self.path).finish_non_exhaustive()
    }
}

fn hash_line(line: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(line.as_bytes());
    hex::encode(hasher.finalize())
}

fn validate_event(event: &Event) -> Result<(), JournalError> {
    if event.kind != event.payload.type_tag() && event.payload.type_tag() != "custom" {
        return Err(JournalError::EventSchemaInvalid(format!(
            "type tag {:?} does not match payload variant {:?}",
            event.kind,
            event.payload.type_tag()
        )));
    }
    Ok(())
}

impl Journal {
    /// Opens (creating if absent) the journal file at `path`. If the file
    /// already exists every line is parsed and the hash chain verified; on
    /// any mismatch initialization fails atomically and no in-memory state
    /// is retained.
    pub fn init(path: impl Into<PathBuf>, options: JournalOptions) -> Result<Self, JournalError> {
        Self::init_with_clock(path, options, Box::new(SystemClock))
    }

    pub fn init_with_clock(
        path: impl Into<PathBuf>,
        options: JournalOptions,
        clock: Box<dyn Clock>,
    ) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock_path = lock_path_for(&path);

        let (next_seq, tip_hash, session_index) = if path.exists() {
            replay_and_verify(&path)?
        } else {
            (0, None, HashMap::new())
        };

        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        let lock_file = OpenOptions::new().create(true).write(true).open(&lock_path)?;

        Ok(Self {
            path,
            options,
            clock,
            state: Mutex::new(JournalState { file, next_seq, tip_hash, session_index }),
            file_lock: Mutex::new(fd_lock::RwLock::new(lock_file)),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Registers a callback invoked after an event is durably appended.
    /// Listener panics are caught and swallowed — the journal must never
    /// fail because a listener did.
    pub fn subscribe(&self, listener: impl Fn(&Event) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    fn notify(&self, event: &Event) {
        for listener in self.listeners.lock().iter() {
            let _ = std::panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
        }
    }

    /// Appends a single event. Single-writer: serialized by an internal
    /// mutex plus an OS-level advisory lock so two processes can never
    /// append to the same file concurrently.
    pub fn emit(&self, session_id: SessionId, payload: EventPayload) -> Result<Event, JournalError> {
        let mut lock = self.file_lock.lock();
        let _file_guard = lock.try_write().map_err(|_| JournalError::Locked)?;
        let mut state = self.state.lock();

        let mut payload = payload;
        if self.options.redact {
            let mut value = serde_json::to_value(&payload).map_err(|e| JournalError::InvalidEvent { offset: 0, source: e })?;
            let patterns: Vec<&RedactionPattern> = self.options.patterns.iter().map(Arc::as_ref).collect();
            redact_json(&mut value, &patterns);
            payload = serde_json::from_value(value).map_err(|e| JournalError::InvalidEvent { offset: 0, source: e })?;
        }

        let event = Event {
            event_id: EventId::new(),
            timestamp: self.clock.epoch_ms(),
            session_id,
            kind: payload.type_tag().to_string(),
            payload,
            hash_prev: state.tip_hash.clone(),
            seq: state.next_seq,
        };
        validate_event(&event)?;

        let line = event.to_line().map_err(|e| JournalError::InvalidEvent { offset: state.next_seq, source: e })?;
        writeln!(state.file, "{line}")?;
        if self.options.fsync {
            state.file.sync_all()?;
        }

        state.next_seq += 1;
        state.tip_hash = Some(hash_line(&line));
        state.session_index.entry(session_id).or_default().push(event.clone());

        drop(state);
        self.notify(&event);
        Ok(event)
    }

    /// Like [`Journal::emit`] but absorbs any error and returns `None`; used
    /// on non-critical paths so a journal hiccup cannot crash the caller.
    pub fn try_emit(&self, session_id: SessionId, payload: EventPayload) -> Option<Event> {
        match self.emit(session_id, payload) {
            Ok(event) => Some(event),
            Err(error) => {
                tracing::warn!(%error, "try_emit absorbed a journal error");
                None
            }
        }
    }

    /// Streams and parses the entire file fresh from disk.
    pub fn read_all(&self) -> Result<Vec<Event>, JournalError> {
        read_all_events(&self.path)
    }

    /// Serves from the in-memory per-session index built at init and kept
    /// current on each emit.
    pub fn read_session(&self, session_id: SessionId, offset: usize, limit: Option<usize>) -> Vec<Event> {
        let state = self.state.lock();
        let Some(events) = state.session_index.get(&session_id) else {
            return Vec::new();
        };
        let slice = events.iter().skip(offset);
        match limit {
            Some(limit) => slice.take(limit).cloned().collect(),
            None => slice.cloned().collect(),
        }
    }

    /// Rebuilds the journal retaining only `retain_sessions` (or everything,
    /// if `None`), reassigning `seq` from 0 and recomputing the hash chain.
    /// Writes to a sibling temp file, fsyncs, then atomically renames over
    /// the live file. On any failure the temp file is removed and the live
    /// file is left untouched.
    pub fn compact(&self, retain_sessions: Option<&[SessionId]>) -> Result<(usize, usize), JournalError> {
        let mut lock = self.file_lock.lock();
        let _file_guard = lock.try_write().map_err(|_| JournalError::Locked)?;
        let mut state = self.state.lock();

        let result = (|| -> Result<(usize, usize), JournalError> {
            let all = read_all_events(&self.path)?;
            let before_count = all.len();
            let kept: Vec<&Event> = match retain_sessions {
                Some(sessions) => all.iter().filter(|e| sessions.contains(&e.session_id)).collect(),
                None => all.iter().collect(),
            };

            let tmp_path = self.path.with_extension("compact.tmp");
            let mut tmp_file = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;

            let mut tip_hash: Option<String> = None;
            let mut rebuilt = Vec::with_capacity(kept.len());
            for (seq, event) in kept.into_iter().enumerate() {
                let rebuilt_event = Event {
                    event_id: event.event_id,
                    timestamp: event.timestamp,
                    session_id: event.session_id,
                    kind: event.kind.clone(),
                    payload: event.payload.clone(),
                    hash_prev: tip_hash.clone(),
                    seq: seq as u64,
                };
                let line = rebuilt_event
                    .to_line()
                    .map_err(|e| JournalError::InvalidEvent { offset: seq as u64, source: e })?;
                writeln!(tmp_file, "{line}")?;
                tip_hash = Some(hash_line(&line));
                rebuilt.push(rebuilt_event);
            }
            tmp_file.sync_all()?;
            drop(tmp_file);

            std::fs::rename(&tmp_path, &self.path)?;

            let file = OpenOptions::new().create(true).append(true).read(true).open(&self.path)?;
            let mut session_index: HashMap<SessionId, Vec<Event>> = HashMap::new();
            for event in &rebuilt {
                session_index.entry(event.session_id).or_default().push(event.clone());
            }
            let after_count = rebuilt.len();

            state.file = file;
            state.next_seq = after_count as u64;
            state.tip_hash = tip_hash;
            state.session_index = session_index;

            Ok((before_count, after_count))
        })();

        if result.is_err() {
            let tmp_path = self.path.with_extension("compact.tmp");
            let _ = std::fs::remove_file(tmp_path);
        }
        result
    }

    /// Re-walks the file and reports the index of the first broken link, if
    /// any.
    pub fn verify_integrity(&self) -> Result<IntegrityReport, JournalError> {
        match replay_and_verify(&self.path) {
            Ok(_) => Ok(IntegrityReport::Valid),
            Err(JournalError::HashMismatch { index, .. }) => Ok(IntegrityReport::BrokenAt(index)),
            Err(other) => Err(other),
        }
    }

    /// A write-access test of the file (or its parent directory, if the
    /// file is absent) plus filesystem free-space stats.
    pub fn check_health(&self) -> HealthReport {
        let writable = OpenOptions::new().append(true).open(&self.path).is_ok()
            || self.path.parent().map(|p| p.metadata().map(|m| !m.permissions().readonly()).unwrap_or(false)).unwrap_or(false);

        let (free_bytes, total_bytes) = disk_space(&self.path);
        HealthReport { writable, free_bytes, total_bytes }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut lock_path = path.to_path_buf();
    let file_name = lock_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    lock_path.set_file_name(format!("{file_name}.lock"));
    lock_path
}

fn read_all_events(path: &Path) -> Result<Vec<Event>, JournalError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for (offset, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let event = Event::from_line(&line).map_err(|e| JournalError::InvalidEvent { offset: offset as u64, source: e })?;
        events.push(event);
    }
    Ok(events)
}

/// Shared by `init` and `verify_integrity`: stream-parses the file, checks
/// `prev_hash(e_i) == hash(serialize(e_{i-1}))` for every `i > 0`, and
/// returns the next sequence number, current tip hash, and per-session
/// index on success.
fn replay_and_verify(path: &Path) -> Result<(u64, Option<String>, HashMap<SessionId, Vec<Event>>), JournalError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut session_index: HashMap<SessionId, Vec<Event>> = HashMap::new();
    let mut expected_prev: Option<String> = None;
    let mut count: u64 = 0;

    for (offset, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let event = Event::from_line(&line).map_err(|e| JournalError::InvalidEvent { offset: offset as u64, source: e })?;

        if event.hash_prev != expected_prev {
            return Err(JournalError::HashMismatch {
                index: count,
                expected: expected_prev.unwrap_or_default(),
                found: event.hash_prev.clone(),
            });
        }

        expected_prev = Some(hash_line(&line));
        session_index.entry(event.session_id).or_default().push(event);
        count += 1;
    }

    Ok((count, expected_prev, session_index))
}

fn disk_space(path: &Path) -> (Option<u64>, Option<u64>) {
    use sysinfo::Disks;
    let target = path.parent().unwrap_or_else(|| Path::new("."));
    let disks = Disks::new_with_refreshed_list();
    let mut best: Option<(&std::path::Path, u64, u64)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if target.starts_with(mount) {
            let depth = mount.components().count();
            if best.map(|(m, _, _)| depth > m.components().count()).unwrap_or(true) {
                best = Some((mount, disk.available_space(), disk.total_space()));
            }
        }
    }
    match best {
        Some((_, free, total)) => (Some(free), Some(total)),
        None => (None, None),
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
