//! Obsolete content collection
//!
//! Two-phase mark/sweep. A digest found on disk without references is first
//! only marked; it is deleted on a later pass once it has stayed unreferenced
//! for at least the obsolescence timeout. That window lets a caller publish
//! content and register its reference slightly later without losing it.

use crate::concurrency::LockTable;
use crate::error::{RepositoryError, StorageError};
use crate::references::ReferenceTracker;
use crate::repository::ContentRepository;
use crate::store::ContentStore;
use crate::types::ContentId;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// What one pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Digests marked obsolete for the first time
    pub marked: BTreeSet<String>,
    /// Digests deleted this pass
    pub deleted: BTreeSet<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.marked.is_empty() && self.deleted.is_empty()
    }
}

/// Digest → instant it was first seen unreferenced
#[derive(Debug, Default)]
pub struct ObsoleteMarks {
    marks: Mutex<HashMap<String, Instant>>,
}

impl ObsoleteMarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Instant> {
        self.marks.lock().get(key).copied()
    }

    pub fn clear(&self, key: &str) {
        self.marks.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.marks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mark(&self, key: &str, now: Instant) -> bool {
        let mut marks = self.marks.lock();
        if marks.contains_key(key) {
            return false;
        }
        marks.insert(key.to_string(), now);
        true
    }

    fn retain_present(&self, present: &HashSet<String>) {
        self.marks.lock().retain(|key, _| present.contains(key));
    }
}

/// One-shot pass over everything on disk.
pub struct ObsolescenceSweeper<'a> {
    pub store: &'a ContentStore,
    pub references: &'a ReferenceTracker,
    pub marks: &'a ObsoleteMarks,
    pub locks: &'a LockTable,
    pub timeout: Duration,
}

impl<'a> ObsolescenceSweeper<'a> {
    /// Run a pass as of `now`.
    pub fn sweep(&self, now: Instant) -> Result<SweepReport, StorageError> {
        let mut report = SweepReport::default();
        let hashes = self.store.list_hashes()?;
        let present: HashSet<String> = hashes.iter().map(|h| h.to_hex()).collect();

        for hash in hashes {
            let key = hash.to_hex();
            if self.references.is_referenced(&key) {
                self.marks.clear(&key);
                continue;
            }

            match self.marks.get(&key) {
                None => {
                    if self.marks.mark(&key, now) {
                        debug!(hash = %key, "Marked content obsolete");
                        report.marked.insert(key);
                    }
                }
                Some(marked_at) if now.saturating_duration_since(marked_at) >= self.timeout => {
                    if self.delete(&key, ContentId::Hash(hash))? {
                        report.deleted.insert(key);
                    }
                }
                Some(_) => {}
            }
        }

        self.marks.retain_present(&present);
        self.store.cleanup().retry();

        info!(
            marked = report.marked.len(),
            deleted = report.deleted.len(),
            "Obsolete content sweep complete"
        );
        Ok(report)
    }

    /// Delete unless the content is busy or was referenced in the meantime.
    fn delete(&self, key: &str, id: ContentId) -> Result<bool, StorageError> {
        let outcome = self.locks.with_lock(key, Duration::ZERO, || {
            if self.references.is_referenced(key) {
                return Ok(false);
            }
            Ok(self.store.remove(&id)?)
        });
        match outcome {
            Ok(removed) => {
                self.marks.clear(key);
                self.locks.purge_if_gone(key, removed);
                Ok(removed)
            }
            Err(RepositoryError::LockTimeout { .. }) => {
                debug!(hash = key, "Content busy, retrying on next sweep");
                Ok(false)
            }
            Err(RepositoryError::StorageError(e)) => Err(e),
            Err(other) => Err(StorageError::InvalidPath(other.to_string())),
        }
    }
}

/// Background thread running [`ContentRepository::clean_obsolete_content`]
/// every `interval`.
pub struct SweepScheduler {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SweepScheduler {
    pub fn start(repository: Arc<ContentRepository>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("obsolete-content-sweeper".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = repository.clean_obsolete_content() {
                            error!(error = %e, "Scheduled sweep failed");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        info!(?interval, "Started obsolete content sweeper");
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for an in-progress pass to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
