//! Deferred deletion of leftovers
//!
//! Best-effort cleanup never fails the operation that triggered it. Paths
//! that cannot be removed right away are remembered and retried on the next
//! sweep and when the store is dropped.

use crate::store::fsops::remove_recursively;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct DeferredCleanup {
    pending: Mutex<Vec<PathBuf>>,
}

impl DeferredCleanup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to remove `path` now; queue it for later if that fails.
    pub fn discard(&self, path: &Path) {
        if let Err(e) = remove_recursively(path) {
            warn!(path = %path.display(), error = %e, "Deferring removal of leftover content");
            self.pending.lock().push(path.to_path_buf());
        }
    }

    /// Retry every queued path. Returns how many are still pending.
    pub fn retry(&self) -> usize {
        let queued: Vec<PathBuf> = std::mem::take(&mut *self.pending.lock());
        if queued.is_empty() {
            return 0;
        }
        let mut still_pending = Vec::new();
        for path in queued {
            match remove_recursively(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed deferred leftover"),
                Err(_) => still_pending.push(path),
            }
        }
        let remaining = still_pending.len();
        self.pending.lock().extend(still_pending);
        remaining
    }

    pub fn pending(&self) -> Vec<PathBuf> {
        self.pending.lock().clone()
    }
}

impl Drop for DeferredCleanup {
    fn drop(&mut self) {
        let remaining = self.retry();
        if remaining > 0 {
            warn!(remaining, "Leftover content could not be removed");
        }
    }
}
