//! Per-digest locking
//!
//! Operations that read or rebuild a given piece of content (explode, add,
//! remove, read, list) are serialized per digest. Different digests never
//! contend. Handles are created on first use and purged once the content is
//! gone and nobody holds or waits on the lock.

use crate::error::RepositoryError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `op` while holding the lock for `key`, waiting at most `timeout`.
    ///
    /// A zero timeout makes a single attempt.
    pub fn with_lock<T, F>(&self, key: &str, timeout: Duration, op: F) -> Result<T, RepositoryError>
    where
        F: FnOnce() -> Result<T, RepositoryError>,
    {
        let handle = self.handle(key);
        let acquired = if timeout.is_zero() {
            handle.try_lock()
        } else {
            handle.try_lock_for(timeout)
        };
        match acquired {
            Some(_guard) => {
                trace!(key, "Acquired content lock");
                op()
            }
            None => {
                debug!(key, ?timeout, "Timed out waiting for content lock");
                Err(RepositoryError::LockTimeout {
                    hash: key.to_string(),
                    waited: timeout,
                })
            }
        }
    }

    /// Drop the handle for `key` when its content is gone and it is idle.
    pub fn purge_if_gone(&self, key: &str, content_gone: bool) {
        if !content_gone {
            return;
        }
        let mut locks = self.locks.lock();
        let idle = locks
            .get(key)
            .map(|handle| Arc::strong_count(handle) == 1 && !handle.is_locked())
            .unwrap_or(false);
        if idle {
            locks.remove(key);
            trace!(key, "Purged content lock");
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
