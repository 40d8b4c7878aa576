//! Reference tracking
//!
//! Maps a content key (hex digest, or legacy path) to the set of references
//! holding it. A key with no entry is unreferenced; sets are dropped as soon
//! as they become empty, so "absent" and "empty" never need telling apart.
//!
//! Every mutation happens inside one short critical section with no I/O.

use crate::types::ContentReference;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
pub struct ReferenceTracker {
    sets: Mutex<HashMap<String, HashSet<ContentReference>>>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reference`. Returns `false` if it was already recorded.
    pub fn add(&self, reference: &ContentReference) -> bool {
        let inserted = self
            .sets
            .lock()
            .entry(reference.key())
            .or_default()
            .insert(reference.clone());
        debug!(
            identifier = reference.content_identifier(),
            hash = reference.hex_hash(),
            inserted,
            "Added content reference"
        );
        inserted
    }

    /// Drop `reference`. Returns `true` if its content is now unreferenced,
    /// including when no set existed for it at all.
    pub fn remove(&self, reference: &ContentReference) -> bool {
        let key = reference.key();
        let mut sets = self.sets.lock();
        let now_empty = match sets.get_mut(&key) {
            Some(set) => {
                set.remove(reference);
                set.is_empty()
            }
            None => true,
        };
        if now_empty {
            sets.remove(&key);
        }
        now_empty
    }

    pub fn is_referenced(&self, key: &str) -> bool {
        self.sets.lock().contains_key(key)
    }

    /// References held on `key`, sorted.
    pub fn references(&self, key: &str) -> Vec<ContentReference> {
        let mut refs: Vec<ContentReference> = self
            .sets
            .lock()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        refs.sort();
        refs
    }

    /// Number of distinct referenced keys.
    pub fn len(&self) -> usize {
        self.sets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
