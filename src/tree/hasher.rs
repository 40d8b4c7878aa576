//! Content digests using BLAKE3
//!
//! Two digest shapes exist:
//!
//! - a byte stream is hashed as-is ([`ContentHasher::digest_reader`]);
//! - a path is hashed recursively ([`ContentHasher::digest_path`]): a file
//!   contributes its base name followed by its bytes, a directory contributes
//!   its base name followed by the contributions of its children in sorted
//!   name order. The whole walk feeds one streaming hasher, so renaming or
//!   moving any entry changes the result.

use crate::error::StorageError;
use crate::types::ContentHash;
use blake3::Hasher;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Digest engine with a single pooled hasher.
///
/// The pooled instance is taken opportunistically; a concurrent caller that
/// finds it busy allocates a fresh one, so results never depend on the pool.
pub struct ContentHasher {
    pooled: Mutex<Option<Hasher>>,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            pooled: Mutex::new(Some(Hasher::new())),
        }
    }

    fn checkout(&self) -> Hasher {
        let pooled = self.pooled.try_lock().and_then(|mut slot| slot.take());
        match pooled {
            Some(mut hasher) => {
                hasher.reset();
                hasher
            }
            None => {
                trace!("Pooled hasher busy, allocating a fresh one");
                Hasher::new()
            }
        }
    }

    fn checkin(&self, hasher: Hasher) {
        if let Some(mut slot) = self.pooled.try_lock() {
            if slot.is_none() {
                *slot = Some(hasher);
            }
        }
    }

    /// Hash everything `reader` yields. The reader is drained and dropped.
    pub fn digest_reader<R: Read>(&self, reader: R) -> io::Result<ContentHash> {
        let mut hasher = self.checkout();
        let result = update_from_reader(&mut hasher, reader);
        let hash = result.map(|_| ContentHash::from_bytes(*hasher.finalize().as_bytes()));
        self.checkin(hasher);
        hash
    }

    /// Hash a file or directory tree using the name-sensitive recursive scheme.
    pub fn digest_path(&self, path: &Path) -> Result<ContentHash, StorageError> {
        let mut hasher = self.checkout();
        let result = update_from_path(&mut hasher, path, &mut HashSet::new());
        let hash = result.map(|_| ContentHash::from_bytes(*hasher.finalize().as_bytes()));
        self.checkin(hasher);
        hash
    }
}

/// Hash a byte stream with a one-off hasher.
pub fn digest_reader<R: Read>(reader: R) -> io::Result<ContentHash> {
    let mut hasher = Hasher::new();
    update_from_reader(&mut hasher, reader)?;
    Ok(ContentHash::from_bytes(*hasher.finalize().as_bytes()))
}

/// Hash a path with a one-off hasher.
pub fn digest_path(path: &Path) -> Result<ContentHash, StorageError> {
    let mut hasher = Hasher::new();
    update_from_path(&mut hasher, path, &mut HashSet::new())?;
    Ok(ContentHash::from_bytes(*hasher.finalize().as_bytes()))
}

fn update_from_reader<R: Read>(hasher: &mut Hasher, reader: R) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    io::copy(&mut reader, hasher)?;
    Ok(())
}

/// `open_dirs` holds the canonical directories currently being walked; a
/// symlink back into one of them adds nothing.
fn update_from_path(hasher: &mut Hasher, path: &Path, open_dirs: &mut HashSet<PathBuf>) -> Result<(), StorageError> {
    // Follows symlinks; anything that is neither file nor directory adds nothing.
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StorageError::io_at(path, "stat", e)),
    };

    if metadata.is_file() {
        update_name(hasher, path);
        let file = fs::File::open(path).map_err(|e| StorageError::io_at(path, "open", e))?;
        update_from_reader(hasher, file).map_err(|e| StorageError::io_at(path, "read", e))?;
    } else if metadata.is_dir() {
        let canonical = dunce::canonicalize(path).map_err(|e| StorageError::io_at(path, "resolve", e))?;
        if !open_dirs.insert(canonical.clone()) {
            trace!(path = %path.display(), "Skipping symlink cycle");
            return Ok(());
        }
        update_name(hasher, path);
        for child in sorted_children(path)? {
            update_from_path(hasher, &child, open_dirs)?;
        }
        open_dirs.remove(&canonical);
    }
    Ok(())
}

fn update_name(hasher: &mut Hasher, path: &Path) {
    if let Some(name) = path.file_name() {
        hasher.update(name.to_string_lossy().as_bytes());
    }
}

/// Children of `dir` ordered by file name.
pub(crate) fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StorageError::io_at(dir, "list", e))? {
        let entry = entry.map_err(|e| StorageError::io_at(dir, "list", e))?;
        children.push(entry.path());
    }
    children.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(children)
}
