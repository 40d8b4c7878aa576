//! Sharded content store
//!
//! Content lives at `{root}/{hex[0..2]}/{hex[2..]}/content`, where `content`
//! is either a single file or an exploded directory tree. The two-level
//! layout bounds directory fan-out; the same digest always maps to the same
//! location, which is what makes deduplication free.
//!
//! Candidates are assembled in a scratch area and become visible under their
//! digest only through the final rename in [`relocate`].

pub mod cleanup;
pub mod fsops;
pub mod relocate;

pub use cleanup::DeferredCleanup;
pub use relocate::{Relocation, RelocationStrategy, DEFAULT_STRATEGIES};

use crate::error::StorageError;
use crate::tree::hasher::ContentHasher;
use crate::types::{ContentHash, ContentId};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Name of the leaf entry inside a shard directory
pub const CONTENT_NAME: &str = "content";

/// Staging area inside the store root used by copy fallbacks
pub const STAGING_DIR: &str = ".staging";

/// Something ready to be published.
#[derive(Debug, Clone)]
pub enum PublishCandidate {
    /// A single file, identified by the digest of its bytes.
    File(PathBuf),
    /// An exploded tree, identified by its recursive digest.
    ///
    /// The directory should be named [`CONTENT_NAME`] so the digest does not
    /// depend on where the tree was assembled.
    Directory(PathBuf),
}

impl PublishCandidate {
    pub fn path(&self) -> &Path {
        match self {
            PublishCandidate::File(path) | PublishCandidate::Directory(path) => path,
        }
    }
}

/// Result of a successful publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The candidate was moved into the store.
    Created(ContentHash),
    /// Identical content was already stored; the candidate was discarded.
    Deduplicated(ContentHash),
}

impl PublishOutcome {
    pub fn hash(&self) -> ContentHash {
        match self {
            PublishOutcome::Created(hash) | PublishOutcome::Deduplicated(hash) => *hash,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, PublishOutcome::Created(_))
    }
}

/// Filesystem-backed content store
pub struct ContentStore {
    root: PathBuf,
    scratch_root: PathBuf,
    hasher: ContentHasher,
    cleanup: DeferredCleanup,
    strategies: Vec<RelocationStrategy>,
}

impl ContentStore {
    /// Open a store at `root`, using `scratch_root` for working copies.
    ///
    /// Both directories are created if missing.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(root: P, scratch_root: Q) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        let scratch_root = scratch_root.as_ref().to_path_buf();

        for dir in [&root, &scratch_root] {
            fs::create_dir_all(dir).map_err(|e| StorageError::io_at(dir, "create directory", e))?;
        }

        Ok(Self {
            root,
            scratch_root,
            hasher: ContentHasher::new(),
            cleanup: DeferredCleanup::new(),
            strategies: DEFAULT_STRATEGIES.to_vec(),
        })
    }

    /// Replace the ordered list of relocation strategies.
    pub fn with_strategies(mut self, strategies: &[RelocationStrategy]) -> Self {
        self.strategies = strategies.to_vec();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    pub fn hasher(&self) -> &ContentHasher {
        &self.hasher
    }

    pub fn cleanup(&self) -> &DeferredCleanup {
        &self.cleanup
    }

    /// `{root}/{hex[0..2]}/{hex[2..]}`
    pub fn shard_dir(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join(&hex[0..2]).join(&hex[2..])
    }

    /// Where the content for `id` lives (or would live). No side effects.
    pub fn locate(&self, id: &ContentId) -> PathBuf {
        match id {
            ContentId::Hash(hash) => self.shard_dir(hash).join(CONTENT_NAME),
            ContentId::Legacy(path) => path.clone(),
        }
    }

    /// Location for writing `hash`, creating both shard levels.
    ///
    /// Fails if a shard directory exists but is not writable.
    pub fn locate_for_write(&self, hash: &ContentHash) -> Result<PathBuf, StorageError> {
        let hex = hash.to_hex();
        let first = self.root.join(&hex[0..2]);
        let second = first.join(&hex[2..]);
        for dir in [&first, &second] {
            if dir.is_dir() {
                let metadata = fs::metadata(dir).map_err(|e| StorageError::io_at(dir, "stat", e))?;
                if metadata.permissions().readonly() {
                    return Err(StorageError::ShardNotWritable(dir.clone()));
                }
            } else {
                fs::create_dir_all(dir).map_err(|e| StorageError::io_at(dir, "create directory", e))?;
            }
        }
        Ok(second.join(CONTENT_NAME))
    }

    pub fn has(&self, id: &ContentId) -> bool {
        self.locate(id).exists()
    }

    /// Fresh private directory under the scratch root; removed on drop.
    pub fn scratch_dir(&self) -> Result<TempDir, StorageError> {
        tempfile::Builder::new()
            .prefix("work-")
            .tempdir_in(&self.scratch_root)
            .map_err(|e| StorageError::io_at(&self.scratch_root, "create scratch directory in", e))
    }

    /// Digest a candidate and move it under its shard path unless that
    /// content is already stored.
    pub fn publish(&self, candidate: &PublishCandidate) -> Result<PublishOutcome, StorageError> {
        let source = candidate.path();
        let hash = match candidate {
            PublishCandidate::File(path) => {
                let file = fs::File::open(path).map_err(|e| StorageError::io_at(path, "open", e))?;
                self.hasher
                    .digest_reader(file)
                    .map_err(|e| StorageError::io_at(path, "hash", e))?
            }
            PublishCandidate::Directory(path) => self.hasher.digest_path(path)?,
        };

        let target = self.locate_for_write(&hash)?;
        if target.exists() {
            debug!(hash = %hash, "Content already stored, discarding candidate");
            self.cleanup.discard(source);
            return Ok(PublishOutcome::Deduplicated(hash));
        }

        let staging_root = self.root.join(STAGING_DIR);
        let relocation = Relocation {
            staging_root: &staging_root,
            hop_root: &self.scratch_root,
        };
        match relocation.relocate(source, &target, &self.strategies) {
            Ok(strategy) => {
                if source.exists() {
                    self.cleanup.discard(source);
                }
                info!(hash = %hash, ?strategy, "Published content");
                Ok(PublishOutcome::Created(hash))
            }
            Err(_) if target.exists() => {
                debug!(hash = %hash, "Content published concurrently, discarding candidate");
                self.cleanup.discard(source);
                Ok(PublishOutcome::Deduplicated(hash))
            }
            Err(e) => {
                self.remove_empty_shard(&target);
                Err(e)
            }
        }
    }

    /// Delete stored content and any shard directories it leaves empty.
    ///
    /// Returns whether anything was there.
    pub fn remove(&self, id: &ContentId) -> Result<bool, StorageError> {
        let path = self.locate(id);
        if fs::symlink_metadata(&path).is_err() {
            return Ok(false);
        }
        fsops::remove_recursively(&path).map_err(|e| StorageError::io_at(&path, "delete", e))?;
        if matches!(id, ContentId::Hash(_)) {
            if let Err(e) = fsops::remove_empty_ancestors(&path, &self.root) {
                debug!(path = %path.display(), error = %e, "Could not prune shard directories");
            }
        }
        info!(content = %id, "Removed content");
        Ok(true)
    }

    fn remove_empty_shard(&self, target: &Path) {
        let _ = fsops::remove_empty_ancestors(target, &self.root);
    }

    /// Every digest physically present, in sorted order.
    ///
    /// Anything that does not look like a shard (the staging area, stray
    /// files, half-created shard directories) is skipped.
    pub fn list_hashes(&self) -> Result<Vec<ContentHash>, StorageError> {
        let mut hashes = Vec::new();
        for first in read_dir_sorted(&self.root)? {
            hashes.extend(self.hashes_under_prefix(&first)?);
        }
        Ok(hashes)
    }

    /// Digests stored under one two-character prefix directory.
    ///
    /// A prefix pruned by a concurrent removal yields nothing.
    fn hashes_under_prefix(&self, first: &Path) -> Result<Vec<ContentHash>, StorageError> {
        let Some(prefix) = dir_name(first, 2) else {
            return Ok(Vec::new());
        };
        let seconds = match read_dir_sorted(first) {
            Ok(seconds) => seconds,
            Err(StorageError::IoError(e)) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut hashes = Vec::new();
        for second in seconds {
            let Some(rest) = dir_name(&second, 0) else {
                continue;
            };
            let Some(hash) = ContentHash::from_hex(&format!("{}{}", prefix, rest)) else {
                continue;
            };
            if second.join(CONTENT_NAME).exists() {
                hashes.push(hash);
            }
        }
        Ok(hashes)
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StorageError::io_at(dir, "list", e))? {
        let entry = entry.map_err(|e| StorageError::io_at(dir, "list", e))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Directory name as a string, optionally required to have an exact length.
fn dir_name(path: &Path, exact_len: usize) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if exact_len > 0 && name.len() != exact_len {
        return None;
    }
    Some(name.to_string())
}
