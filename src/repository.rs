//! Content repository
//!
//! Single entry point over the sharded store. Callers publish bytes, then
//! register references to keep them alive; content nobody references is
//! removed synchronously when its last reference goes, or by the two-phase
//! sweep when it was never referenced at all.

use crate::concurrency::LockTable;
use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, StorageError};
use crate::exploded::{ContentEntry, ContentStream, ExplodedContent, ExplodedContentManager};
use crate::references::ReferenceTracker;
use crate::store::{ContentStore, PublishCandidate};
use crate::sweep::{ObsolescenceSweeper, ObsoleteMarks, SweepReport};
use crate::tree::filter::ContentFilter;
use crate::types::{ContentHash, ContentId, ContentReference};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

pub struct ContentRepository {
    store: ContentStore,
    references: ReferenceTracker,
    marks: ObsoleteMarks,
    locks: LockTable,
    read_write: AtomicBool,
    lock_timeout: Duration,
    obsolescence_timeout: Duration,
}

impl ContentRepository {
    /// Open the repository described by `config`, validating it first.
    pub fn new(config: &RepositoryConfig) -> Result<Self, RepositoryError> {
        if let Err(errors) = config.validate() {
            let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(RepositoryError::ConfigError(joined.join("; ")));
        }
        let store = ContentStore::new(&config.store_root, &config.scratch_root)?;
        let repository = Self::with_store(store, config.lock_timeout(), config.obsolescence_timeout());
        repository.read_write.store(!config.read_only, Ordering::SeqCst);
        Ok(repository)
    }

    /// Open a read-write repository with default timeouts.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(store_root: P, scratch_root: Q) -> Result<Self, RepositoryError> {
        let config = RepositoryConfig {
            store_root: store_root.as_ref().to_path_buf(),
            scratch_root: scratch_root.as_ref().to_path_buf(),
            ..RepositoryConfig::default()
        };
        Self::new(&config)
    }

    pub fn with_store(store: ContentStore, lock_timeout: Duration, obsolescence_timeout: Duration) -> Self {
        info!(
            root = %store.root().display(),
            ?lock_timeout,
            ?obsolescence_timeout,
            "Opened content repository"
        );
        Self {
            store,
            references: ReferenceTracker::new(),
            marks: ObsoleteMarks::new(),
            locks: LockTable::new(),
            read_write: AtomicBool::new(true),
            lock_timeout,
            obsolescence_timeout,
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn obsolete_marks(&self) -> &ObsoleteMarks {
        &self.marks
    }

    /// Store the bytes of `reader` and return their digest.
    ///
    /// The bytes are spooled to a scratch file first. Identical content that
    /// is already stored is not written twice.
    #[instrument(skip(self, reader))]
    pub fn add_content<R: Read>(&self, mut reader: R) -> Result<ContentHash, RepositoryError> {
        let scratch = self.store.scratch_root();
        let mut spool = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(scratch)
            .map_err(|e| StorageError::io_at(scratch, "create upload file in", e))?;
        io::copy(&mut reader, spool.as_file_mut()).map_err(|e| StorageError::io_at(spool.path(), "write", e))?;
        spool
            .as_file()
            .sync_all()
            .map_err(|e| StorageError::io_at(spool.path(), "sync", e))?;

        let spooled = spool.into_temp_path();
        let outcome = self.store.publish(&PublishCandidate::File(spooled.to_path_buf()))?;
        let hash = outcome.hash();
        if !outcome.is_created() {
            // Re-adding restarts the grace period for the existing copy.
            self.marks.clear(&hash.to_hex());
        }
        Ok(hash)
    }

    /// Record that `reference` holds its content. Ignored while read-only.
    ///
    /// A reference may be recorded before its content is published; it then
    /// protects the digest from the moment the content appears.
    pub fn add_content_reference(&self, reference: &ContentReference) {
        if !self.is_read_write() {
            debug!(identifier = reference.content_identifier(), "Read-only, reference not recorded");
            return;
        }
        if !self.store.has(&reference.content_id()) {
            debug!(identifier = reference.content_identifier(), "Reference recorded for content not yet stored");
        }
        self.references.add(reference);
        self.marks.clear(&reference.key());
    }

    /// Drop `reference`; delete its content if nothing else holds it.
    ///
    /// Ignored while read-only.
    #[instrument(skip(self), fields(identifier = reference.content_identifier()))]
    pub fn remove_content(&self, reference: &ContentReference) -> Result<(), RepositoryError> {
        if !self.is_read_write() {
            debug!("Read-only, content not removed");
            return Ok(());
        }
        if !self.references.remove(reference) {
            debug!("Content still referenced");
            return Ok(());
        }

        let id = reference.content_id();
        let key = id.key();
        let result = self.locks.with_lock(&key, self.lock_timeout, || {
            if self.references.is_referenced(&key) {
                return Ok(false);
            }
            Ok(self.store.remove(&id)?)
        });
        let gone = !self.store.has(&id);
        if gone {
            self.marks.clear(&key);
        }
        self.locks.purge_if_gone(&key, gone);
        result.map(|_| ())
    }

    pub fn has_content(&self, id: &ContentId) -> bool {
        self.store.has(id)
    }

    /// Filesystem location of stored content, if present.
    pub fn content_path(&self, id: &ContentId) -> Option<PathBuf> {
        let path = self.store.locate(id);
        path.exists().then_some(path)
    }

    pub fn references(&self, hash: &ContentHash) -> Vec<ContentReference> {
        self.references.references(&hash.to_hex())
    }

    pub fn is_read_write(&self) -> bool {
        self.read_write.load(Ordering::SeqCst)
    }

    /// Allow reference changes, removals and sweeps.
    pub fn read_write(&self) {
        self.read_write.store(true, Ordering::SeqCst);
        info!("Content repository is read-write");
    }

    /// Freeze reference changes, removals and sweeps.
    pub fn read_only(&self) {
        self.read_write.store(false, Ordering::SeqCst);
        info!("Content repository is read-only");
    }

    pub fn explode_content(&self, hash: &ContentHash) -> Result<ContentHash, RepositoryError> {
        self.exploded().explode(hash)
    }

    pub fn explode_sub_content(&self, hash: &ContentHash, relative_path: &str) -> Result<ContentHash, RepositoryError> {
        self.exploded().explode_sub_path(hash, relative_path)
    }

    pub fn add_content_to_exploded(
        &self,
        hash: &ContentHash,
        files: Vec<ExplodedContent>,
        overwrite: bool,
    ) -> Result<ContentHash, RepositoryError> {
        self.exploded().add_files(hash, files, overwrite)
    }

    pub fn remove_content_from_exploded(
        &self,
        hash: &ContentHash,
        paths: &[String],
    ) -> Result<ContentHash, RepositoryError> {
        self.exploded().remove_files(hash, paths)
    }

    pub fn read_content(&self, hash: &ContentHash, relative_path: &str) -> Result<ContentStream, RepositoryError> {
        self.exploded().read_file(hash, relative_path)
    }

    pub fn list_content(
        &self,
        hash: &ContentHash,
        relative_path: &str,
        filter: &dyn ContentFilter,
    ) -> Result<Vec<ContentEntry>, RepositoryError> {
        self.exploded().list_entries(hash, relative_path, filter)
    }

    /// Copy an exploded tree into `destination`.
    pub fn copy_exploded_content(&self, hash: &ContentHash, destination: &Path) -> Result<(), RepositoryError> {
        self.exploded().copy_to(hash, destination)
    }

    /// Run one mark/sweep pass now. Does nothing while read-only.
    pub fn clean_obsolete_content(&self) -> Result<SweepReport, RepositoryError> {
        self.clean_obsolete_content_at(Instant::now())
    }

    /// Run one mark/sweep pass as of `now`.
    pub fn clean_obsolete_content_at(&self, now: Instant) -> Result<SweepReport, RepositoryError> {
        if !self.is_read_write() {
            debug!("Read-only, skipping obsolete content sweep");
            return Ok(SweepReport::default());
        }
        let sweeper = ObsolescenceSweeper {
            store: &self.store,
            references: &self.references,
            marks: &self.marks,
            locks: &self.locks,
            timeout: self.obsolescence_timeout,
        };
        Ok(sweeper.sweep(now)?)
    }

    fn exploded(&self) -> ExplodedContentManager<'_> {
        ExplodedContentManager {
            store: &self.store,
            locks: &self.locks,
            marks: &self.marks,
            lock_timeout: self.lock_timeout,
        }
    }
}
