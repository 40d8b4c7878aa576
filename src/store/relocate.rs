//! Moving a finished candidate into its shard location
//!
//! Strategies are tried in order until one succeeds. Every strategy makes the
//! target appear with a single rename, so a half-copied tree is never visible
//! at a published location.

use crate::error::StorageError;
use crate::store::fsops::copy_recursively;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// One way of getting a candidate to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationStrategy {
    /// Plain rename; only works on the same volume.
    Rename,
    /// Copy into the store's staging area, rename into place, drop the source.
    CopyViaStaging,
    /// Copy to a local hop directory first, then stage and rename.
    CopyViaLocalHop,
}

pub const DEFAULT_STRATEGIES: [RelocationStrategy; 3] = [
    RelocationStrategy::Rename,
    RelocationStrategy::CopyViaStaging,
    RelocationStrategy::CopyViaLocalHop,
];

/// Directories a relocation may use for intermediate copies.
pub struct Relocation<'a> {
    /// Lives inside the store root, so renames out of it are same-volume.
    pub staging_root: &'a Path,
    /// Scratch area local to the caller.
    pub hop_root: &'a Path,
}

impl<'a> Relocation<'a> {
    /// Move `source` to `target`, returning the strategy that succeeded.
    ///
    /// Stops early with `AlreadyExists` if the target shows up while trying,
    /// which means a concurrent publisher won the race.
    pub fn relocate(
        &self,
        source: &Path,
        target: &Path,
        strategies: &[RelocationStrategy],
    ) -> Result<RelocationStrategy, StorageError> {
        let mut last_error =
            io::Error::new(io::ErrorKind::InvalidInput, "no relocation strategy configured");

        for strategy in strategies {
            if target.exists() {
                return Err(StorageError::IoError(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{:?} already exists", target),
                )));
            }
            match self.apply(*strategy, source, target) {
                Ok(()) => {
                    debug!(?strategy, target = %target.display(), "Relocated content");
                    return Ok(*strategy);
                }
                Err(e) => {
                    warn!(?strategy, source = %source.display(), error = %e, "Relocation strategy failed");
                    last_error = e;
                }
            }
        }

        Err(StorageError::io_at(target, "relocate content to", last_error))
    }

    fn apply(&self, strategy: RelocationStrategy, source: &Path, target: &Path) -> io::Result<()> {
        match strategy {
            RelocationStrategy::Rename => fs::rename(source, target),
            RelocationStrategy::CopyViaStaging => self.stage_and_rename(source, target),
            RelocationStrategy::CopyViaLocalHop => {
                let hop = tempfile::Builder::new().prefix("hop-").tempdir_in(self.hop_root)?;
                let hopped = hop.path().join("content");
                copy_recursively(source, &hopped)?;
                self.stage_and_rename(&hopped, target)
            }
        }
    }

    fn stage_and_rename(&self, source: &Path, target: &Path) -> io::Result<()> {
        fs::create_dir_all(self.staging_root)?;
        // Dropping the staging dir removes any partial copy.
        let stage = tempfile::Builder::new().prefix("stage-").tempdir_in(self.staging_root)?;
        let staged = stage.path().join("content");
        copy_recursively(source, &staged)?;
        fs::rename(&staged, target)
    }
}
