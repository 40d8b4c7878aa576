//! Walker over exploded content trees

use crate::error::StorageError;
use crate::tree::path::relative_string;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Filesystem entry found under a walk root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A file entry with its path and size
    File { path: PathBuf, size: u64 },
    /// A directory entry with its path
    Directory { path: PathBuf },
}

impl Entry {
    pub fn path(&self) -> &Path {
        match self {
            Entry::File { path, .. } | Entry::Directory { path } => path,
        }
    }
}

/// Walker configuration
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Maximum depth below the root (None = unlimited)
    pub max_depth: Option<usize>,
}

/// Filesystem walker
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
}

impl Walker {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            config: WalkerConfig::default(),
        }
    }

    pub fn with_config(root: PathBuf, config: WalkerConfig) -> Self {
        Self { root, config }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree and collect all entries below the root.
    ///
    /// The root itself is never reported. Entries come back in sorted order.
    pub fn walk(&self) -> Result<Vec<Entry>, StorageError> {
        let mut entries = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .min_depth(1)
            .max_depth(self.config.max_depth.unwrap_or(usize::MAX))
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to walk directory {:?}: {}", self.root, e),
                ))
            })?;

            let path = entry.path().to_path_buf();
            let metadata = entry
                .metadata()
                .map_err(|e| StorageError::InvalidPath(format!("Failed to read metadata for {:?}: {}", path, e)))?;

            if metadata.is_file() {
                entries.push(Entry::File {
                    path,
                    size: metadata.len(),
                });
            } else if metadata.is_dir() {
                entries.push(Entry::Directory { path });
            }
        }

        Ok(entries)
    }

    /// Root-relative, `/`-separated form of an entry path.
    pub fn relative(&self, entry: &Entry) -> String {
        relative_string(&self.root, entry.path())
    }
}
