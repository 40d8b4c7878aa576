//! Exploded content operations
//!
//! Stored content is immutable, so every mutation works on a private copy in
//! the scratch area and publishes the result as new content:
//!
//! ```text
//! lock(digest) -> copy -> apply -> digest -> publish -> unlock
//! ```
//!
//! The content at the starting digest is never touched. If anything fails
//! midway the scratch copy is dropped and the original remains the system of
//! record.

use crate::archive;
use crate::concurrency::LockTable;
use crate::error::{RepositoryError, StorageError};
use crate::store::fsops::{copy_recursively, remove_empty_ancestors, remove_recursively};
use crate::store::{ContentStore, PublishCandidate, CONTENT_NAME};
use crate::sweep::ObsoleteMarks;
use crate::tree::filter::{ArchiveProbe, Candidate, ContentFilter, EntryKind};
use crate::tree::path::{resolve_securely, segments};
use crate::tree::walker::{Entry, Walker, WalkerConfig};
use crate::types::{ContentHash, ContentId};
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, instrument};

/// A file (or, without content, a directory) to merge into an exploded tree.
pub struct ExplodedContent {
    relative_path: String,
    content: Option<Box<dyn Read + Send>>,
}

impl ExplodedContent {
    pub fn file<R: Read + Send + 'static>(relative_path: impl Into<String>, content: R) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: Some(Box::new(content)),
        }
    }

    pub fn from_bytes(relative_path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::file(relative_path, io::Cursor::new(bytes.into()))
    }

    pub fn directory(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: None,
        }
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn is_directory(&self) -> bool {
        self.content.is_none()
    }
}

impl fmt::Debug for ExplodedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplodedContent")
            .field("relative_path", &self.relative_path)
            .field("directory", &self.is_directory())
            .finish()
    }
}

/// One row of a content listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentEntry {
    /// Relative path; directories end with `/`
    pub path: String,
    pub is_directory: bool,
    /// Size in bytes (0 for directories)
    pub size: u64,
}

impl ContentEntry {
    fn file(path: &str, size: u64) -> Self {
        Self {
            path: path.to_string(),
            is_directory: false,
            size,
        }
    }

    fn directory(path: &str) -> Self {
        Self {
            path: format!("{}/", path),
            is_directory: true,
            size: 0,
        }
    }
}

/// A private copy of one stored file, deleted when dropped.
pub struct ContentStream {
    content_type: &'static str,
    size: u64,
    reader: BufReader<File>,
    _scratch: TempDir,
}

impl ContentStream {
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for ContentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStream")
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .finish()
    }
}

/// Operations on exploded (directory-form) content.
pub struct ExplodedContentManager<'a> {
    pub store: &'a ContentStore,
    pub locks: &'a LockTable,
    pub marks: &'a ObsoleteMarks,
    pub lock_timeout: Duration,
}

impl<'a> ExplodedContentManager<'a> {
    /// Unpack an archive into a new exploded tree.
    #[instrument(skip(self), fields(hash = %hash))]
    pub fn explode(&self, hash: &ContentHash) -> Result<ContentHash, RepositoryError> {
        self.rebuild(hash, |source, tree| {
            if source.is_dir() {
                return Err(RepositoryError::NotAnArchive(format!("{} is already exploded", hash)));
            }
            if !archive::is_archive(source).map_err(|e| StorageError::io_at(source, "read", e))? {
                return Err(RepositoryError::NotAnArchive(hash.to_hex()));
            }
            archive::unpack(source, tree)
        })
    }

    /// Replace an archive inside an exploded tree with its unpacked entries.
    #[instrument(skip(self), fields(hash = %hash))]
    pub fn explode_sub_path(&self, hash: &ContentHash, relative_path: &str) -> Result<ContentHash, RepositoryError> {
        self.rebuild(hash, |source, tree| {
            copy_exploded(hash, source, tree)?;
            let nested = resolve_securely(tree, relative_path)?;
            if !nested.exists() {
                return Err(RepositoryError::ArchiveNotFound(relative_path.to_string()));
            }
            if !archive::is_archive(&nested).map_err(|e| StorageError::io_at(&nested, "read", e))? {
                return Err(RepositoryError::NotAnArchive(relative_path.to_string()));
            }

            let unpacked = tree.with_file_name("unpacked");
            archive::unpack(&nested, &unpacked)?;
            fs::remove_file(&nested).map_err(|e| StorageError::io_at(&nested, "delete", e))?;
            fs::rename(&unpacked, &nested).map_err(|e| StorageError::io_at(&nested, "replace", e))?;
            Ok(())
        })
    }

    /// Merge files and directory markers into a copy of the tree.
    #[instrument(skip(self, files), fields(hash = %hash, count = files.len()))]
    pub fn add_files(
        &self,
        hash: &ContentHash,
        files: Vec<ExplodedContent>,
        overwrite: bool,
    ) -> Result<ContentHash, RepositoryError> {
        self.rebuild(hash, move |source, tree| {
            copy_exploded(hash, source, tree)?;
            for entry in files {
                let target = resolve_securely(tree, &entry.relative_path)?;
                match entry.content {
                    None => {
                        fs::create_dir_all(&target).map_err(|e| StorageError::io_at(&target, "create", e))?;
                    }
                    Some(mut reader) => {
                        if target.is_dir() || (target.exists() && !overwrite) {
                            return Err(RepositoryError::AlreadyExists(entry.relative_path));
                        }
                        if let Some(parent) = target.parent() {
                            fs::create_dir_all(parent).map_err(|e| StorageError::io_at(parent, "create", e))?;
                        }
                        let mut out = File::create(&target).map_err(|e| StorageError::io_at(&target, "create", e))?;
                        io::copy(&mut reader, &mut out).map_err(|e| StorageError::io_at(&target, "write", e))?;
                    }
                }
            }
            Ok(())
        })
    }

    /// Delete paths from a copy of the tree, pruning directories left empty.
    #[instrument(skip(self, paths), fields(hash = %hash, count = paths.len()))]
    pub fn remove_files(&self, hash: &ContentHash, paths: &[String]) -> Result<ContentHash, RepositoryError> {
        self.rebuild(hash, |source, tree| {
            copy_exploded(hash, source, tree)?;
            for relative in paths {
                let target = resolve_securely(tree, relative)?;
                if target == tree {
                    continue;
                }
                remove_recursively(&target).map_err(|e| StorageError::io_at(&target, "delete", e))?;
                remove_empty_ancestors(&target, tree).map_err(|e| StorageError::io_at(&target, "prune", e))?;
            }
            Ok(())
        })
    }

    /// Materialize one file, descending into nested archives as needed.
    #[instrument(skip(self), fields(hash = %hash))]
    pub fn read_file(&self, hash: &ContentHash, relative_path: &str) -> Result<ContentStream, RepositoryError> {
        self.locked(hash, |source| {
            let segs = segments(relative_path)?;
            let scratch = self.store.scratch_dir()?;
            let name = segs.last().map(String::as_str).unwrap_or(CONTENT_NAME);
            let out = scratch.path().join(name);

            materialize(source, &segs, scratch.path(), &out, relative_path)?;

            let file = File::open(&out).map_err(|e| StorageError::io_at(&out, "open", e))?;
            let size = file.metadata().map_err(|e| StorageError::io_at(&out, "stat", e))?.len();
            Ok(ContentStream {
                content_type: content_type_for(name),
                size,
                reader: BufReader::new(file),
                _scratch: scratch,
            })
        })
    }

    /// List a directory, or an archive's entries, below `relative_path`.
    #[instrument(skip(self, filter), fields(hash = %hash))]
    pub fn list_entries(
        &self,
        hash: &ContentHash,
        relative_path: &str,
        filter: &dyn ContentFilter,
    ) -> Result<Vec<ContentEntry>, RepositoryError> {
        self.locked(hash, |source| {
            let target = if source.is_dir() {
                resolve_securely(source, relative_path)?
            } else if segments(relative_path)?.is_empty() {
                source.to_path_buf()
            } else {
                return Err(RepositoryError::NotExploded(hash.to_hex()));
            };

            if !target.exists() {
                return Err(RepositoryError::ContentNotFound(relative_path.to_string()));
            }
            if target.is_file() {
                if !archive::is_archive(&target).map_err(|e| StorageError::io_at(&target, "read", e))? {
                    return Err(RepositoryError::NotAnArchive(relative_path.to_string()));
                }
                return list_archive(&target, filter);
            }
            list_tree(&target, filter)
        })
    }

    /// Copy an exploded tree out to `destination`.
    pub fn copy_to(&self, hash: &ContentHash, destination: &Path) -> Result<(), RepositoryError> {
        self.locked(hash, |source| {
            if !source.is_dir() {
                return Err(RepositoryError::NotExploded(hash.to_hex()));
            }
            copy_recursively(source, destination).map_err(|e| StorageError::io_at(destination, "copy into", e))?;
            Ok(())
        })
    }

    /// Run `op` on the stored content under the digest lock.
    fn locked<T, F>(&self, hash: &ContentHash, op: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Path) -> Result<T, RepositoryError>,
    {
        let key = hash.to_hex();
        let id = ContentId::Hash(*hash);
        let result = self.locks.with_lock(&key, self.lock_timeout, || {
            let source = self.store.locate(&id);
            if !source.exists() {
                return Err(RepositoryError::ContentNotFound(key.clone()));
            }
            op(&source)
        });
        self.locks.purge_if_gone(&key, !self.store.has(&id));
        result
    }

    /// Build a new tree from the stored content and publish it.
    fn rebuild<F>(&self, hash: &ContentHash, apply: F) -> Result<ContentHash, RepositoryError>
    where
        F: FnOnce(&Path, &Path) -> Result<(), RepositoryError>,
    {
        self.locked(hash, |source| {
            let work = self.store.scratch_dir()?;
            let tree = work.path().join(CONTENT_NAME);
            apply(source, &tree)?;
            if !tree.exists() {
                fs::create_dir_all(&tree).map_err(|e| StorageError::io_at(&tree, "create", e))?;
            }
            let outcome = self.store.publish(&PublishCandidate::Directory(tree))?;
            let rebuilt = outcome.hash();
            if !outcome.is_created() {
                // An existing tree handed back again restarts its grace period.
                self.marks.clear(&rebuilt.to_hex());
            }
            info!(from = %hash, to = %rebuilt, "Rebuilt exploded content");
            Ok(rebuilt)
        })
    }
}

fn copy_exploded(hash: &ContentHash, source: &Path, tree: &Path) -> Result<(), RepositoryError> {
    if !source.is_dir() {
        return Err(RepositoryError::NotExploded(hash.to_hex()));
    }
    copy_recursively(source, tree).map_err(|e| StorageError::io_at(source, "copy", e))?;
    Ok(())
}

/// Copy the file at `segs` below `base` to `out`, opening archives on the way.
fn materialize(base: &Path, segs: &[String], scratch: &Path, out: &Path, requested: &str) -> Result<(), RepositoryError> {
    let not_found = || RepositoryError::ContentNotFound(requested.to_string());
    let mut current: PathBuf = base.to_path_buf();

    for (index, segment) in segs.iter().enumerate() {
        if current.is_dir() {
            current = resolve_securely(&current, segment)?;
            if !current.exists() {
                return Err(not_found());
            }
            continue;
        }
        if !archive::is_archive(&current).map_err(|e| StorageError::io_at(&current, "read", e))? {
            return Err(not_found());
        }
        return read_from_archive(&current, &segs[index..], scratch, out, requested, 0);
    }

    if current.is_dir() {
        return Err(RepositoryError::NotAFile(requested.to_string()));
    }
    fs::copy(&current, out).map_err(|e| StorageError::io_at(&current, "copy", e))?;
    Ok(())
}

fn read_from_archive(
    archive_path: &Path,
    segs: &[String],
    scratch: &Path,
    out: &Path,
    requested: &str,
    level: usize,
) -> Result<(), RepositoryError> {
    for end in 0..segs.len() {
        let name = segs[..=end].join("/");
        if end + 1 == segs.len() {
            if archive::extract_entry(archive_path, &name, out)? {
                return Ok(());
            }
            if archive::has_directory(archive_path, &name)? {
                return Err(RepositoryError::NotAFile(requested.to_string()));
            }
            return Err(RepositoryError::ContentNotFound(requested.to_string()));
        }

        let nested = scratch.join(format!("nested-{}-{}", level, end));
        if archive::extract_entry(archive_path, &name, &nested)? {
            if !archive::is_archive(&nested).map_err(|e| StorageError::io_at(&nested, "read", e))? {
                return Err(RepositoryError::ContentNotFound(requested.to_string()));
            }
            debug!(entry = %name, "Descending into nested archive");
            return read_from_archive(&nested, &segs[end + 1..], scratch, out, requested, level + 1);
        }
    }
    Err(RepositoryError::ContentNotFound(requested.to_string()))
}

fn list_tree(root: &Path, filter: &dyn ContentFilter) -> Result<Vec<ContentEntry>, RepositoryError> {
    let walker = Walker::with_config(
        root.to_path_buf(),
        WalkerConfig {
            follow_symlinks: false,
            max_depth: filter.max_depth(),
        },
    );
    let mut listed = Vec::new();
    for entry in walker.walk()? {
        let relative = walker.relative(&entry);
        let (kind, probe) = match &entry {
            Entry::File { path, .. } => (EntryKind::File, ArchiveProbe::File(path)),
            Entry::Directory { .. } => (EntryKind::Directory, ArchiveProbe::Known(false)),
        };
        let candidate = Candidate::new(&relative, kind, probe);
        if !filter.accept(&candidate).map_err(StorageError::IoError)? {
            continue;
        }
        listed.push(match entry {
            Entry::File { size, .. } => ContentEntry::file(&relative, size),
            Entry::Directory { .. } => ContentEntry::directory(&relative),
        });
    }
    Ok(listed)
}

fn list_archive(archive_path: &Path, filter: &dyn ContentFilter) -> Result<Vec<ContentEntry>, RepositoryError> {
    let mut listed = Vec::new();
    for entry in archive::list(archive_path)? {
        let kind = if entry.is_directory {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let candidate = Candidate::new(&entry.name, kind, ArchiveProbe::Known(entry.is_archive));
        if !filter.accept(&candidate).map_err(StorageError::IoError)? {
            continue;
        }
        listed.push(if entry.is_directory {
            ContentEntry::directory(&entry.name)
        } else {
            ContentEntry::file(&entry.name, entry.size)
        });
    }
    Ok(listed)
}

/// Media type guessed from a file name's extension.
pub fn content_type_for(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("txt") | Some("properties") | Some("mf") => "text/plain",
        Some("html") | Some("htm") | Some("jsp") => "text/html",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("xml") | Some("xsd") => "application/xml",
        Some("zip") => "application/zip",
        Some("jar") | Some("war") | Some("ear") | Some("rar") | Some("sar") => "application/java-archive",
        Some("class") => "application/java-vm",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
