//! ZIP archive handling
//!
//! Detection is by magic bytes, not by file extension, so a `.war`, `.jar` or
//! extension-less upload are all recognized.

use crate::error::{RepositoryError, StorageError};
use crate::tree::path::resolve_securely;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

const LOCAL_FILE_HEADER: [u8; 4] = *b"PK\x03\x04";
const EMPTY_ARCHIVE: [u8; 4] = *b"PK\x05\x06";
const SPANNED_ARCHIVE: [u8; 4] = *b"PK\x07\x08";

/// One entry of an archive listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name without trailing slash
    pub name: String,
    pub is_directory: bool,
    /// Uncompressed size
    pub size: u64,
    pub is_archive: bool,
}

/// Whether the leading bytes look like a ZIP archive.
pub fn is_archive_header(head: &[u8]) -> bool {
    head.len() >= 4
        && (head[..4] == LOCAL_FILE_HEADER
            || head[..4] == EMPTY_ARCHIVE
            || head[..4] == SPANNED_ARCHIVE)
}

/// Whether a reader starts with a ZIP header. Consumes at most four bytes.
pub fn is_archive_stream<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut head = [0u8; 4];
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(is_archive_header(&head[..filled]))
}

/// Whether `path` is a regular file holding a ZIP archive.
pub fn is_archive(path: &Path) -> io::Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    let mut file = File::open(path)?;
    is_archive_stream(&mut file)
}

fn open(path: &Path) -> Result<ZipArchive<File>, RepositoryError> {
    let file = File::open(path).map_err(|e| StorageError::io_at(path, "open archive", e))?;
    ZipArchive::new(file).map_err(|e| zip_error(path, e))
}

fn zip_error(path: &Path, err: ZipError) -> RepositoryError {
    match err {
        ZipError::Io(e) => StorageError::io_at(path, "read archive", e).into(),
        other => RepositoryError::NotAnArchive(format!("{}: {}", path.display(), other)),
    }
}

/// Unpack every entry of `archive` under `target`, creating it if needed.
///
/// Entry names are resolved through the secure resolver; an entry that would
/// land outside `target` aborts the unpack.
pub fn unpack(archive: &Path, target: &Path) -> Result<(), RepositoryError> {
    let mut zip = open(archive)?;
    fs::create_dir_all(target).map_err(|e| StorageError::io_at(target, "create", e))?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| zip_error(archive, e))?;
        let destination = resolve_securely(target, entry.name())?;
        if entry.is_dir() {
            fs::create_dir_all(&destination).map_err(|e| StorageError::io_at(&destination, "create", e))?;
            continue;
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io_at(parent, "create", e))?;
        }
        let mut out = File::create(&destination).map_err(|e| StorageError::io_at(&destination, "create", e))?;
        io::copy(&mut entry, &mut out).map_err(|e| StorageError::io_at(&destination, "write", e))?;
    }

    debug!(archive = %archive.display(), entries = zip.len(), "Unpacked archive");
    Ok(())
}

/// Enumerate the entries of `archive` without extracting them.
///
/// Directories that only exist implicitly (as the parent of a file entry)
/// are reported too.
pub fn list(archive: &Path) -> Result<Vec<ArchiveEntry>, RepositoryError> {
    let mut zip = open(archive)?;
    let mut entries: Vec<ArchiveEntry> = Vec::with_capacity(zip.len());
    let mut directories = std::collections::BTreeSet::new();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| zip_error(archive, e))?;
        let name = entry.name().trim_end_matches('/').to_string();
        if name.is_empty() {
            continue;
        }
        let mut parent = name.as_str();
        while let Some(pos) = parent.rfind('/') {
            parent = &parent[..pos];
            directories.insert(parent.to_string());
        }
        if entry.is_dir() {
            directories.insert(name);
            continue;
        }
        let size = entry.size();
        let nested = is_archive_stream(&mut entry).map_err(|e| StorageError::io_at(archive, "read archive", e))?;
        entries.push(ArchiveEntry {
            name,
            is_directory: false,
            size,
            is_archive: nested,
        });
    }

    entries.extend(directories.into_iter().map(|name| ArchiveEntry {
        name,
        is_directory: true,
        size: 0,
        is_archive: false,
    }));
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Copy a single file entry of `archive` to `destination`.
///
/// Returns `Ok(false)` when no file entry with that name exists.
pub fn extract_entry(archive: &Path, name: &str, destination: &Path) -> Result<bool, RepositoryError> {
    let mut zip = open(archive)?;
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(false),
        Err(e) => return Err(zip_error(archive, e)),
    };
    if entry.is_dir() {
        return Ok(false);
    }
    let mut out = File::create(destination).map_err(|e| StorageError::io_at(destination, "create", e))?;
    io::copy(&mut entry, &mut out).map_err(|e| StorageError::io_at(destination, "write", e))?;
    Ok(true)
}

/// Whether `name` is a directory inside `archive`, explicit or implied.
pub fn has_directory(archive: &Path, name: &str) -> Result<bool, RepositoryError> {
    let prefix = format!("{}/", name.trim_end_matches('/'));
    let zip = open(archive)?;
    let found = zip.file_names().any(|entry| entry.starts_with(&prefix));
    Ok(found)
}
