//! Filesystem helpers shared by the store and the exploded-content operations

use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Copy a file, or a directory tree, from `source` to `destination`.
pub fn copy_recursively(source: &Path, destination: &Path) -> io::Result<()> {
    let metadata = fs::metadata(source)?;
    if metadata.is_file() {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, destination)?;
        return Ok(());
    }

    fs::create_dir_all(destination)?;
    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = destination.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else if let Ok(resolved) = fs::metadata(entry.path()) {
            // Symlinks are materialized as what they point at.
            if resolved.is_file() {
                fs::copy(entry.path(), &target)?;
            } else if resolved.is_dir() {
                copy_recursively(&fs::canonicalize(entry.path())?, &target)?;
            }
        }
    }
    Ok(())
}

/// Remove a file or directory tree. A missing path is not an error.
pub fn remove_recursively(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Remove empty directories from `path`'s parent upwards, stopping before `stop`.
pub fn remove_empty_ancestors(path: &Path, stop: &Path) -> io::Result<()> {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        match fs::read_dir(dir) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                current = dir.parent();
                continue;
            }
            Err(e) => return Err(e),
        }
        fs::remove_dir(dir)?;
        current = dir.parent();
    }
    Ok(())
}
