//! Secure resolution of caller-supplied relative paths

use crate::error::StorageError;
use std::path::{Component, Path, PathBuf};

/// Resolve `relative` against `root`, refusing anything that lands outside it.
///
/// The path is normalized lexically (`.` dropped, `..` pops a segment), so
/// `a/b/../c` resolves to `root/a/c` while `../x` or an absolute path fail.
/// The deepest existing ancestor of the result is then canonicalized and
/// checked again, which catches symlinks pointing out of the tree even when
/// the final entry does not exist yet.
pub fn resolve_securely(root: &Path, relative: &str) -> Result<PathBuf, StorageError> {
    let escape = || StorageError::PathEscape {
        root: root.to_path_buf(),
        path: relative.to_string(),
    };

    let mut segments: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => segments.push(name),
            Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(escape());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    let mut resolved = root.to_path_buf();
    for segment in segments {
        resolved.push(segment);
    }

    if !root.exists() {
        return Ok(resolved);
    }
    let canonical_root = dunce::canonicalize(root).map_err(|e| StorageError::io_at(root, "canonicalize", e))?;
    let existing = resolved
        .ancestors()
        .take_while(|p| p.starts_with(root))
        .find_map(|p| dunce::canonicalize(p).ok());
    if let Some(canonical) = existing {
        if !canonical.starts_with(&canonical_root) {
            return Err(escape());
        }
    }

    Ok(resolved)
}

/// Split a relative path into its normalized segments.
///
/// Used to walk into nested archives segment by segment. Fails on the same
/// inputs as [`resolve_securely`].
pub fn segments(relative: &str) -> Result<Vec<String>, StorageError> {
    let mut out: Vec<String> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => out.push(name.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                if out.pop().is_none() {
                    return Err(StorageError::PathEscape {
                        root: PathBuf::new(),
                        path: relative.to_string(),
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::PathEscape {
                    root: PathBuf::new(),
                    path: relative.to_string(),
                })
            }
        }
    }
    Ok(out)
}

/// Render a path relative to `root` with `/` separators.
pub fn relative_string(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
