//! Listing filters
//!
//! A [`ContentFilter`] decides which entries a listing reports. Filters only
//! see the entry's relative path, its depth and kind, plus a lazy probe that
//! answers whether a file entry is itself an archive.

use crate::archive;
use std::io;
use std::path::Path;

/// Kind of a listed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// How to find out whether a file entry is an archive.
pub enum ArchiveProbe<'a> {
    /// Already known (archive entries are probed while enumerating).
    Known(bool),
    /// A file on disk, probed only when a filter asks.
    File(&'a Path),
}

/// Entry offered to a filter
pub struct Candidate<'a> {
    /// Path relative to the listing root, `/`-separated, no trailing slash
    pub path: &'a str,
    /// Number of path segments (`a` is 1, `a/b` is 2)
    pub depth: usize,
    pub kind: EntryKind,
    probe: ArchiveProbe<'a>,
}

impl<'a> Candidate<'a> {
    pub fn new(path: &'a str, kind: EntryKind, probe: ArchiveProbe<'a>) -> Self {
        let depth = path.split('/').filter(|s| !s.is_empty()).count();
        Self {
            path,
            depth,
            kind,
            probe,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Whether the entry is an archive. Directories never are.
    pub fn is_archive(&self) -> io::Result<bool> {
        if self.is_directory() {
            return Ok(false);
        }
        match &self.probe {
            ArchiveProbe::Known(known) => Ok(*known),
            ArchiveProbe::File(path) => archive::is_archive(path),
        }
    }
}

/// Predicate applied to each candidate of a listing.
pub trait ContentFilter: Send + Sync {
    fn accept(&self, candidate: &Candidate<'_>) -> io::Result<bool>;

    /// Deepest level worth descending into, if bounded.
    fn max_depth(&self) -> Option<usize> {
        None
    }
}

/// Accepts every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ContentFilter for AcceptAll {
    fn accept(&self, _candidate: &Candidate<'_>) -> io::Result<bool> {
        Ok(true)
    }
}

/// Depth limit combined with an optional archives-only restriction.
///
/// Archives-only reports archive files and nothing else; directories are
/// still traversed so nested archives are found.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthArchiveFilter {
    depth: Option<usize>,
    archives_only: bool,
}

impl DepthArchiveFilter {
    pub fn new(depth: Option<usize>, archives_only: bool) -> Self {
        Self {
            depth,
            archives_only,
        }
    }

    pub fn archives_only() -> Self {
        Self::new(None, true)
    }

    pub fn with_depth(depth: usize) -> Self {
        Self::new(Some(depth), false)
    }
}

impl ContentFilter for DepthArchiveFilter {
    fn accept(&self, candidate: &Candidate<'_>) -> io::Result<bool> {
        if let Some(depth) = self.depth {
            if candidate.depth > depth {
                return Ok(false);
            }
        }
        if self.archives_only {
            return candidate.is_archive();
        }
        Ok(true)
    }

    fn max_depth(&self) -> Option<usize> {
        self.depth
    }
}
