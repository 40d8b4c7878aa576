//! Shared helpers for integration tests

use artifact_store::{ContentRepository, RepositoryConfig};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use zip::write::FileOptions;

/// Repository rooted in a fresh temporary directory.
pub struct TestRepository {
    pub temp_dir: TempDir,
    pub repository: ContentRepository,
}

impl TestRepository {
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_millis(500), Duration::from_secs(60))
    }

    pub fn with_timeouts(lock_timeout: Duration, obsolescence_timeout: Duration) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = RepositoryConfig {
            lock_timeout_ms: lock_timeout.as_millis() as u64,
            obsolescence_timeout_secs: obsolescence_timeout.as_secs(),
            sweep_interval_secs: 0,
            ..RepositoryConfig::under(temp_dir.path())
        };
        let repository = ContentRepository::new(&config).unwrap();
        Self { temp_dir, repository }
    }
}

/// Zip the given `(name, bytes)` entries into memory.
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        for (name, bytes) in files {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    File::create(path).unwrap().write_all(&zip_bytes(files)).unwrap();
}
