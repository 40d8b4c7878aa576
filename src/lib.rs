//! Artifact Store: content-addressable storage for deployment artifacts
//!
//! Archives and exploded directory trees are stored under a BLAKE3 digest of
//! their content, deduplicated, kept alive by named references and reclaimed
//! by a two-phase mark/sweep once nothing references them. Exploded trees can
//! be mutated; every mutation publishes a new digest and leaves the original
//! untouched.

pub mod archive;
pub mod cli;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod exploded;
pub mod logging;
pub mod references;
pub mod repository;
pub mod store;
pub mod sweep;
pub mod tree;
pub mod types;

pub use config::{ArtifactStoreConfig, ConfigLoader, RepositoryConfig};
pub use error::{RepositoryError, StorageError};
pub use exploded::{ContentEntry, ContentStream, ExplodedContent};
pub use repository::ContentRepository;
pub use sweep::{SweepReport, SweepScheduler};
pub use tree::filter::{AcceptAll, ContentFilter, DepthArchiveFilter};
pub use types::{ContentHash, ContentId, ContentReference};
