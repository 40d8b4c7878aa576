//! Configuration System
//!
//! Layered configuration built on the `config` crate. Sources, lowest
//! precedence first:
//!
//! 1. serde defaults
//! 2. global file `$XDG_CONFIG_HOME/artifact-store/config.toml`
//! 3. an explicit file passed by the caller
//! 4. environment variables `ARTIFACT_STORE__<SECTION>__<KEY>`

use crate::logging::LoggingConfig;
use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod sources {
    pub mod global_file;
}

pub use sources::global_file::global_config_path;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "ARTIFACT_STORE";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactStoreConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Repository settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Root of the sharded content layout
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,

    /// Working copies and uploads are assembled here
    #[serde(default = "default_scratch_root")]
    pub scratch_root: PathBuf,

    /// Longest wait for a per-digest lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// How long content must stay unreferenced before a sweep deletes it
    #[serde(default = "default_obsolescence_timeout_secs")]
    pub obsolescence_timeout_secs: u64,

    /// Period of the background sweep; 0 disables it
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default)]
    pub read_only: bool,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "artifact-store")
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".artifact-store"))
}

fn default_store_root() -> PathBuf {
    default_data_dir().join("content")
}

fn default_scratch_root() -> PathBuf {
    default_data_dir().join("tmp")
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_obsolescence_timeout_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            store_root: default_store_root(),
            scratch_root: default_scratch_root(),
            lock_timeout_ms: default_lock_timeout_ms(),
            obsolescence_timeout_secs: default_obsolescence_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            read_only: false,
        }
    }
}

impl RepositoryConfig {
    /// Store under `root/content`, scratch under `root/tmp`.
    pub fn under(root: &Path) -> Self {
        Self {
            store_root: root.join("content"),
            scratch_root: root.join("tmp"),
            ..Self::default()
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn obsolescence_timeout(&self) -> Duration {
        Duration::from_secs(self.obsolescence_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.store_root.as_os_str().is_empty() {
            errors.push(ValidationError::Repository("store_root cannot be empty".to_string()));
        }
        if self.scratch_root.as_os_str().is_empty() {
            errors.push(ValidationError::Repository("scratch_root cannot be empty".to_string()));
        }
        if !self.store_root.as_os_str().is_empty() && self.store_root == self.scratch_root {
            errors.push(ValidationError::Repository(
                "scratch_root must differ from store_root".to_string(),
            ));
        }
        // A mark set just after one sweep must survive the next one.
        if self.sweep_interval_secs > 0
            && self.obsolescence_timeout_secs < self.sweep_interval_secs.saturating_mul(2)
        {
            errors.push(ValidationError::Repository(format!(
                "obsolescence_timeout_secs ({}) must be at least twice sweep_interval_secs ({})",
                self.obsolescence_timeout_secs, self.sweep_interval_secs
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Repository(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Repository(msg) => write!(f, "Repository: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ArtifactStoreConfig {
    /// Validate every section, collecting all problems.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = match self.repository.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };
        if let Err(msg) = self.logging.validate() {
            errors.push(ValidationError::Logging(msg));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads [`ArtifactStoreConfig`] from the layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, global file, environment.
    pub fn load() -> Result<ArtifactStoreConfig, ConfigError> {
        Self::build(None)
    }

    /// Defaults, global file, `path`, environment. `path` must exist.
    pub fn load_from_file(path: &Path) -> Result<ArtifactStoreConfig, ConfigError> {
        Self::build(Some(path))
    }

    fn build(explicit: Option<&Path>) -> Result<ArtifactStoreConfig, ConfigError> {
        let mut builder = Config::builder();
        builder = sources::global_file::add_to_builder(builder)?;
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }
}
