//! CLI route: run context and the single dispatch table.

use crate::cli::output::{format_entries_json, format_entries_text};
use crate::cli::parse::Commands;
use crate::config::{ArtifactStoreConfig, ConfigLoader};
use crate::error::{RepositoryError, StorageError};
use crate::exploded::ExplodedContent;
use crate::repository::ContentRepository;
use crate::tree::filter::DepthArchiveFilter;
use crate::tree::hasher;
use crate::types::{ContentHash, ContentId};
use owo_colors::OwoColorize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Runtime context for CLI execution: effective configuration and repository.
pub struct RunContext {
    config: ArtifactStoreConfig,
    repository: ContentRepository,
}

impl RunContext {
    /// Load configuration, apply a `--store-root` override, open the repository.
    pub fn new(config_path: Option<&Path>, store_root: Option<PathBuf>) -> Result<Self, RepositoryError> {
        let mut config = match config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        if let Some(root) = store_root {
            config.repository.scratch_root = root.with_file_name("tmp");
            config.repository.store_root = root;
        }
        Self::from_config(config)
    }

    pub fn from_config(config: ArtifactStoreConfig) -> Result<Self, RepositoryError> {
        let repository = ContentRepository::new(&config.repository)?;
        Ok(Self { config, repository })
    }

    pub fn repository(&self) -> &ContentRepository {
        &self.repository
    }

    pub fn execute(&self, command: &Commands) -> Result<String, RepositoryError> {
        debug!(?command, "Executing command");
        match command {
            Commands::Add { file } => {
                let reader = File::open(file).map_err(|e| StorageError::io_at(file, "open", e))?;
                Ok(self.repository.add_content(reader)?.to_hex())
            }
            Commands::Has { id } => {
                let present = self.repository.has_content(&ContentId::parse(id));
                Ok(if present {
                    format!("{} {}", id, "present".green())
                } else {
                    format!("{} {}", id, "absent".yellow())
                })
            }
            Commands::Hash { path } => {
                let hash = if path.is_dir() {
                    hasher::digest_path(path)?
                } else {
                    let reader = File::open(path).map_err(|e| StorageError::io_at(path, "open", e))?;
                    hasher::digest_reader(reader).map_err(|e| StorageError::io_at(path, "hash", e))?
                };
                Ok(hash.to_hex())
            }
            Commands::Explode { hash, path } => {
                let hash = parse_hash(hash)?;
                let exploded = match path {
                    Some(path) => self.repository.explode_sub_content(&hash, path)?,
                    None => self.repository.explode_content(&hash)?,
                };
                Ok(exploded.to_hex())
            }
            Commands::AddFiles {
                hash,
                entries,
                overwrite,
                dirs,
            } => {
                let hash = parse_hash(hash)?;
                let mut files = Vec::with_capacity(entries.len() + dirs.len());
                for dir in dirs {
                    files.push(ExplodedContent::directory(dir.as_str()));
                }
                for entry in entries {
                    let (relative, source) = parse_entry(entry)?;
                    let reader = File::open(&source).map_err(|e| StorageError::io_at(&source, "open", e))?;
                    files.push(ExplodedContent::file(relative, reader));
                }
                Ok(self.repository.add_content_to_exploded(&hash, files, *overwrite)?.to_hex())
            }
            Commands::RemoveFiles { hash, paths } => {
                let hash = parse_hash(hash)?;
                Ok(self.repository.remove_content_from_exploded(&hash, paths)?.to_hex())
            }
            Commands::Ls {
                hash,
                path,
                depth,
                archives_only,
                format,
            } => {
                let hash = parse_hash(hash)?;
                let filter = DepthArchiveFilter::new(*depth, *archives_only);
                let entries = self.repository.list_content(&hash, path, &filter)?;
                match format.as_str() {
                    "json" => format_entries_json(&entries),
                    "text" => Ok(format_entries_text(&entries)),
                    other => Err(RepositoryError::ConfigError(format!(
                        "Invalid format: {} (must be 'text' or 'json')",
                        other
                    ))),
                }
            }
            Commands::Cat { hash, path } => {
                let hash = parse_hash(hash)?;
                let mut stream = self.repository.read_content(&hash, path)?;
                let mut bytes = Vec::with_capacity(stream.size() as usize);
                stream.read_to_end(&mut bytes)?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Commands::Config => toml::to_string_pretty(&self.config)
                .map_err(|e| RepositoryError::ConfigError(format!("Failed to render configuration: {}", e))),
        }
    }
}

fn parse_hash(value: &str) -> Result<ContentHash, RepositoryError> {
    Ok(value.parse::<ContentHash>()?)
}

/// Split `relative=source`.
fn parse_entry(entry: &str) -> Result<(String, PathBuf), RepositoryError> {
    match entry.split_once('=') {
        Some((relative, source)) if !relative.is_empty() && !source.is_empty() => {
            Ok((relative.to_string(), PathBuf::from(source)))
        }
        _ => Err(RepositoryError::StorageError(StorageError::InvalidPath(format!(
            "expected relative=source, got {}",
            entry
        )))),
    }
}
