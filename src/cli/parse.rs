//! CLI parse: clap types for artifact-store. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Content-addressable store for deployment artifacts
#[derive(Parser, Debug)]
#[command(name = "artifact-store")]
#[command(about = "Content-addressable storage for deployment archives and exploded trees")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Store root; scratch space goes to a sibling `tmp` directory
    #[arg(long)]
    pub store_root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a file and print its digest
    Add {
        /// File to store
        file: PathBuf,
    },
    /// Check whether a digest (or legacy path) is stored
    Has {
        /// Hex digest or legacy path
        id: String,
    },
    /// Print the digest of a file or directory without storing it
    Hash {
        path: PathBuf,
    },
    /// Explode an archive, or an archive inside an exploded tree
    Explode {
        hash: String,
        /// Relative path of a nested archive to explode in place
        #[arg(long)]
        path: Option<String>,
    },
    /// Add files to an exploded tree, printing the new digest
    AddFiles {
        hash: String,
        /// Entries as `relative/path=local/source`
        entries: Vec<String>,
        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,
        /// Directory to create (repeatable)
        #[arg(long = "dir")]
        dirs: Vec<String>,
    },
    /// Remove paths from an exploded tree, printing the new digest
    RemoveFiles {
        hash: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// List stored content
    Ls {
        hash: String,
        /// Directory or archive to list, relative to the content root
        #[arg(long, default_value = "")]
        path: String,
        /// Maximum depth below the listed path
        #[arg(long)]
        depth: Option<usize>,
        /// Only report archive files
        #[arg(long)]
        archives_only: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print one stored file, looking inside nested archives if needed
    Cat {
        hash: String,
        path: String,
    },
    /// Print the effective configuration
    Config,
}
