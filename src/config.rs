/*!
 * Configuration handling for codeflat
 *
 * Settings come from three layers: command-line flags win over the optional
 * JSON config file, which wins over built-in defaults.
 */

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use clap_complete::Shell;
use serde::Deserialize;

use crate::ensure;
use crate::error::Result;
use crate::matcher::GlobEngine;
use crate::writer::OutputFormat;

/// Default inline size limit in bytes
pub const DEFAULT_MAX_FILE_BYTES: u64 = 200_000;

/// Default chunk size
pub const DEFAULT_CHUNK_BYTES: u64 = 50_000;

/// Environment variable that pins the generation timestamp
pub const SOURCE_DATE_EPOCH: &str = "SOURCE_DATE_EPOCH";

/// Command-line arguments for codeflat
#[derive(Parser, Debug, Clone, Default)]
#[clap(
    name = "codeflat",
    version = env!("CARGO_PKG_VERSION"),
    about = "Flatten a source tree into a single XML or Markdown artifact",
    long_about = "Selects files under a root directory (from the Git index or a filesystem walk), \
                  filters them with include/exclude globs, and writes their metadata, digests and \
                  content into one deterministic XML or Markdown document."
)]
pub struct Args {
    /// Root directory to flatten
    #[clap(long)]
    pub root: Option<String>,

    /// Output artifact path
    #[clap(long)]
    pub out: Option<String>,

    /// Comma-separated globs to include (relative to root)
    #[clap(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Comma-separated globs to exclude
    #[clap(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Largest file inlined in full; larger text files are always chunked
    #[clap(long)]
    pub max_file_bytes: Option<u64>,

    /// Chunk size for large text files
    #[clap(long)]
    pub chunk_bytes: Option<u64>,

    /// Follow symbolic links while walking
    #[clap(long)]
    pub follow_symlinks: bool,

    /// Walk the filesystem even inside a Git repository
    #[clap(long)]
    pub no_honor_gitignore: bool,

    /// Output format
    #[clap(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Optional JSON config file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Glob engine used to compile patterns
    #[clap(long, value_enum)]
    pub glob_engine: Option<GlobEngine>,

    /// Suppress the summary report
    #[clap(long, short)]
    pub quiet: bool,

    /// Generate shell completions
    #[clap(long = "generate", value_enum)]
    pub generate: Option<Shell>,
}

/// Settings read from a JSON config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub root: Option<String>,
    pub out: Option<String>,
    pub includes: Option<Vec<String>>,
    pub excludes: Option<Vec<String>>,
    pub max_file_bytes: Option<u64>,
    pub chunk_bytes: Option<u64>,
    pub follow_symlinks: Option<bool>,
    pub honor_gitignore: Option<bool>,
    pub format: Option<String>,
    pub glob_engine: Option<GlobEngine>,
}

impl FileConfig {
    /// Parse a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load a config file, falling back to empty settings with a warning
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            log::warn!("Ignoring config file {}: {}", path.display(), e);
            Self::default()
        })
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory to flatten
    pub root: PathBuf,

    /// Output artifact path
    pub output_file: PathBuf,

    /// Patterns to include (if empty, include all)
    pub includes: Vec<String>,

    /// Patterns to exclude
    pub excludes: Vec<String>,

    /// Largest file emitted inline
    pub max_file_bytes: u64,

    /// Chunk size for large text files; 0 disables chunking of small files
    pub chunk_bytes: u64,

    /// Whether to follow symlinks while walking
    pub follow_symlinks: bool,

    /// Whether to take candidates from the Git index when available
    pub honor_gitignore: bool,

    /// Output format
    pub format: OutputFormat,

    /// Glob engine used to compile patterns
    pub glob_engine: GlobEngine,

    /// Fixed generation timestamp; the current time when unset
    pub generated_at: Option<DateTime<Utc>>,
}

impl Config {
    /// Configuration with defaults for everything but the paths
    pub fn new(root: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_file: output_file.into(),
            includes: Vec::new(),
            excludes: Vec::new(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            follow_symlinks: false,
            honor_gitignore: true,
            format: OutputFormat::default(),
            glob_engine: GlobEngine::default(),
            generated_at: None,
        }
    }

    /// Create configuration from command-line arguments and the config file they name
    pub fn from_args(args: Args) -> Self {
        let file = args
            .config
            .as_deref()
            .map(FileConfig::load_or_default)
            .unwrap_or_default();
        Self::merge(args, file)
    }

    /// Layer command-line arguments over file settings and defaults
    pub fn merge(args: Args, file: FileConfig) -> Self {
        let format = args
            .format
            .or_else(|| {
                file.format.as_deref().and_then(|raw| {
                    raw.parse::<OutputFormat>()
                        .map_err(|_| log::warn!("Unknown format '{}' in config, using xml", raw))
                        .ok()
                })
            })
            .unwrap_or_default();

        let root = args.root.or(file.root).unwrap_or_else(|| ".".to_string());
        let output_file = args
            .out
            .or(file.out)
            .unwrap_or_else(|| format!("codebase.{}", format.extension()));

        let pick = |cli: Vec<String>, file: Option<Vec<String>>| {
            if cli.is_empty() {
                file.unwrap_or_default()
            } else {
                cli
            }
        };

        Self {
            root: PathBuf::from(root),
            output_file: PathBuf::from(output_file),
            includes: normalize_patterns(pick(args.include, file.includes)),
            excludes: normalize_patterns(pick(args.exclude, file.excludes)),
            max_file_bytes: args
                .max_file_bytes
                .or(file.max_file_bytes)
                .unwrap_or(DEFAULT_MAX_FILE_BYTES),
            chunk_bytes: args
                .chunk_bytes
                .or(file.chunk_bytes)
                .unwrap_or(DEFAULT_CHUNK_BYTES),
            follow_symlinks: args.follow_symlinks || file.follow_symlinks.unwrap_or(false),
            honor_gitignore: !args.no_honor_gitignore && file.honor_gitignore.unwrap_or(true),
            format,
            glob_engine: args.glob_engine.or(file.glob_engine).unwrap_or_default(),
            generated_at: source_date_epoch(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.root.is_dir(),
            PathNotFound,
            "root directory not found: {}",
            self.root.display()
        );
        ensure!(
            !self.output_file.as_os_str().is_empty(),
            Config,
            "output path must not be empty"
        );
        Ok(())
    }
}

/// Trim patterns and drop empty entries
fn normalize_patterns(patterns: Vec<String>) -> Vec<String> {
    patterns
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Timestamp pinned through `SOURCE_DATE_EPOCH`, if set and valid
fn source_date_epoch() -> Option<DateTime<Utc>> {
    let raw = std::env::var(SOURCE_DATE_EPOCH).ok()?;
    match raw.trim().parse::<i64>() {
        Ok(secs) => Utc.timestamp_opt(secs, 0).single(),
        Err(_) => {
            log::warn!("Ignoring invalid {}='{}'", SOURCE_DATE_EPOCH, raw);
            None
        }
    }
}
