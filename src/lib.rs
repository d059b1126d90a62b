/*!
 * codeflat - Flatten a source tree into one structured artifact
 *
 * Selects files under a root (from the Git index or a filesystem walk),
 * filters them with include/exclude globs, and streams their metadata,
 * SHA-256 digests and content into a single XML or Markdown document.
 */

pub mod chunker;
pub mod classify;
pub mod config;
pub mod digest;
pub mod discover;
pub mod error;
pub mod flattener;
pub mod git;
pub mod matcher;
pub mod report;
pub mod types;
pub mod utils;
pub mod writer;


// Re-export main components for easier access
pub use config::{Args, Config, FileConfig};
pub use error::{FlattenError, Result};
pub use flattener::{Flattener, SelectedFile};
pub use matcher::{GlobEngine, PathMatcher};
pub use report::{ReportFormat, Reporter, RunReport};
pub use types::{Chunk, FileOutcome, FileRecord, RunMetadata};
pub use writer::{ArtifactWriter, MarkdownWriter, OutputFormat, XmlWriter};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
