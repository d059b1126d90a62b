/*!
 * Core types and data structures for codeflat
 */

use chrono::{DateTime, SecondsFormat, Utc};

/// Encoding label for entries decoded as text
pub const TEXT_ENCODING: &str = "utf-8";

/// Encoding label for entries classified as binary
pub const BINARY_ENCODING: &str = "binary";

/// Metadata describing one selected file
///
/// Built once per file before its header is emitted and never changed
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Relative path from the selection root, always `/`-separated
    pub path: String,
    /// Language tag inferred from the extension
    pub lang: String,
    /// Size in bytes at stat time
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the content, empty if hashing failed
    pub sha256: String,
    /// Whether the content was classified as binary
    pub is_binary: bool,
    /// Encoding label (`utf-8` or `binary`)
    pub encoding: String,
}

impl FileRecord {
    /// Record for a file that failed before its digest could be computed
    pub fn unreadable(path: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            lang: lang.into(),
            size_bytes: 0,
            sha256: String::new(),
            is_binary: false,
            encoding: TEXT_ENCODING.to_string(),
        }
    }
}

/// A contiguous slice of a file's decoded text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Zero-based position of the chunk within its file
    pub index: usize,
    /// Offset of the first character, counted in Unicode scalar values
    pub offset: usize,
    /// The chunk text
    pub text: &'a str,
}

/// Document-level metadata emitted before the first file entry
#[derive(Debug, Clone)]
pub struct RunMetadata {
    /// Absolute selection root
    pub root: String,
    /// Generation timestamp
    pub generated_at: DateTime<Utc>,
    /// Current branch, if the root is a repository
    pub branch: Option<String>,
    /// Current commit, if the root is a repository
    pub commit: Option<String>,
    /// Include patterns as configured
    pub includes: Vec<String>,
    /// Exclude patterns as configured
    pub excludes: Vec<String>,
    /// Inline size limit
    pub max_file_bytes: u64,
    /// Chunk size
    pub chunk_bytes: u64,
}

impl RunMetadata {
    /// Timestamp rendered as RFC 3339 with millisecond precision
    pub fn generated_at_string(&self) -> String {
        self.generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// How a file's body ended up in the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Text emitted as a single block
    Inline,
    /// Text emitted as ordered chunks
    Chunked(usize),
    /// Binary content emitted as base64
    Binary,
    /// Binary content over the inline limit; header only
    Omitted,
    /// Processing failed; an error annotation was emitted
    Failed,
}
