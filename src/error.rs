//! Global error handling for codeflat
//!
//! This module provides a centralized error type that can represent errors
//! from all modules in the project.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Global error type for codeflat operations
#[derive(Error, Debug)]
pub enum FlattenError {
    /// File system errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A selected file could not be read
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The output location could not be created or written
    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Glob pattern compilation errors
    #[error("Glob error: {0}")]
    Glob(String),

    /// JSON processing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writer errors, including calls made out of order
    #[error("Writer error: {0}")]
    Writer(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl FlattenError {
    /// Short name of the error kind, used when annotating failed files
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) | Self::FileRead { .. } => "IoError",
            Self::Output { .. } => "OutputError",
            Self::Config(_) => "ConfigError",
            Self::Glob(_) => "GlobError",
            Self::Json(_) => "JsonError",
            Self::Writer(_) => "WriterError",
            Self::PathNotFound(_) => "NotFound",
            Self::InvalidArgument(_) => "InvalidArgument",
        }
    }

    /// Message rendered into the artifact for a failed file
    pub fn annotation(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

/// Specialized Result type for codeflat operations
pub type Result<T> = std::result::Result<T, FlattenError>;

/// Creates a FlattenError with a formatted message
#[macro_export]
macro_rules! error {
    ($error_type:ident, $($arg:tt)*) => {
        $crate::error::FlattenError::$error_type(format!($($arg)*))
    };
}

/// Returns an error result with a formatted message
#[macro_export]
macro_rules! bail {
    ($error_type:ident, $($arg:tt)*) => {
        return Err($crate::error!($error_type, $($arg)*))
    };
}

/// Ensures a condition is true, otherwise returns an error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $error_type:ident, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($error_type, $($arg)*)
        }
    };
}

/// Extension trait for attaching a path to IO errors
pub trait IoResultExt<T> {
    /// Tag a read failure with the file it happened on
    fn for_file(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Tag a write failure with the output location
    fn for_output(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn for_file(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| FlattenError::FileRead {
            path: path.into(),
            source,
        })
    }

    fn for_output(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| FlattenError::Output {
            path: path.into(),
            source,
        })
    }
}

// Allow converting FlattenError to io::Error so the binary can return io::Result
impl From<FlattenError> for io::Error {
    fn from(err: FlattenError) -> Self {
        match err {
            FlattenError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}
