/*!
 * Error types for Git operations
 */

use thiserror::Error;

/// Errors that can occur during Git operations
#[derive(Error, Debug)]
pub enum GitError {
    /// Error opening a Git repository
    #[error("Failed to open repository: {0}")]
    OpenError(git2::Error),

    /// Error reading the index (tracked-file list)
    #[error("Failed to read index: {0}")]
    IndexError(git2::Error),

    /// Error resolving HEAD
    #[error("Failed to resolve HEAD: {0}")]
    HeadError(git2::Error),

    /// Repository not found
    #[error("Repository not found: {0}")]
    NotFound(String),
}

/// Specialized Result type for Git operations
pub type GitResult<T> = Result<T, GitError>;
