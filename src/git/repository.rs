/*!
 * Read-only Git repository queries
 */

use std::collections::BTreeSet;
use std::path::Path;

use git2::{ErrorCode, Repository as Git2Repository};

use super::error::{GitError, GitResult};

/// File mode git uses for submodule entries in the index
const GITLINK_MODE: u32 = 0o160000;

/// Git repository rooted at a working directory
pub struct Repository {
    /// Inner git2 repository instance
    inner: Git2Repository,
}

impl Repository {
    /// Check if a repository exists at the given root
    pub fn exists(root: &Path) -> bool {
        root.join(".git").exists()
    }

    /// Open the repository whose metadata directory sits directly under `root`
    pub fn open(root: &Path) -> GitResult<Self> {
        if !Self::exists(root) {
            return Err(GitError::NotFound(root.display().to_string()));
        }
        let inner = Git2Repository::open(root).map_err(GitError::OpenError)?;
        Ok(Self { inner })
    }

    /// Current branch name, `HEAD` when detached, `None` before the first commit
    pub fn branch(&self) -> GitResult<Option<String>> {
        let head = match self.inner.head() {
            Ok(head) => head,
            Err(e) if is_unborn(&e) => return Ok(None),
            Err(e) => return Err(GitError::HeadError(e)),
        };

        if self.inner.head_detached().map_err(GitError::HeadError)? {
            return Ok(Some("HEAD".to_string()));
        }

        Ok(head.shorthand().map(str::to_string))
    }

    /// Full hex id of the commit HEAD points at
    pub fn commit(&self) -> GitResult<Option<String>> {
        let head = match self.inner.head() {
            Ok(head) => head,
            Err(e) if is_unborn(&e) => return Ok(None),
            Err(e) => return Err(GitError::HeadError(e)),
        };

        let commit = head.peel_to_commit().map_err(GitError::HeadError)?;
        Ok(Some(commit.id().to_string()))
    }

    /// Paths recorded in the index, relative to the root, deduplicated and sorted
    ///
    /// Submodule entries are skipped since they name directories, not files.
    pub fn tracked_files(&self) -> GitResult<Vec<String>> {
        let index = self.inner.index().map_err(GitError::IndexError)?;

        let paths: BTreeSet<String> = index
            .iter()
            .filter(|entry| entry.mode & 0o170000 != GITLINK_MODE)
            .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
            .collect();

        Ok(paths.into_iter().collect())
    }
}

fn is_unborn(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}
