/*!
 * Version-control helpers
 *
 * Every lookup here degrades to an empty answer with a warning; nothing in
 * this module can fail a run.
 */

mod error;
mod repository;

// Re-export public items
pub use error::{GitError, GitResult};
pub use repository::Repository;

use std::path::Path;

/// Whether `root` is the working directory of a Git repository
pub fn is_repo(root: &Path) -> bool {
    Repository::exists(root)
}

/// Resolve the current branch and commit of the repository at `root`
pub fn branch_and_commit(root: &Path) -> (Option<String>, Option<String>) {
    if !is_repo(root) {
        return (None, None);
    }

    let repo = match Repository::open(root) {
        Ok(repo) => repo,
        Err(e) => {
            log::warn!("Could not open repository at {}: {}", root.display(), e);
            return (None, None);
        }
    };

    let branch = repo.branch().unwrap_or_else(|e| {
        log::warn!("Could not resolve branch: {}", e);
        None
    });
    let commit = repo.commit().unwrap_or_else(|e| {
        log::warn!("Could not resolve commit: {}", e);
        None
    });

    (branch, commit)
}

/// List the files tracked by the repository at `root`, relative to `root`
pub fn tracked_files(root: &Path) -> Vec<String> {
    match Repository::open(root).and_then(|repo| repo.tracked_files()) {
        Ok(files) => files,
        Err(e) => {
            log::warn!("Could not list tracked files in {}: {}", root.display(), e);
            Vec::new()
        }
    }
}
