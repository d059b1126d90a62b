/*!
 * Candidate file discovery
 *
 * Candidates come either from the Git index (manifest mode) or from a
 * recursive walk of the root (walk mode). Neither strategy orders its
 * output; ordering happens when the selection manifest is built.
 */

use std::path::PathBuf;

use walkdir::{DirEntry, WalkDir};

use crate::git;

/// Name of the version-control metadata directory
const VCS_DIR: &str = ".git";

/// Strategy used to produce candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DiscoveryMode {
    /// Tracked files reported by Git
    Manifest,
    /// Recursive filesystem traversal
    Walk,
}

/// Produces the candidate paths for a selection root
pub struct Discoverer {
    root: PathBuf,
    honor_vcs: bool,
    follow_symlinks: bool,
}

impl Discoverer {
    /// Create a discoverer for an absolute root
    pub fn new(root: impl Into<PathBuf>, honor_vcs: bool, follow_symlinks: bool) -> Self {
        Self {
            root: root.into(),
            honor_vcs,
            follow_symlinks,
        }
    }

    /// Strategy that `discover` will use
    pub fn mode(&self) -> DiscoveryMode {
        if self.honor_vcs && git::is_repo(&self.root) {
            DiscoveryMode::Manifest
        } else {
            DiscoveryMode::Walk
        }
    }

    /// Absolute candidate paths, in no particular order
    pub fn discover(&self) -> Vec<PathBuf> {
        let mode = self.mode();
        let candidates = match mode {
            DiscoveryMode::Manifest => self.tracked(),
            DiscoveryMode::Walk => self.walk(),
        };
        log::debug!(
            "Discovered {} candidates under {} ({} mode)",
            candidates.len(),
            self.root.display(),
            mode
        );
        candidates
    }

    fn tracked(&self) -> Vec<PathBuf> {
        git::tracked_files(&self.root)
            .into_iter()
            .map(|relative| self.root.join(relative))
            .collect()
    }

    fn walk(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| !is_vcs_dir(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::debug!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(DirEntry::into_path)
            .collect()
    }
}

fn is_vcs_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == VCS_DIR
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use crate::utils::to_posix;

    fn relative_set(root: &Path, paths: Vec<PathBuf>) -> BTreeSet<String> {
        paths
            .iter()
            .map(|p| to_posix(p.strip_prefix(root).unwrap()))
            .collect()
    }

    #[test]
    fn test_walk_skips_git_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join(".git/config"), "[core]").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("README.md"), "# x").unwrap();

        let discoverer = Discoverer::new(dir.path(), false, false);
        assert_eq!(discoverer.mode(), DiscoveryMode::Walk);

        let found = relative_set(dir.path(), discoverer.discover());
        let expected: BTreeSet<String> = ["README.md", "src/main.rs"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_fake_git_dir_without_repo_falls_back_to_nothing() {
        // A `.git` directory makes the root look like a repository; an
        // unreadable index degrades to an empty candidate list.
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let discoverer = Discoverer::new(dir.path(), true, false);
        assert_eq!(discoverer.mode(), DiscoveryMode::Manifest);
        assert!(discoverer.discover().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_only_followed_when_enabled() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("target.txt"), "t").unwrap();
        fs::create_dir(outside.path().join("linked_dir")).unwrap();
        fs::write(outside.path().join("linked_dir/inner.txt"), "i").unwrap();

        fs::write(dir.path().join("plain.txt"), "p").unwrap();
        symlink(outside.path().join("target.txt"), dir.path().join("file_link.txt")).unwrap();
        symlink(outside.path().join("linked_dir"), dir.path().join("dir_link")).unwrap();
        symlink(dir.path().join("missing.txt"), dir.path().join("broken.txt")).unwrap();

        let plain = relative_set(dir.path(), Discoverer::new(dir.path(), false, false).discover());
        assert_eq!(plain.into_iter().collect::<Vec<_>>(), vec!["plain.txt"]);

        let followed =
            relative_set(dir.path(), Discoverer::new(dir.path(), false, true).discover());
        assert_eq!(
            followed.into_iter().collect::<Vec<_>>(),
            vec!["dir_link/inner.txt", "file_link.txt", "plain.txt"]
        );
    }

    #[test]
    fn test_manifest_mode_ignores_untracked() {
        let dir = tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("tracked.txt"), "t").unwrap();
        fs::write(dir.path().join("untracked.txt"), "u").unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new("tracked.txt")).unwrap();
        index.write().unwrap();

        let manifest = Discoverer::new(dir.path(), true, false);
        assert_eq!(manifest.mode(), DiscoveryMode::Manifest);
        assert_eq!(manifest.discover(), vec![dir.path().join("tracked.txt")]);

        let walked = relative_set(dir.path(), Discoverer::new(dir.path(), false, false).discover());
        assert!(walked.contains("untracked.txt"));
    }
}
