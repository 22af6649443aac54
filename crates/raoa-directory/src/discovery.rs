use std::path::{Path, PathBuf};

use raoa_repo::{BARE_SUFFIX, GIT_DIR_NAME};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A repository found under the storage root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredRepository {
    /// Boundary directory: the bare git directory or the working tree.
    pub path: PathBuf,
    /// `path` relative to the storage root.
    pub relative_path: PathBuf,
}

/// A directory is a repository boundary if its name ends in `.git` or it
/// directly contains a `.git` directory.
pub fn is_repository_boundary(path: &Path) -> bool {
    let bare = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(BARE_SUFFIX) && name != GIT_DIR_NAME);
    bare || path.join(GIT_DIR_NAME).is_dir()
}

/// Find every repository under `root`, in path order.
///
/// The walk does not descend into a boundary. Unreadable directories are
/// skipped with a warning.
pub fn discover(root: &Path) -> Vec<DiscoveredRepository> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();
    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "skipping unreadable path");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if is_repository_boundary(entry.path()) {
            let relative_path = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            found.push(DiscoveredRepository {
                path: entry.path().to_path_buf(),
                relative_path,
            });
            walker.skip_current_dir();
        }
    }
    debug!(root = %root.display(), repositories = found.len(), "discovery finished");
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use raoa_repo::Repository;

    #[test]
    fn finds_bare_and_worktree_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        Repository::init_bare(&root.join("2023/holiday.git")).unwrap();
        Repository::init(&root.join("2023/party")).unwrap();
        Repository::init_bare(&root.join("2024/x/y/deep.git")).unwrap();
        std::fs::create_dir_all(root.join("empty/dir")).unwrap();
        std::fs::write(root.join("stray.git"), b"not a dir").unwrap();

        let found: Vec<PathBuf> = discover(root)
            .into_iter()
            .map(|r| r.relative_path)
            .collect();
        assert_eq!(
            found,
            vec![
                PathBuf::from("2023/holiday.git"),
                PathBuf::from("2023/party"),
                PathBuf::from("2024/x/y/deep.git"),
            ]
        );
    }

    #[test]
    fn does_not_descend_into_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        Repository::init(&root.join("outer")).unwrap();
        Repository::init_bare(&root.join("outer/inner.git")).unwrap();

        let found = discover(root);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relative_path, PathBuf::from("outer"));
        assert_eq!(found[0].path, root.join("outer"));
    }

    #[test]
    fn missing_root_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn boundary_detection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a.git")).unwrap();
        std::fs::create_dir_all(dir.path().join("b/.git")).unwrap();
        std::fs::create_dir_all(dir.path().join("c")).unwrap();
        assert!(is_repository_boundary(&dir.path().join("a.git")));
        assert!(is_repository_boundary(&dir.path().join("b")));
        assert!(!is_repository_boundary(&dir.path().join("b/.git")));
        assert!(!is_repository_boundary(&dir.path().join("c")));
    }
}
