use std::sync::Arc;

use raoa_store::{EntryMode, Tree};
use raoa_types::ObjectId;

/// A file in a snapshot: full path, mode and content hash.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileEntry {
    /// Slash-separated path from the repository root.
    pub path: String,
    pub mode: EntryMode,
    pub object_id: ObjectId,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, mode: EntryMode, object_id: ObjectId) -> Self {
        Self {
            path: path.into(),
            mode,
            object_id,
        }
    }

    /// Last path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// The commit a repository currently points to and its root tree.
///
/// An empty repository (no commit yet) has `commit == None` and an empty
/// root tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub commit: Option<ObjectId>,
    pub tree_id: ObjectId,
    pub tree: Arc<Tree>,
}

impl Snapshot {
    /// Returns `true` if the repository has no commits.
    pub fn is_empty_repository(&self) -> bool {
        self.commit.is_none()
    }
}

/// Check that `path` is a clean relative path usable as a tree entry.
pub fn validate_entry_path(path: &str) -> crate::RepoResult<()> {
    let invalid = |reason: &str| crate::RepoError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.is_empty() {
        return Err(invalid("path must not be empty"));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(invalid("path must be relative and name a file"));
    }
    if path.contains('\0') {
        return Err(invalid("path must not contain NUL"));
    }
    for component in path.split('/') {
        match component {
            "" => return Err(invalid("empty path component")),
            "." | ".." => return Err(invalid("relative path components are not allowed")),
            ".git" => return Err(invalid("'.git' is reserved")),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_component() {
        let entry = FileEntry::new("2023/raw/a.nef", EntryMode::Regular, ObjectId::null());
        assert_eq!(entry.file_name(), "a.nef");
        let flat = FileEntry::new("a.jpg", EntryMode::Regular, ObjectId::null());
        assert_eq!(flat.file_name(), "a.jpg");
    }

    #[test]
    fn entry_path_validation() {
        assert!(validate_entry_path("a.jpg").is_ok());
        assert!(validate_entry_path(".raoa.json").is_ok());
        assert!(validate_entry_path("raw/a.nef").is_ok());

        for bad in ["", "/a.jpg", "a/", "a//b", "../a", "a/./b", ".git/config"] {
            assert!(validate_entry_path(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
