use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::error::{RepoError, RepoResult};
use crate::repository::Repository;
use crate::snapshot::{validate_entry_path, FileEntry};

/// Post-commit step that brings a working tree in line with a landed tree.
pub trait CheckoutStrategy: Send + Sync {
    /// Called after the ref moved to the commit of `tree`. `superseded` holds
    /// the paths the batch replaced or removed.
    fn apply(
        &self,
        repo: &Repository,
        tree: &BTreeMap<String, FileEntry>,
        superseded: &HashSet<String>,
    ) -> RepoResult<()>;
}

/// Bare repositories have no working tree.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCheckout;

impl CheckoutStrategy for NoCheckout {
    fn apply(
        &self,
        _repo: &Repository,
        _tree: &BTreeMap<String, FileEntry>,
        _superseded: &HashSet<String>,
    ) -> RepoResult<()> {
        Ok(())
    }
}

/// Copy-on-missing checkout for repositories with a working tree.
///
/// Superseded files are deleted; every entry of the new tree that is missing
/// on disk is materialized from the object store. Files that already exist
/// and were not superseded are left alone. Paths come from stored trees and
/// are validated before they are joined onto the working tree.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaterializeMissing;

impl CheckoutStrategy for MaterializeMissing {
    fn apply(
        &self,
        repo: &Repository,
        tree: &BTreeMap<String, FileEntry>,
        superseded: &HashSet<String>,
    ) -> RepoResult<()> {
        let Some(work_tree) = repo.layout().work_tree.as_deref() else {
            return Ok(());
        };
        for path in superseded {
            validate_entry_path(path)?;
            remove_if_present(&work_tree.join(path))?;
        }
        let mut written = 0usize;
        for entry in tree.values() {
            validate_entry_path(&entry.path)?;
            let target = work_tree.join(&entry.path);
            if target.exists() {
                continue;
            }
            let blob = repo
                .read_blob(&entry.object_id)?
                .ok_or(RepoError::MissingObject(entry.object_id))?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, blob.data)?;
            written += 1;
        }
        debug!(
            work_tree = %work_tree.display(),
            written,
            removed = superseded.len(),
            "checked out working tree"
        );
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> RepoResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// The checkout strategy matching a repository's layout.
pub fn strategy_for(repo: &Repository) -> &'static dyn CheckoutStrategy {
    if repo.is_bare() {
        &NoCheckout
    } else {
        &MaterializeMissing
    }
}
