//! Lock-file based refs inside a git directory.
//!
//! A ref `refs/heads/master` is the file `<git dir>/refs/heads/master` holding
//! the 40-character hex commit id. Updates take `<ref>.lock` with exclusive
//! create, verify the current value, write the new value into the lock file
//! and rename it over the ref. A lock held by another writer counts as a lost
//! race, never as a wait. A lock older than the stale threshold is left over
//! from a writer that died mid-update and is removed.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use raoa_types::ObjectId;
use tracing::{debug, warn};

use crate::error::{RefError, Result};
use crate::names::validate_ref_name;
use crate::traits::RefStore;
use crate::types::{Head, RefUpdate, HEAD};

/// Age after which a ref lock is considered abandoned.
pub const DEFAULT_STALE_LOCK_AFTER: Duration = Duration::from_secs(10 * 60);

/// Filesystem [`RefStore`] rooted at a git directory.
#[derive(Clone, Debug)]
pub struct FileRefStore {
    git_dir: PathBuf,
    stale_lock_after: Duration,
}

/// Removes the lock file unless it was renamed into place.
struct LockFile {
    path: PathBuf,
    armed: bool,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl FileRefStore {
    /// Create a store for the refs under `git_dir`.
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
            stale_lock_after: DEFAULT_STALE_LOCK_AFTER,
        }
    }

    /// Treat ref locks older than `age` as abandoned.
    pub fn with_stale_lock_after(mut self, age: Duration) -> Self {
        self.stale_lock_after = age;
        self
    }

    /// The git directory this store manages.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.git_dir.join(name)
    }

    /// Remove `lock_path` if it was last touched more than the stale
    /// threshold ago. Returns whether it was removed.
    fn reclaim_stale_lock(&self, name: &str, lock_path: &Path) -> Result<bool> {
        let modified = match fs::metadata(lock_path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            // Released between our create and this check.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age < self.stale_lock_after {
            return Ok(false);
        }
        warn!(
            ref_name = name,
            lock = %lock_path.display(),
            age_secs = age.as_secs(),
            "removing stale ref lock"
        );
        match fs::remove_file(lock_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn read_id(&self, name: &str) -> Result<Option<ObjectId>> {
        let text = match fs::read_to_string(self.ref_path(name)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        ObjectId::from_hex(&text)
            .map(Some)
            .map_err(|e| RefError::Corrupt {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}

impl RefStore for FileRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        validate_ref_name(name)?;
        self.read_id(name)
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<RefUpdate> {
        validate_ref_name(name)?;
        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut lock_name = path.clone().into_os_string();
        lock_name.push(".lock");
        let lock_path = PathBuf::from(lock_name);
        let mut reclaimed = false;
        let mut file = loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(file) => break file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if !reclaimed && self.reclaim_stale_lock(name, &lock_path)? {
                        reclaimed = true;
                        continue;
                    }
                    debug!(ref_name = name, "ref is locked by another writer");
                    let actual = self.read_id(name)?;
                    return Ok(RefUpdate::Rejected { expected, actual });
                }
                Err(e) => return Err(e.into()),
            }
        };
        let mut lock = LockFile {
            path: lock_path,
            armed: true,
        };

        let actual = self.read_id(name)?;
        if actual != expected {
            return Ok(RefUpdate::Rejected { expected, actual });
        }

        writeln!(file, "{}", new.to_hex())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&lock.path, &path)?;
        lock.armed = false;

        Ok(RefUpdate::Updated {
            previous: actual,
            new,
        })
    }

    fn head(&self) -> Result<Option<Head>> {
        let text = match fs::read_to_string(self.git_dir.join(HEAD)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Head::parse(&text).map(Some).ok_or_else(|| RefError::Corrupt {
            name: HEAD.to_string(),
            reason: format!("unrecognized content {:?}", text.trim()),
        })
    }

    fn set_head(&self, branch: &str) -> Result<()> {
        validate_ref_name(branch)?;
        fs::create_dir_all(&self.git_dir)?;
        let head = Head::Symbolic(branch.to_string());
        fs::write(self.git_dir.join(HEAD), format!("{head}\n"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MASTER_REF;
    use std::sync::Arc;

    fn commit(tag: &[u8]) -> ObjectId {
        ObjectId::from_bytes(tag)
    }

    #[test]
    fn missing_ref_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::new(dir.path());
        assert!(store.read_ref(MASTER_REF).unwrap().is_none());
        assert!(store.head().unwrap().is_none());
    }

    #[test]
    fn swap_writes_hex_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::new(dir.path());
        let update = store.compare_and_swap(MASTER_REF, None, commit(b"c1")).unwrap();
        assert!(update.is_updated());

        let raw = fs::read_to_string(dir.path().join("refs/heads/master")).unwrap();
        assert_eq!(raw.trim(), commit(b"c1").to_hex());
        assert!(!dir.path().join("refs/heads/master.lock").exists());
    }

    #[test]
    fn stale_expectation_leaves_ref_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::new(dir.path());
        store.compare_and_swap(MASTER_REF, None, commit(b"c1")).unwrap();
        store
            .compare_and_swap(MASTER_REF, Some(commit(b"c1")), commit(b"c2"))
            .unwrap();

        let update = store
            .compare_and_swap(MASTER_REF, Some(commit(b"c1")), commit(b"c3"))
            .unwrap();
        assert_eq!(
            update,
            RefUpdate::Rejected {
                expected: Some(commit(b"c1")),
                actual: Some(commit(b"c2"))
            }
        );
        assert_eq!(store.read_ref(MASTER_REF).unwrap(), Some(commit(b"c2")));
        assert!(!dir.path().join("refs/heads/master.lock").exists());
    }

    #[test]
    fn held_lock_is_a_lost_race() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::new(dir.path());
        store.compare_and_swap(MASTER_REF, None, commit(b"c1")).unwrap();
        fs::write(dir.path().join("refs/heads/master.lock"), "").unwrap();

        let update = store
            .compare_and_swap(MASTER_REF, Some(commit(b"c1")), commit(b"c2"))
            .unwrap();
        assert!(!update.is_updated());
        // The foreign lock is not ours to remove.
        assert!(dir.path().join("refs/heads/master.lock").exists());
    }

    #[test]
    fn abandoned_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::new(dir.path());
        store.compare_and_swap(MASTER_REF, None, commit(b"c1")).unwrap();
        let lock = dir.path().join("refs/heads/master.lock");
        fs::write(&lock, "").unwrap();
        let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&lock)
            .unwrap()
            .set_modified(an_hour_ago)
            .unwrap();

        let update = store
            .compare_and_swap(MASTER_REF, Some(commit(b"c1")), commit(b"c2"))
            .unwrap();
        assert!(update.is_updated());
        assert_eq!(store.read_ref(MASTER_REF).unwrap(), Some(commit(b"c2")));
        assert!(!lock.exists());
    }

    #[test]
    fn stale_threshold_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::new(dir.path()).with_stale_lock_after(Duration::ZERO);
        store.compare_and_swap(MASTER_REF, None, commit(b"c1")).unwrap();
        fs::write(dir.path().join("refs/heads/master.lock"), "").unwrap();
        assert!(store
            .compare_and_swap(MASTER_REF, Some(commit(b"c1")), commit(b"c2"))
            .unwrap()
            .is_updated());
    }

    #[test]
    fn corrupt_ref_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        fs::write(dir.path().join("refs/heads/master"), "zzzz\n").unwrap();
        let store = FileRefStore::new(dir.path());
        assert!(matches!(
            store.read_ref(MASTER_REF),
            Err(RefError::Corrupt { .. })
        ));
    }

    #[test]
    fn head_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::new(dir.path());
        store.set_head(MASTER_REF).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("HEAD")).unwrap(),
            "ref: refs/heads/master\n"
        );
        store.compare_and_swap(MASTER_REF, None, commit(b"c1")).unwrap();
        assert_eq!(store.resolve_head().unwrap(), Some(commit(b"c1")));
    }

    #[test]
    fn concurrent_writers_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileRefStore::new(dir.path()));
        store.compare_and_swap(MASTER_REF, None, commit(b"base")).unwrap();

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .compare_and_swap(MASTER_REF, Some(commit(b"base")), commit(&[i]))
                        .unwrap()
                        .is_updated()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
