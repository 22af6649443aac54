use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use raoa_refs::RefUpdate;
use raoa_store::{Blob, CommitObject, EntryMode, Person};
use raoa_types::ObjectId;
use tracing::{debug, info, warn};

use crate::access::RepositoryAccess;
use crate::checkout::strategy_for;
use crate::error::{RepoError, RepoResult};
use crate::snapshot::{validate_entry_path, FileEntry, Snapshot};

/// Lifecycle of a [`CommitBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderState {
    /// Accepting imports and removals.
    Open,
    /// `commit` succeeded (including the no-op case).
    Landed,
    /// `commit` lost the ref race; recreate the builder to retry.
    Conflict,
    /// `commit` hit a fatal error.
    Failed,
    /// `close` was called without committing.
    Discarded,
}

/// Result of staging one file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The content is staged under the target name.
    Imported(ObjectId),
    /// The target name already holds exactly this content; nothing changed.
    AlreadyPresent(ObjectId),
    /// The content was stored, but the target name keeps its existing entry
    /// because replacement was not requested.
    Shadowed(ObjectId),
}

impl ImportOutcome {
    pub fn object_id(&self) -> ObjectId {
        match self {
            Self::Imported(id) | Self::AlreadyPresent(id) | Self::Shadowed(id) => *id,
        }
    }
}

/// Result of [`CommitBuilder::commit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The ref now points at `commit`.
    Landed { commit: ObjectId },
    /// Nothing to commit; the ref was not touched.
    Unchanged,
    /// Another writer moved the ref since the builder was created.
    Conflict {
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },
}

impl CommitOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// The new commit, if one landed.
    pub fn commit(&self) -> Option<ObjectId> {
        match self {
            Self::Landed { commit } => Some(*commit),
            _ => None,
        }
    }
}

/// Message and author of a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitContext {
    pub message: String,
    pub author: Person,
}

impl CommitContext {
    pub fn new(message: impl Into<String>, author: Person) -> Self {
        Self {
            message: message.into(),
            author,
        }
    }
}

/// One change replayed by [`RepositoryAccess::apply_with_retry`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StagedChange {
    Put {
        path: String,
        data: Vec<u8>,
        replace_if_exists: bool,
    },
    Remove {
        path: String,
    },
}

impl StagedChange {
    pub fn put(path: impl Into<String>, data: Vec<u8>) -> Self {
        Self::Put {
            path: path.into(),
            data,
            replace_if_exists: true,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::Remove { path: path.into() }
    }
}

/// Stages additions and removals against one snapshot and lands them as a
/// single commit with a compare-and-swap of the branch ref.
///
/// A builder belongs to one batch; it is never shared between concurrent
/// callers. Operations apply in call order.
pub struct CommitBuilder {
    access: RepositoryAccess,
    base: Snapshot,
    /// The tree as it will be committed.
    view: BTreeMap<String, FileEntry>,
    /// Everything known to exist: content hash to path.
    known: HashMap<ObjectId, String>,
    /// Paths replaced or removed by this batch.
    superseded: HashSet<String>,
    dirty: bool,
    state: BuilderState,
}

impl CommitBuilder {
    pub(crate) async fn create(access: RepositoryAccess) -> RepoResult<Self> {
        let base = access.snapshot().await?;
        let tree = Arc::clone(&base.tree);
        let entries = access
            .run_blocking(move |repo| repo.flatten(&tree))
            .await?;

        let mut view = BTreeMap::new();
        let mut known = HashMap::new();
        for entry in entries {
            known.entry(entry.object_id).or_insert_with(|| entry.path.clone());
            view.insert(entry.path.clone(), entry);
        }
        debug!(
            album = %access.relative_path().display(),
            base = ?base.commit,
            files = view.len(),
            "created commit builder"
        );
        Ok(Self {
            access,
            base,
            view,
            known,
            superseded: HashSet::new(),
            dirty: false,
            state: BuilderState::Open,
        })
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// The commit the builder was created on (`None` for an empty repository).
    pub fn base_commit(&self) -> Option<ObjectId> {
        self.base.commit
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The entry the next commit would hold at `path`.
    pub fn staged_entry(&self, path: &str) -> Option<&FileEntry> {
        self.view.get(path)
    }

    /// A path known to hold content `id`, in the base tree or staged.
    pub fn known_path(&self, id: &ObjectId) -> Option<&str> {
        self.known.get(id).map(String::as_str)
    }

    fn ensure_open(&self) -> RepoResult<()> {
        if self.state != BuilderState::Open {
            return Err(RepoError::InvalidState(format!(
                "builder is {:?}, not Open",
                self.state
            )));
        }
        Ok(())
    }

    /// Stage the contents of `source` under `target`.
    pub async fn import_file(
        &mut self,
        source: &Path,
        target: &str,
        replace_if_exists: bool,
    ) -> RepoResult<ImportOutcome> {
        self.ensure_open()?;
        validate_entry_path(target)?;
        let source = source.to_path_buf();
        let id = self
            .access
            .run_blocking(move |repo| {
                let data = std::fs::read(&source)?;
                repo.write_blob(data)
            })
            .await?;
        Ok(self.stage(target, id, replace_if_exists))
    }

    /// Stage in-memory content under `target`.
    pub async fn import_bytes(
        &mut self,
        target: &str,
        data: Vec<u8>,
        replace_if_exists: bool,
    ) -> RepoResult<ImportOutcome> {
        self.ensure_open()?;
        validate_entry_path(target)?;
        let id = self
            .access
            .run_blocking(move |repo| repo.write_blob(data))
            .await?;
        Ok(self.stage(target, id, replace_if_exists))
    }

    fn stage(&mut self, target: &str, id: ObjectId, replace: bool) -> ImportOutcome {
        match self.view.get(target) {
            Some(existing) if existing.object_id == id => {
                debug!(path = target, "content already present");
                return ImportOutcome::AlreadyPresent(id);
            }
            Some(_) if !replace => {
                debug!(path = target, "existing entry kept, new content shadowed");
                self.dirty = true;
                return ImportOutcome::Shadowed(id);
            }
            Some(_) => {
                self.superseded.insert(target.to_string());
            }
            None => {}
        }
        self.view.insert(
            target.to_string(),
            FileEntry::new(target, EntryMode::Regular, id),
        );
        self.known.insert(id, target.to_string());
        self.dirty = true;
        ImportOutcome::Imported(id)
    }

    /// Drop `path` from the next commit. Returns whether it existed.
    pub fn remove_file(&mut self, path: &str) -> RepoResult<bool> {
        self.ensure_open()?;
        let Some(removed) = self.view.remove(path) else {
            return Ok(false);
        };
        if self.known.get(&removed.object_id).map(String::as_str) == Some(path) {
            self.known.remove(&removed.object_id);
        }
        self.superseded.insert(path.to_string());
        self.dirty = true;
        Ok(true)
    }

    /// Stage one [`StagedChange`].
    pub async fn apply(&mut self, change: &StagedChange) -> RepoResult<()> {
        match change {
            StagedChange::Put {
                path,
                data,
                replace_if_exists,
            } => {
                self.import_bytes(path, data.clone(), *replace_if_exists)
                    .await?;
            }
            StagedChange::Remove { path } => {
                self.remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Read `path` as it is in the base snapshot.
    pub async fn read_path(&self, path: &str) -> RepoResult<Option<Blob>> {
        self.access.read_path_in(&self.base, path).await
    }

    /// Land the staged changes.
    ///
    /// A builder that never changed anything, or whose rebuilt tree equals
    /// the base tree, reports [`CommitOutcome::Unchanged`] without writing a
    /// commit. A lost ref race is [`CommitOutcome::Conflict`]; `Err` means a
    /// fatal storage failure.
    pub async fn commit(&mut self, context: &CommitContext) -> RepoResult<CommitOutcome> {
        self.ensure_open()?;
        if !self.dirty {
            self.state = BuilderState::Landed;
            return Ok(CommitOutcome::Unchanged);
        }

        let view = self.view.clone();
        let superseded = self.superseded.clone();
        let base_tree = self.base.tree_id;
        let parent = self.base.commit;
        let context = context.clone();
        let result = self
            .access
            .run_blocking(move |repo| {
                let tree = repo.write_tree(&view)?;
                if tree == base_tree {
                    return Ok(CommitOutcome::Unchanged);
                }
                let commit = repo.write_commit(&CommitObject {
                    tree,
                    parent,
                    author: context.author,
                    message: context.message,
                    timestamp: Utc::now(),
                })?;
                match repo.update_branch(parent, commit)? {
                    RefUpdate::Updated { .. } => {}
                    RefUpdate::Rejected { expected, actual } => {
                        return Ok(CommitOutcome::Conflict { expected, actual });
                    }
                }
                if let Err(e) = strategy_for(repo).apply(repo, &view, &superseded) {
                    warn!(commit = %commit, error = %e, "commit landed but checkout failed");
                }
                Ok(CommitOutcome::Landed { commit })
            })
            .await;

        match result {
            Ok(outcome) => {
                match outcome {
                    CommitOutcome::Landed { commit } => {
                        self.access.invalidate_snapshot();
                        self.state = BuilderState::Landed;
                        info!(
                            album = %self.access.relative_path().display(),
                            commit = %commit,
                            parent = ?parent,
                            files = self.view.len(),
                            "commit landed"
                        );
                    }
                    CommitOutcome::Unchanged => self.state = BuilderState::Landed,
                    CommitOutcome::Conflict { expected, actual } => {
                        // Our view of the ref is stale; the next builder must see the new one.
                        self.access.invalidate_snapshot();
                        self.state = BuilderState::Conflict;
                        warn!(
                            album = %self.access.relative_path().display(),
                            expected = ?expected,
                            actual = ?actual,
                            "lost ref race"
                        );
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                self.state = BuilderState::Failed;
                Err(e)
            }
        }
    }

    /// Discard the builder without side effects.
    pub fn close(&mut self) {
        if self.state == BuilderState::Open {
            self.state = BuilderState::Discarded;
        }
    }
}

impl std::fmt::Debug for CommitBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitBuilder")
            .field("album", &self.access.relative_path())
            .field("base", &self.base.commit)
            .field("state", &self.state)
            .field("dirty", &self.dirty)
            .field("files", &self.view.len())
            .finish()
    }
}
