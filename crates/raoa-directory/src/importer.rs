use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use raoa_repo::{CommitBuilder, CommitContext, CommitOutcome, ImportOutcome, RepoError, RepositoryAccess};
use raoa_types::AlbumId;
use tracing::{debug, info, warn};

use crate::directory::RepositoryDirectory;
use crate::error::{DirectoryError, DirectoryResult};

/// What happened to one imported file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportResult {
    /// Staged under `path` in `album`.
    Imported { album: AlbumId, path: String },
    /// `album` already holds this content under `path`.
    AlreadyPresent { album: AlbumId, path: String },
    /// `path` in `album` already holds different content; it is kept.
    Shadowed { album: AlbumId, path: String },
    /// No autoadd marker covers the capture time.
    NoTargetAlbum,
}

/// Entry name of an imported file: capture time (UTC) plus original name.
pub fn import_entry_name(captured_at: DateTime<Utc>, file_name: &str) -> String {
    format!("{}-{file_name}", captured_at.format("%Y-%m-%d-%H-%M-%S"))
}

struct PendingBatch {
    access: RepositoryAccess,
    builder: CommitBuilder,
    /// Files staged so far, replayed onto a fresh builder after a lost race.
    staged: Vec<(PathBuf, String)>,
}

/// Routes captured files to their albums by timestamp and lands them as one
/// commit per album.
pub struct AlbumImporter {
    directory: Arc<RepositoryDirectory>,
    pending: HashMap<AlbumId, PendingBatch>,
}

impl AlbumImporter {
    pub fn new(directory: Arc<RepositoryDirectory>) -> Self {
        Self {
            directory,
            pending: HashMap::new(),
        }
    }

    /// Albums with staged, uncommitted files.
    pub fn pending_albums(&self) -> Vec<AlbumId> {
        let mut albums: Vec<AlbumId> = self.pending.keys().copied().collect();
        albums.sort();
        albums
    }

    /// Stage `source` in the album owning `captured_at`.
    pub async fn import_file(
        &mut self,
        source: &Path,
        captured_at: DateTime<Utc>,
    ) -> DirectoryResult<ImportResult> {
        let file_name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| DirectoryError::InvalidSource(source.to_path_buf()))?;
        let Some(album) = self
            .directory
            .resolve_album_for_timestamp(captured_at)
            .await?
        else {
            debug!(file = %source.display(), captured_at = %captured_at, "no album for capture time");
            return Ok(ImportResult::NoTargetAlbum);
        };
        let target = import_entry_name(captured_at, file_name);
        if !self.open_batch(album).await? {
            warn!(album = %album, "autoadd index names an unknown album");
            return Ok(ImportResult::NoTargetAlbum);
        }
        self.stage(album, source, target).await
    }

    /// Stage `source` as `file_name` in `album`, bypassing autoadd routing.
    pub async fn import_file_into(
        &mut self,
        source: &Path,
        file_name: &str,
        album: AlbumId,
    ) -> DirectoryResult<ImportResult> {
        if !self.open_batch(album).await? {
            return Err(DirectoryError::UnknownAlbum(album));
        }
        self.stage(album, source, file_name.to_string()).await
    }

    /// Make sure `album` has a pending batch; `false` if the directory does
    /// not know the album.
    async fn open_batch(&mut self, album: AlbumId) -> DirectoryResult<bool> {
        if !self.pending.contains_key(&album) {
            let Some(access) = self.directory.get_album(&album).await? else {
                return Ok(false);
            };
            let builder = access.create_builder().await?;
            self.pending.insert(
                album,
                PendingBatch {
                    access,
                    builder,
                    staged: Vec::new(),
                },
            );
        }
        Ok(true)
    }

    async fn stage(
        &mut self,
        album: AlbumId,
        source: &Path,
        target: String,
    ) -> DirectoryResult<ImportResult> {
        let batch = self
            .pending
            .get_mut(&album)
            .ok_or_else(|| RepoError::Internal("pending batch vanished".into()))?;
        let outcome = batch.builder.import_file(source, &target, false).await?;
        batch.staged.push((source.to_path_buf(), target.clone()));
        Ok(match outcome {
            ImportOutcome::Imported(_) => ImportResult::Imported { album, path: target },
            ImportOutcome::AlreadyPresent(_) => ImportResult::AlreadyPresent { album, path: target },
            ImportOutcome::Shadowed(_) => ImportResult::Shadowed { album, path: target },
        })
    }

    /// Commit every pending batch.
    ///
    /// A batch that loses the ref race is replayed on a fresh builder until
    /// it lands or the album's retry policy is spent. Each album reports its
    /// own result.
    pub async fn commit_all(
        &mut self,
        context: &CommitContext,
    ) -> BTreeMap<AlbumId, DirectoryResult<CommitOutcome>> {
        let mut results = BTreeMap::new();
        for (album, batch) in std::mem::take(&mut self.pending) {
            let result = Self::land(album, batch, context).await;
            if let Err(e) = &result {
                warn!(album = %album, error = %e, "import batch failed");
            }
            results.insert(album, result);
        }
        results
    }

    async fn land(
        album: AlbumId,
        mut batch: PendingBatch,
        context: &CommitContext,
    ) -> DirectoryResult<CommitOutcome> {
        let policy = batch.access.config().retry.clone();
        let attempts = policy.attempts();
        let mut outcome = batch.builder.commit(context).await?;
        let mut attempt = 1;
        while outcome.is_conflict() {
            if attempt >= attempts {
                return Err(RepoError::ConflictExhausted { attempts }.into());
            }
            tokio::time::sleep(policy.backoff(attempt)).await;
            attempt += 1;
            debug!(album = %album, attempt, files = batch.staged.len(), "replaying import batch");
            let mut builder = batch.access.create_builder().await?;
            for (source, target) in &batch.staged {
                builder.import_file(source, target, false).await?;
            }
            outcome = builder.commit(context).await?;
        }
        if let CommitOutcome::Landed { commit } = outcome {
            info!(album = %album, commit = %commit, files = batch.staged.len(), "import batch landed");
        }
        Ok(outcome)
    }

    /// Discard every pending batch without committing.
    pub fn close(&mut self) {
        for (_, mut batch) in self.pending.drain() {
            batch.builder.close();
        }
    }
}

impl Drop for AlbumImporter {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(albums = self.pending.len(), "discarding uncommitted import batches");
        }
    }
}

impl std::fmt::Debug for AlbumImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlbumImporter")
            .field("directory", &self.directory.root())
            .field("pending", &self.pending_albums())
            .finish()
    }
}
