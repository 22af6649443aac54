use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use raoa_limiter::AdmissionLimiter;
use raoa_store::{Blob, StoredObject};
use raoa_types::{AlbumId, ObjectId};
use tracing::{debug, warn};

use crate::builder::{CommitBuilder, CommitContext, CommitOutcome, StagedChange};
use crate::cache::TtlCache;
use crate::config::AccessConfig;
use crate::error::{RepoError, RepoResult};
use crate::listing::{FileListing, PathFilter};
use crate::metadata::{parse_autoadd, render_autoadd, AlbumMeta, AUTOADD_FILE, METADATA_FILE};
use crate::repository::{Repository, BARE_SUFFIX};
use crate::snapshot::Snapshot;

enum Source {
    /// Opened lazily from its boundary directory.
    OnDisk(PathBuf),
    /// Handed in already open; never reopened.
    Preopened(Arc<Repository>),
}

#[derive(Default)]
struct PendingMeta {
    /// Synthesized metadata served until it is persisted.
    meta: Option<AlbumMeta>,
    in_flight: bool,
}

struct AccessInner {
    source: Source,
    relative_path: PathBuf,
    limiter: AdmissionLimiter,
    config: AccessConfig,
    repository: TtlCache<Arc<Repository>>,
    snapshot: TtlCache<Snapshot>,
    metadata: TtlCache<AlbumMeta>,
    pending: Mutex<PendingMeta>,
}

/// Read and write access to one album repository.
///
/// Cloning is cheap and shares caches. Every blocking step (opening the
/// repository, resolving the ref, reading or writing objects) runs on a
/// blocking worker behind the shared [`AdmissionLimiter`]. File listings are
/// the exception: their walk runs on a dedicated thread.
#[derive(Clone)]
pub struct RepositoryAccess {
    inner: Arc<AccessInner>,
}

impl RepositoryAccess {
    /// Access the repository whose boundary directory is `path`.
    ///
    /// Nothing is opened until the first operation.
    pub fn open(
        path: impl Into<PathBuf>,
        relative_path: impl Into<PathBuf>,
        limiter: AdmissionLimiter,
        config: AccessConfig,
    ) -> Self {
        Self::with_source(Source::OnDisk(path.into()), relative_path, limiter, config)
    }

    /// Access an already opened repository.
    pub fn from_repository(
        repo: Repository,
        relative_path: impl Into<PathBuf>,
        limiter: AdmissionLimiter,
        config: AccessConfig,
    ) -> Self {
        Self::with_source(
            Source::Preopened(Arc::new(repo)),
            relative_path,
            limiter,
            config,
        )
    }

    fn with_source(
        source: Source,
        relative_path: impl Into<PathBuf>,
        limiter: AdmissionLimiter,
        config: AccessConfig,
    ) -> Self {
        Self {
            inner: Arc::new(AccessInner {
                source,
                relative_path: relative_path.into(),
                limiter,
                repository: TtlCache::new(config.repository_ttl),
                snapshot: TtlCache::new(config.snapshot_ttl),
                metadata: TtlCache::new(config.metadata_ttl),
                config,
                pending: Mutex::new(PendingMeta::default()),
            }),
        }
    }

    /// Path of the repository relative to the storage root, as discovered.
    pub fn relative_path(&self) -> &Path {
        &self.inner.relative_path
    }

    /// Relative path with the bare-repository suffix removed.
    pub fn full_path(&self) -> String {
        let path = self.inner.relative_path.to_string_lossy().replace('\\', "/");
        match path.strip_suffix(BARE_SUFFIX) {
            Some(stripped) if !stripped.is_empty() && !stripped.ends_with('/') => {
                stripped.to_string()
            }
            _ => path,
        }
    }

    /// Last path segment of [`full_path`](Self::full_path).
    pub fn directory_name(&self) -> String {
        let full = self.full_path();
        match full.rsplit_once('/') {
            Some((_, last)) => last.to_string(),
            None => full,
        }
    }

    /// The album title, or the directory name for an album without one.
    pub async fn name(&self) -> RepoResult<String> {
        let meta = self.get_metadata().await?;
        Ok(meta
            .album_title
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| self.directory_name()))
    }

    pub fn limiter(&self) -> &AdmissionLimiter {
        &self.inner.limiter
    }

    pub fn config(&self) -> &AccessConfig {
        &self.inner.config
    }

    /// A commit context authored by the configured identity.
    pub fn commit_context(&self, message: impl Into<String>) -> CommitContext {
        CommitContext::new(message, self.inner.config.author.clone())
    }

    // -----------------------------------------------------------------------
    // Blocking plumbing
    // -----------------------------------------------------------------------

    /// The opened repository, reopened at most once per repository TTL.
    pub async fn repository(&self) -> RepoResult<Arc<Repository>> {
        let path = match &self.inner.source {
            Source::Preopened(repo) => return Ok(Arc::clone(repo)),
            Source::OnDisk(path) => path.clone(),
        };
        let limiter = &self.inner.limiter;
        let load = self.inner.repository.get_or_load(|| {
            limiter.limit(async move {
                let repo = tokio::task::spawn_blocking(move || Repository::open(&path)).await??;
                Ok::<_, RepoError>(Arc::new(repo))
            })
        });
        limiter.scope(load).await
    }

    /// Run `work` against the repository on a blocking worker once admitted.
    pub(crate) async fn run_blocking<T, F>(&self, work: F) -> RepoResult<T>
    where
        F: FnOnce(&Repository) -> RepoResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let repo = self.repository().await?;
        self.inner
            .limiter
            .limit(async move { tokio::task::spawn_blocking(move || work(repo.as_ref())).await? })
            .await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The current snapshot, re-resolved at most once per snapshot TTL or
    /// after a commit through this access.
    pub async fn snapshot(&self) -> RepoResult<Snapshot> {
        let repo = self.repository().await?;
        let cache = &self.inner.snapshot;
        self.inner
            .limiter
            .limit(cache.get_or_load(|| async move {
                tokio::task::spawn_blocking(move || repo.read_snapshot()).await?
            }))
            .await
    }

    /// Force the next read to re-resolve the ref.
    pub fn invalidate_snapshot(&self) {
        self.inner.snapshot.invalidate();
    }

    /// Drop every cached value: repository handle, snapshot and metadata.
    pub fn reset_caches(&self) {
        self.inner.repository.invalidate();
        self.inner.snapshot.invalidate();
        self.inner.metadata.invalidate();
    }

    /// The commit the branch points to; `None` for an empty repository.
    pub async fn current_version(&self) -> RepoResult<Option<ObjectId>> {
        Ok(self.snapshot().await?.commit)
    }

    /// Stream the files of the current snapshot matching `filter`, in lexical
    /// path order. Entries are produced only as credit is requested.
    pub async fn list_files(&self, filter: PathFilter) -> RepoResult<FileListing> {
        let repo = self.repository().await?;
        let snapshot = self.snapshot().await?;
        FileListing::spawn(repo, snapshot.tree, filter)
    }

    /// Read any object by hash.
    pub async fn read_object(&self, id: ObjectId) -> RepoResult<Option<StoredObject>> {
        self.run_blocking(move |repo| Ok(repo.objects().read(&id)?))
            .await
    }

    /// Read a blob by hash; `None` if absent or not a blob.
    pub async fn read_blob(&self, id: ObjectId) -> RepoResult<Option<Blob>> {
        self.run_blocking(move |repo| repo.read_blob(&id)).await
    }

    /// Read the file at `path` in the current snapshot.
    pub async fn read_path(&self, path: &str) -> RepoResult<Option<Blob>> {
        let snapshot = self.snapshot().await?;
        self.read_path_in(&snapshot, path).await
    }

    /// Contents of the file at `path` in the current snapshot.
    pub async fn read_object_bytes(&self, path: &str) -> RepoResult<Option<Vec<u8>>> {
        Ok(self.read_path(path).await?.map(|blob| blob.data))
    }

    /// Read the file at `path` as it is in `snapshot`, which need not be the
    /// current one.
    pub async fn read_path_in(
        &self,
        snapshot: &Snapshot,
        path: &str,
    ) -> RepoResult<Option<Blob>> {
        let tree = Arc::clone(&snapshot.tree);
        let path = path.to_string();
        self.run_blocking(move |repo| match repo.lookup(&tree, &path)? {
            Some(entry) if !entry.mode.is_directory() => repo.read_blob(&entry.object_id),
            _ => Ok(None),
        })
        .await
    }

    /// Path of the first file (in lexical order) whose content is `id`.
    pub async fn filename_of_object(&self, id: ObjectId) -> RepoResult<Option<String>> {
        let snapshot = self.snapshot().await?;
        self.run_blocking(move |repo| {
            let mut found = None;
            repo.walk(&snapshot.tree, |entry| {
                if entry.object_id == id {
                    found = Some(entry.path);
                    return false;
                }
                true
            })?;
            Ok(found)
        })
        .await
    }

    /// Instants listed in the autoadd sidecar; empty if there is none.
    pub async fn read_autoadd(&self) -> RepoResult<Vec<DateTime<Utc>>> {
        match self.read_path(AUTOADD_FILE).await? {
            Some(blob) => parse_autoadd(&blob.data),
            None => Ok(Vec::new()),
        }
    }

    /// Album metadata.
    ///
    /// An album without a stored album id gets a synthesized one right away;
    /// it is served from memory until a background commit persists it, so
    /// readers see the same id throughout.
    pub async fn get_metadata(&self) -> RepoResult<AlbumMeta> {
        let load = self.inner.metadata.get_or_load(|| self.load_metadata());
        self.inner.limiter.scope(load).await
    }

    async fn load_metadata(&self) -> RepoResult<AlbumMeta> {
        let stored = match self.read_path(METADATA_FILE).await? {
            Some(blob) => match AlbumMeta::from_json(&blob.data) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!(album = %self.full_path(), error = %e, "unreadable album metadata");
                    None
                }
            },
            None => None,
        };
        if let Some(meta) = &stored {
            if meta.album_id.is_some() {
                self.inner.pending.lock().expect("lock poisoned").meta = None;
                return Ok(meta.clone());
            }
        }

        let (meta, persist) = {
            let mut pending = self.inner.pending.lock().expect("lock poisoned");
            let meta = pending
                .meta
                .get_or_insert_with(|| {
                    let mut meta = stored.unwrap_or_default();
                    meta.album_id = Some(AlbumId::random());
                    if meta.album_title.is_none() {
                        meta.album_title = Some(self.directory_name());
                    }
                    meta
                })
                .clone();
            let persist = !pending.in_flight;
            pending.in_flight = true;
            (meta, persist)
        };
        if persist {
            self.spawn_metadata_persist(meta.clone());
        }
        Ok(meta)
    }

    fn spawn_metadata_persist(&self, synthesized: AlbumMeta) {
        let access = self.clone();
        debug!(album = %self.full_path(), id = ?synthesized.album_id, "persisting synthesized album id");
        tokio::spawn(async move {
            let context = access.commit_context("assign album id");
            let result = access
                .update_metadata(
                    |mut current| {
                        if current.album_id.is_none() {
                            current.album_id = synthesized.album_id;
                        }
                        if current.album_title.is_none() {
                            current.album_title = synthesized.album_title.clone();
                        }
                        current
                    },
                    &context,
                )
                .await;
            let mut pending = access.inner.pending.lock().expect("lock poisoned");
            pending.in_flight = false;
            match result {
                Ok(_) => pending.meta = None,
                Err(e) => {
                    warn!(album = %access.full_path(), error = %e, "could not persist album id")
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Start a batch against the current snapshot.
    pub async fn create_builder(&self) -> RepoResult<CommitBuilder> {
        CommitBuilder::create(self.clone()).await
    }

    /// Stage `changes` on a fresh builder and commit, starting over on a lost
    /// ref race until the retry policy is exhausted.
    pub async fn apply_with_retry(
        &self,
        changes: &[StagedChange],
        context: &CommitContext,
    ) -> RepoResult<CommitOutcome> {
        let policy = &self.inner.config.retry;
        let attempts = policy.attempts();
        for attempt in 1..=attempts {
            let mut builder = self.create_builder().await?;
            for change in changes {
                builder.apply(change).await?;
            }
            let outcome = builder.commit(context).await?;
            if !outcome.is_conflict() {
                return Ok(outcome);
            }
            if attempt < attempts {
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
        }
        Err(RepoError::ConflictExhausted { attempts })
    }

    /// Read-modify-write the album metadata.
    ///
    /// An album id already stored is kept whatever `mutation` returns.
    pub async fn update_metadata<F>(
        &self,
        mutation: F,
        context: &CommitContext,
    ) -> RepoResult<AlbumMeta>
    where
        F: Fn(AlbumMeta) -> AlbumMeta,
    {
        let policy = &self.inner.config.retry;
        let attempts = policy.attempts();
        for attempt in 1..=attempts {
            let mut builder = self.create_builder().await?;
            let existing = builder.read_path(METADATA_FILE).await?;
            let current = match &existing {
                Some(blob) => AlbumMeta::from_json(&blob.data).unwrap_or_else(|e| {
                    warn!(album = %self.full_path(), error = %e, "overwriting unreadable album metadata");
                    AlbumMeta::default()
                }),
                None => AlbumMeta::default(),
            };
            let mut next = mutation(current.clone());
            if current.album_id.is_some() {
                next.album_id = current.album_id;
            }
            if existing.is_some() && next == current {
                builder.close();
                return Ok(current);
            }
            builder
                .import_bytes(METADATA_FILE, next.to_json()?, true)
                .await?;
            if !builder.commit(context).await?.is_conflict() {
                self.inner.metadata.invalidate();
                return Ok(next);
            }
            if attempt < attempts {
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
        }
        Err(RepoError::ConflictExhausted { attempts })
    }

    /// Replace the autoadd sidecar with `instants`, sorted and deduplicated.
    pub async fn update_autoadd(
        &self,
        instants: &[DateTime<Utc>],
        context: &CommitContext,
    ) -> RepoResult<CommitOutcome> {
        let change = StagedChange::put(AUTOADD_FILE, render_autoadd(instants));
        self.apply_with_retry(&[change], context).await
    }
}

impl std::fmt::Debug for RepositoryAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.inner.source {
            Source::OnDisk(path) => path.display().to_string(),
            Source::Preopened(repo) => repo.layout().boundary().display().to_string(),
        };
        f.debug_struct("RepositoryAccess")
            .field("relative_path", &self.inner.relative_path)
            .field("source", &source)
            .field("limiter", &self.inner.limiter.describe_state())
            .finish()
    }
}
