use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use raoa_limiter::{AdmissionContext, AdmissionLimiter};
use raoa_repo::{AccessConfig, AlbumMeta, RepoError, Repository, RepositoryAccess, TtlCache};
use raoa_types::AlbumId;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::discovery::discover;
use crate::error::{DirectoryError, DirectoryResult};
use crate::paths::album_relative_path;
use crate::routing::AutoaddIndex;

/// The albums found by one discovery pass, keyed by album id.
#[derive(Debug, Default)]
pub struct AlbumCatalog {
    albums: BTreeMap<AlbumId, RepositoryAccess>,
}

impl AlbumCatalog {
    pub fn get(&self, id: &AlbumId) -> Option<&RepositoryAccess> {
        self.albums.get(id)
    }

    /// Albums in album id order.
    pub fn iter(&self) -> impl Iterator<Item = (&AlbumId, &RepositoryAccess)> {
        self.albums.iter()
    }

    pub fn len(&self) -> usize {
        self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }
}

/// All album repositories under one storage root.
///
/// Discovery results and the autoadd routing index are cached with their own
/// lifetimes; concurrent misses share a single reload. Access instances are
/// kept across rescans so their caches survive.
pub struct RepositoryDirectory {
    root: PathBuf,
    limiter: AdmissionLimiter,
    access_config: AccessConfig,
    catalog: TtlCache<Arc<AlbumCatalog>>,
    autoadd: TtlCache<Arc<AutoaddIndex>>,
    accesses: Mutex<HashMap<PathBuf, RepositoryAccess>>,
}

impl RepositoryDirectory {
    /// Open the storage root described by `config`, creating it if missing.
    pub fn open(config: &StorageConfig) -> DirectoryResult<Self> {
        Self::with_limiter(config, AdmissionLimiter::from_config(&config.limiter))
    }

    /// Like [`open`](Self::open), sharing an existing limiter.
    pub fn with_limiter(config: &StorageConfig, limiter: AdmissionLimiter) -> DirectoryResult<Self> {
        std::fs::create_dir_all(&config.repository_root)?;
        debug!(root = %config.repository_root.display(), limiter = %limiter.describe_state(), "opened album directory");
        Ok(Self {
            root: config.repository_root.clone(),
            limiter,
            access_config: config.access_config(),
            catalog: TtlCache::new(config.cache.discovery_ttl()),
            autoadd: TtlCache::new(config.cache.autoadd_index_ttl()),
            accesses: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn limiter(&self) -> &AdmissionLimiter {
        &self.limiter
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// The current album set, discovering it if the cache has expired.
    pub async fn catalog(&self) -> DirectoryResult<Arc<AlbumCatalog>> {
        self.catalog.get_or_load(|| self.scan()).await
    }

    /// Force re-discovery. Returns the number of albums found.
    pub async fn rescan(&self) -> DirectoryResult<usize> {
        self.reset_cache();
        Ok(self.catalog().await?.len())
    }

    /// Drop the discovery and routing caches without reloading.
    pub fn reset_cache(&self) {
        self.catalog.invalidate();
        self.autoadd.invalidate();
    }

    async fn scan(&self) -> DirectoryResult<Arc<AlbumCatalog>> {
        let root = self.root.clone();
        let found = self
            .limiter
            .limit(async move { tokio::task::spawn_blocking(move || discover(&root)).await })
            .await?;

        let accesses: Vec<RepositoryAccess> = {
            let mut known = self.accesses.lock().expect("lock poisoned");
            let mut kept = HashMap::with_capacity(found.len());
            let accesses: Vec<RepositoryAccess> = found
                .into_iter()
                .map(|repo| {
                    let access = known.remove(&repo.path).unwrap_or_else(|| {
                        RepositoryAccess::open(
                            &repo.path,
                            &repo.relative_path,
                            self.limiter.clone(),
                            self.access_config.clone(),
                        )
                    });
                    kept.insert(repo.path, access.clone());
                    access
                })
                .collect();
            *known = kept;
            accesses
        };

        let context = AdmissionContext::current();
        let mut tasks = JoinSet::new();
        for access in accesses {
            tasks.spawn(context.clone().scope(async move {
                let meta = access.get_metadata().await;
                (access, meta)
            }));
        }
        let mut resolved = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            resolved.push(joined?);
        }
        resolved.sort_by(|(a, _), (b, _)| a.relative_path().cmp(b.relative_path()));

        let mut albums = BTreeMap::new();
        for (access, meta) in resolved {
            let id = match meta {
                Ok(AlbumMeta {
                    album_id: Some(id), ..
                }) => id,
                Ok(_) => {
                    warn!(album = %access.full_path(), "album has no id, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(album = %access.full_path(), error = %e, "cannot read album metadata, skipping");
                    continue;
                }
            };
            match albums.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert(access);
                }
                Entry::Occupied(slot) => {
                    warn!(
                        album = %id,
                        kept = %slot.get().full_path(),
                        skipped = %access.full_path(),
                        "duplicate album id"
                    );
                }
            }
        }
        info!(root = %self.root.display(), albums = albums.len(), "album discovery finished");
        Ok(Arc::new(AlbumCatalog { albums }))
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub async fn get_album(&self, id: &AlbumId) -> DirectoryResult<Option<RepositoryAccess>> {
        Ok(self.catalog().await?.get(id).cloned())
    }

    /// Every album, in album id order.
    pub async fn list_albums(&self) -> DirectoryResult<Vec<(AlbumId, RepositoryAccess)>> {
        Ok(self
            .catalog()
            .await?
            .iter()
            .map(|(id, access)| (*id, access.clone()))
            .collect())
    }

    /// Find an album by id, root-relative path or name (album title).
    pub async fn lookup_album(
        &self,
        key: &str,
    ) -> DirectoryResult<Option<(AlbumId, RepositoryAccess)>> {
        let catalog = self.catalog().await?;
        if let Ok(id) = AlbumId::parse(key) {
            return Ok(catalog.get(&id).map(|access| (id, access.clone())));
        }
        let key = key.trim_end_matches('/');
        if let Some((id, access)) = catalog.iter().find(|(_, access)| access.full_path() == key) {
            return Ok(Some((*id, access.clone())));
        }
        for (id, access) in catalog.iter() {
            if access.name().await? == key {
                return Ok(Some((*id, access.clone())));
            }
        }
        Ok(None)
    }

    pub async fn album_meta(&self, id: &AlbumId) -> DirectoryResult<Option<AlbumMeta>> {
        match self.get_album(id).await? {
            Some(access) => Ok(Some(access.get_metadata().await?)),
            None => Ok(None),
        }
    }

    /// Distinct parent directories of all albums, root-relative and sorted.
    /// Albums directly under the root contribute nothing.
    pub async fn list_parent_dirs(&self) -> DirectoryResult<Vec<String>> {
        let catalog = self.catalog().await?;
        let parents: BTreeSet<String> = catalog
            .iter()
            .filter_map(|(_, access)| {
                access
                    .full_path()
                    .rsplit_once('/')
                    .map(|(parent, _)| parent.to_string())
            })
            .collect();
        Ok(parents.into_iter().collect())
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// The merged autoadd index, rebuilt when its cache has expired.
    pub async fn autoadd_index(&self) -> DirectoryResult<Arc<AutoaddIndex>> {
        self.autoadd.get_or_load(|| self.build_autoadd_index()).await
    }

    async fn build_autoadd_index(&self) -> DirectoryResult<Arc<AutoaddIndex>> {
        let catalog = self.catalog().await?;
        let context = AdmissionContext::current();
        let mut tasks = JoinSet::new();
        for (id, access) in catalog.iter() {
            let (id, access) = (*id, access.clone());
            let limiter = self.limiter.clone();
            tasks.spawn(context.clone().scope(async move {
                let markers = limiter.scope(access.read_autoadd()).await;
                (id, access, markers)
            }));
        }
        let mut markers: Vec<(DateTime<Utc>, AlbumId)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (id, access, result) = joined?;
            match result {
                Ok(instants) => markers.extend(instants.into_iter().map(|t| (t, id))),
                Err(e) => {
                    warn!(album = %access.full_path(), error = %e, "ignoring unreadable autoadd markers")
                }
            }
        }
        let index = AutoaddIndex::from_markers(markers);
        debug!(markers = index.len(), "autoadd index built");
        Ok(Arc::new(index))
    }

    /// The album whose greatest autoadd marker is at or before `t`.
    pub async fn resolve_album_for_timestamp(
        &self,
        t: DateTime<Utc>,
    ) -> DirectoryResult<Option<AlbumId>> {
        Ok(self.autoadd_index().await?.resolve(t))
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create an empty bare album at `segments` (the last one names the
    /// album), assign its id and make it resolvable immediately.
    pub async fn create_album<S: AsRef<str>>(&self, segments: &[S]) -> DirectoryResult<AlbumId> {
        let relative = album_relative_path(segments)?;
        let path = self.root.join(&relative);
        if path.exists() {
            return Err(DirectoryError::AlbumExists(path));
        }
        let git_dir = path.clone();
        let created = self
            .limiter
            .limit(async move {
                tokio::task::spawn_blocking(move || Repository::init_bare(&git_dir)).await
            })
            .await?;
        match created {
            Ok(_) => {}
            // Another creator got there between the check above and init.
            Err(RepoError::AlreadyExists(_)) => return Err(DirectoryError::AlbumExists(path)),
            Err(e) => return Err(e.into()),
        }

        let access = RepositoryAccess::open(
            &path,
            &relative,
            self.limiter.clone(),
            self.access_config.clone(),
        );
        let id = AlbumId::random();
        let title = access.directory_name();
        access
            .update_metadata(
                |mut meta| {
                    meta.album_id = Some(id);
                    meta.album_title = Some(title.clone());
                    meta
                },
                &access.commit_context(format!("create album {title}")),
            )
            .await?;
        self.accesses
            .lock()
            .expect("lock poisoned")
            .insert(path, access);
        self.rescan().await?;
        info!(album = %id, path = %relative.display(), "album created");
        Ok(id)
    }
}

impl std::fmt::Debug for RepositoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryDirectory")
            .field("root", &self.root)
            .field("limiter", &self.limiter.describe_state())
            .finish()
    }
}
