use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use raoa_refs::{FileRefStore, InMemoryRefStore, RefStore, RefUpdate, MASTER_REF};
use raoa_store::{
    Blob, CommitObject, EntryMode, InMemoryObjectStore, LooseObjectStore, ObjectKind,
    ObjectStore, Tree, TreeEntry,
};
use raoa_types::ObjectId;
use tracing::debug;

use crate::error::{RepoError, RepoResult};
use crate::snapshot::{FileEntry, Snapshot};

/// Suffix that marks a bare repository directory.
pub const BARE_SUFFIX: &str = ".git";

/// Name of the git directory inside a non-bare working tree.
pub const GIT_DIR_NAME: &str = ".git";

/// Where a repository lives on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryLayout {
    /// Directory holding `HEAD`, `objects/` and `refs/`.
    pub git_dir: PathBuf,
    /// Checked-out files; `None` for bare repositories.
    pub work_tree: Option<PathBuf>,
}

impl RepositoryLayout {
    /// Detect the layout of the repository whose boundary directory is `path`.
    ///
    /// `path` is either a bare git directory or a working tree containing a
    /// `.git` subdirectory.
    pub fn detect(path: &Path) -> RepoResult<Self> {
        let nested = path.join(GIT_DIR_NAME);
        if nested.is_dir() {
            return Ok(Self {
                git_dir: nested,
                work_tree: Some(path.to_path_buf()),
            });
        }
        if path.join("HEAD").is_file() && path.join("objects").is_dir() {
            return Ok(Self {
                git_dir: path.to_path_buf(),
                work_tree: None,
            });
        }
        Err(RepoError::NotARepository(path.to_path_buf()))
    }

    pub fn is_bare(&self) -> bool {
        self.work_tree.is_none()
    }

    /// The directory that identifies the repository: the working tree, or
    /// the git directory for bare repositories.
    pub fn boundary(&self) -> &Path {
        self.work_tree.as_deref().unwrap_or(&self.git_dir)
    }
}

/// An opened repository: object store plus refs.
///
/// All methods perform blocking I/O; async callers run them on a blocking
/// worker behind the admission limiter.
pub struct Repository {
    layout: RepositoryLayout,
    objects: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
}

impl Repository {
    /// Open an existing repository at its boundary directory.
    pub fn open(path: &Path) -> RepoResult<Self> {
        let layout = RepositoryLayout::detect(path)?;
        debug!(path = %path.display(), bare = layout.is_bare(), "opened repository");
        Ok(Self::from_layout(layout))
    }

    /// Create an empty bare repository at `git_dir`.
    pub fn init_bare(git_dir: &Path) -> RepoResult<Self> {
        Self::init_layout(RepositoryLayout {
            git_dir: git_dir.to_path_buf(),
            work_tree: None,
        })
    }

    /// Create an empty repository with a working tree at `work_tree`.
    pub fn init(work_tree: &Path) -> RepoResult<Self> {
        Self::init_layout(RepositoryLayout {
            git_dir: work_tree.join(GIT_DIR_NAME),
            work_tree: Some(work_tree.to_path_buf()),
        })
    }

    /// A bare repository that lives entirely in memory.
    pub fn in_memory() -> Self {
        Self::with_stores(
            RepositoryLayout {
                git_dir: PathBuf::from("<memory>"),
                work_tree: None,
            },
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryRefStore::new()),
        )
    }

    /// Assemble a repository from explicit backends.
    pub fn with_stores(
        layout: RepositoryLayout,
        objects: Arc<dyn ObjectStore>,
        refs: Arc<dyn RefStore>,
    ) -> Self {
        Self {
            layout,
            objects,
            refs,
        }
    }

    fn init_layout(layout: RepositoryLayout) -> RepoResult<Self> {
        std::fs::create_dir_all(&layout.git_dir)?;
        // Creating HEAD exclusively decides which of two racing initializers wins.
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(layout.git_dir.join("HEAD"))
        {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(RepoError::AlreadyExists(layout.git_dir.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        std::fs::create_dir_all(layout.git_dir.join("objects"))?;
        std::fs::create_dir_all(layout.git_dir.join("refs").join("heads"))?;
        let repo = Self::from_layout(layout);
        repo.refs.set_head(MASTER_REF)?;
        debug!(path = %repo.layout.boundary().display(), "initialized repository");
        Ok(repo)
    }

    fn from_layout(layout: RepositoryLayout) -> Self {
        let objects = Arc::new(LooseObjectStore::new(layout.git_dir.join("objects")));
        let refs = Arc::new(FileRefStore::new(&layout.git_dir));
        Self::with_stores(layout, objects, refs)
    }

    pub fn layout(&self) -> &RepositoryLayout {
        &self.layout
    }

    pub fn is_bare(&self) -> bool {
        self.layout.is_bare()
    }

    pub fn objects(&self) -> &dyn ObjectStore {
        self.objects.as_ref()
    }

    pub fn refs(&self) -> &dyn RefStore {
        self.refs.as_ref()
    }

    /// The branch ref commits advance.
    pub fn branch(&self) -> RepoResult<String> {
        Ok(self.refs.current_branch()?)
    }

    /// The commit the branch currently points to.
    pub fn head_commit(&self) -> RepoResult<Option<ObjectId>> {
        Ok(self.refs.read_ref(&self.branch()?)?)
    }

    /// Resolve the current snapshot (commit plus root tree).
    pub fn read_snapshot(&self) -> RepoResult<Snapshot> {
        match self.head_commit()? {
            Some(commit_id) => {
                let commit = self.read_commit(&commit_id)?;
                let tree = self.read_tree(&commit.tree)?;
                Ok(Snapshot {
                    commit: Some(commit_id),
                    tree_id: commit.tree,
                    tree: Arc::new(tree),
                })
            }
            None => {
                let tree = Tree::empty();
                let tree_id = tree.to_stored_object()?.compute_id();
                Ok(Snapshot {
                    commit: None,
                    tree_id,
                    tree: Arc::new(tree),
                })
            }
        }
    }

    pub fn read_commit(&self, id: &ObjectId) -> RepoResult<CommitObject> {
        let obj = self
            .objects
            .read(id)?
            .ok_or(RepoError::MissingObject(*id))?;
        Ok(CommitObject::from_stored_object(&obj)?)
    }

    pub fn read_tree(&self, id: &ObjectId) -> RepoResult<Tree> {
        let obj = self
            .objects
            .read(id)?
            .ok_or(RepoError::MissingObject(*id))?;
        Ok(Tree::from_stored_object(&obj)?)
    }

    /// Read a blob by hash; `None` if absent or not a blob.
    pub fn read_blob(&self, id: &ObjectId) -> RepoResult<Option<Blob>> {
        match self.objects.read(id)? {
            Some(obj) if obj.kind == ObjectKind::Blob => Ok(Some(Blob::from_stored_object(obj)?)),
            _ => Ok(None),
        }
    }

    pub fn write_blob(&self, data: Vec<u8>) -> RepoResult<ObjectId> {
        Ok(self.objects.write(&Blob::new(data).into_stored_object())?)
    }

    /// Resolve a slash-separated path against `tree`.
    pub fn lookup(&self, tree: &Tree, path: &str) -> RepoResult<Option<TreeEntry>> {
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        let mut current = tree.clone();
        while let Some(name) = components.next() {
            let Some(entry) = current.get(name).cloned() else {
                return Ok(None);
            };
            if components.peek().is_none() {
                return Ok(Some(entry));
            }
            if !entry.mode.is_directory() {
                return Ok(None);
            }
            current = self.read_tree(&entry.object_id)?;
        }
        Ok(None)
    }

    /// Every file of `tree`, depth first, in lexical path order.
    pub fn flatten(&self, tree: &Tree) -> RepoResult<Vec<FileEntry>> {
        let mut out = Vec::new();
        self.walk(tree, |entry| {
            out.push(entry);
            true
        })?;
        Ok(out)
    }

    /// Depth-first walk over the files of `tree`; `visit` returns `false` to
    /// stop early.
    pub fn walk<F>(&self, tree: &Tree, mut visit: F) -> RepoResult<()>
    where
        F: FnMut(FileEntry) -> bool,
    {
        let mut stack: Vec<(String, std::vec::IntoIter<TreeEntry>)> =
            vec![(String::new(), tree.entries.clone().into_iter())];
        while let Some((prefix, iter)) = stack.last_mut() {
            let Some(entry) = iter.next() else {
                stack.pop();
                continue;
            };
            let path = format!("{prefix}{}", entry.name);
            if entry.mode.is_directory() {
                let subtree = self.read_tree(&entry.object_id)?;
                stack.push((format!("{path}/"), subtree.entries.into_iter()));
            } else if !visit(FileEntry::new(path, entry.mode, entry.object_id)) {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Write the nested trees for a flat path map and return the root id.
    pub fn write_tree(&self, files: &BTreeMap<String, FileEntry>) -> RepoResult<ObjectId> {
        let mut root = DirNode::default();
        for entry in files.values() {
            root.insert(&entry.path, entry)?;
        }
        root.write(self.objects.as_ref())
    }

    /// Write a commit object on top of `parent`.
    pub fn write_commit(&self, commit: &CommitObject) -> RepoResult<ObjectId> {
        Ok(self.objects.write(&commit.to_stored_object()?)?)
    }

    /// Compare-and-swap the branch from `expected` to `new`.
    pub fn update_branch(
        &self,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> RepoResult<RefUpdate> {
        Ok(self.refs.compare_and_swap(&self.branch()?, expected, new)?)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("layout", &self.layout)
            .finish()
    }
}

#[derive(Default)]
struct DirNode {
    files: BTreeMap<String, (EntryMode, ObjectId)>,
    dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
    fn insert(&mut self, path: &str, entry: &FileEntry) -> RepoResult<()> {
        let conflict = || RepoError::InvalidPath {
            path: entry.path.clone(),
            reason: "a file and a directory share this name".into(),
        };
        match path.split_once('/') {
            None => {
                if self.dirs.contains_key(path) {
                    return Err(conflict());
                }
                self.files
                    .insert(path.to_string(), (entry.mode, entry.object_id));
            }
            Some((dir, rest)) => {
                if self.files.contains_key(dir) {
                    return Err(conflict());
                }
                self.dirs
                    .entry(dir.to_string())
                    .or_default()
                    .insert(rest, entry)?;
            }
        }
        Ok(())
    }

    fn write(&self, store: &dyn ObjectStore) -> RepoResult<ObjectId> {
        let mut entries = Vec::with_capacity(self.files.len() + self.dirs.len());
        for (name, (mode, id)) in &self.files {
            entries.push(TreeEntry::new(*mode, name.clone(), *id));
        }
        for (name, node) in &self.dirs {
            let id = node.write(store)?;
            entries.push(TreeEntry::new(EntryMode::Directory, name.clone(), id));
        }
        Ok(store.write(&Tree::new(entries).to_stored_object()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use raoa_store::Person;

    fn files(repo: &Repository, paths: &[&str]) -> BTreeMap<String, FileEntry> {
        paths
            .iter()
            .map(|p| {
                let id = repo.write_blob(p.as_bytes().to_vec()).unwrap();
                (p.to_string(), FileEntry::new(*p, EntryMode::Regular, id))
            })
            .collect()
    }

    fn commit_tree(repo: &Repository, tree: ObjectId, parent: Option<ObjectId>) -> ObjectId {
        let id = repo
            .write_commit(&CommitObject {
                tree,
                parent,
                author: Person::new("test", "test@example.com"),
                message: "test".into(),
                timestamp: Utc::now(),
            })
            .unwrap();
        assert!(repo.update_branch(parent, id).unwrap().is_updated());
        id
    }

    // -----------------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------------

    #[test]
    fn init_bare_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2023-holiday.git");
        Repository::init_bare(&path).unwrap();

        let repo = Repository::open(&path).unwrap();
        assert!(repo.is_bare());
        assert_eq!(repo.branch().unwrap(), MASTER_REF);
        assert!(repo.head_commit().unwrap().is_none());
        assert!(matches!(
            Repository::init_bare(&path),
            Err(RepoError::AlreadyExists(_))
        ));
    }

    #[test]
    fn init_with_work_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("party");
        Repository::init(&path).unwrap();

        let repo = Repository::open(&path).unwrap();
        assert!(!repo.is_bare());
        assert_eq!(repo.layout().work_tree.as_deref(), Some(path.as_path()));
        assert_eq!(repo.layout().boundary(), path.as_path());
    }

    #[test]
    fn plain_directory_is_not_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Repository::open(dir.path()),
            Err(RepoError::NotARepository(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Trees
    // -----------------------------------------------------------------------

    #[test]
    fn empty_repository_has_empty_snapshot() {
        let repo = Repository::in_memory();
        let snapshot = repo.read_snapshot().unwrap();
        assert!(snapshot.is_empty_repository());
        assert!(snapshot.tree.is_empty());
    }

    #[test]
    fn nested_tree_flattens_in_lexical_order() {
        let repo = Repository::in_memory();
        let map = files(&repo, &["b.jpg", "a/x.jpg", "a.jpg", "a0.jpg", "a/b/c.jpg"]);
        let root = repo.write_tree(&map).unwrap();
        let tree = repo.read_tree(&root).unwrap();

        let paths: Vec<_> = repo
            .flatten(&tree)
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        let mut expected: Vec<_> = map.keys().cloned().collect();
        expected.sort();
        assert_eq!(paths, expected);
    }

    #[test]
    fn lookup_resolves_nested_paths() {
        let repo = Repository::in_memory();
        let map = files(&repo, &["a.jpg", "raw/a.nef"]);
        let tree = repo.read_tree(&repo.write_tree(&map).unwrap()).unwrap();

        let entry = repo.lookup(&tree, "raw/a.nef").unwrap().unwrap();
        assert_eq!(entry.object_id, map["raw/a.nef"].object_id);
        assert!(repo.lookup(&tree, "raw/missing").unwrap().is_none());
        assert!(repo.lookup(&tree, "a.jpg/child").unwrap().is_none());
        assert!(repo.lookup(&tree, "").unwrap().is_none());
    }

    #[test]
    fn walk_stops_early() {
        let repo = Repository::in_memory();
        let map = files(&repo, &["a", "b", "c"]);
        let tree = repo.read_tree(&repo.write_tree(&map).unwrap()).unwrap();
        let mut seen = 0;
        repo.walk(&tree, |_| {
            seen += 1;
            seen < 2
        })
        .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn file_directory_collision_is_rejected() {
        let repo = Repository::in_memory();
        let map = files(&repo, &["a", "a/b"]);
        assert!(matches!(
            repo.write_tree(&map),
            Err(RepoError::InvalidPath { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Commits
    // -----------------------------------------------------------------------

    #[test]
    fn snapshot_follows_branch() {
        let repo = Repository::in_memory();
        let tree = repo.write_tree(&files(&repo, &["a.jpg"])).unwrap();
        let c1 = commit_tree(&repo, tree, None);

        let snapshot = repo.read_snapshot().unwrap();
        assert_eq!(snapshot.commit, Some(c1));
        assert_eq!(snapshot.tree_id, tree);
        assert!(snapshot.tree.get("a.jpg").is_some());

        let c2 = commit_tree(&repo, tree, Some(c1));
        assert_eq!(repo.read_commit(&c2).unwrap().parent, Some(c1));
    }

    #[test]
    fn dangling_branch_is_missing_object() {
        let repo = Repository::in_memory();
        let bogus = ObjectId::from_bytes(b"nowhere");
        repo.update_branch(None, bogus).unwrap();
        assert!(matches!(
            repo.read_snapshot(),
            Err(RepoError::MissingObject(id)) if id == bogus
        ));
    }

    #[test]
    fn read_blob_ignores_non_blobs() {
        let repo = Repository::in_memory();
        let tree = repo.write_tree(&BTreeMap::new()).unwrap();
        assert!(repo.read_blob(&tree).unwrap().is_none());
        let blob = repo.write_blob(b"x".to_vec()).unwrap();
        assert_eq!(repo.read_blob(&blob).unwrap().unwrap().data, b"x");
    }
}
