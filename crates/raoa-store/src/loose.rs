use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use raoa_types::ObjectId;
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

/// One-file-per-object store rooted at a repository's `objects/` directory.
///
/// An object with id `aabbcc…` lives at `objects/aa/bbcc…`. The file holds a
/// `<kind> <len>\0` header followed by the raw object data. Writes go to a
/// temporary file in the fan-out directory and are renamed into place, so a
/// reader never observes a partially written object.
#[derive(Clone, Debug)]
pub struct LooseObjectStore {
    root: PathBuf,
}

impl LooseObjectStore {
    /// Open a store rooted at `root` (usually `<git dir>/objects`).
    ///
    /// The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The `objects/` directory this store reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the loose file for `id`.
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    fn encode(object: &StoredObject) -> Vec<u8> {
        let mut out = format!("{} {}\0", object.kind, object.data.len()).into_bytes();
        out.extend_from_slice(&object.data);
        out
    }

    fn decode(id: &ObjectId, raw: Vec<u8>) -> StoreResult<StoredObject> {
        let corrupt = |reason: &str| StoreError::CorruptObject {
            id: *id,
            reason: reason.to_string(),
        };
        let nul = raw
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| corrupt("missing header terminator"))?;
        let header = std::str::from_utf8(&raw[..nul]).map_err(|_| corrupt("header is not UTF-8"))?;
        let (tag, len) = header
            .split_once(' ')
            .ok_or_else(|| corrupt("malformed header"))?;
        let kind = ObjectKind::from_tag(tag).ok_or_else(|| corrupt("unknown object kind"))?;
        let len: usize = len.parse().map_err(|_| corrupt("malformed length"))?;
        let data = raw[nul + 1..].to_vec();
        if data.len() != len {
            return Err(corrupt("length does not match header"));
        }
        Ok(StoredObject::new(kind, data))
    }
}

impl ObjectStore for LooseObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let raw = match std::fs::read(self.object_path(id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let object = Self::decode(id, raw)?;
        let computed = object.compute_id();
        if computed != *id {
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(Some(object))
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Io(std::io::Error::other("object path has no parent")))?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&Self::encode(object))?;
        tmp.as_file().sync_all()?;
        match tmp.persist(&path) {
            Ok(_) => {}
            // A concurrent writer landed the same object first.
            Err(e) if path.exists() => drop(e),
            Err(e) => return Err(e.error.into()),
        }
        trace!(id = %id, kind = %object.kind, size = object.size, "wrote loose object");
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).is_file())
    }
}
