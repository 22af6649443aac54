use raoa_types::ObjectId;

use crate::error::StoreResult;
use crate::object::StoredObject;

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. Content-addressing guarantees this:
///   the same data always produces the same ID.
/// - Writing an object that already exists is a no-op returning the same ID.
/// - Concurrent reads are always safe (objects are immutable).
/// - A missing object is `Ok(None)`; `Err` means I/O failure or corruption.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed ID.
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;
}
