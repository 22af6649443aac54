//! Content-addressed object storage for RAOA album repositories.
//!
//! This crate implements a hash-keyed object store analogous to git's
//! `.git/objects/` directory. Every piece of album data -- media files,
//! directory listings, commits -- is stored as an immutable object identified
//! by its truncated BLAKE3 hash (domain-separated by object kind).
//!
//! # Object Types
//!
//! - [`Blob`] -- raw content (photos, videos, sidecar files)
//! - [`Tree`] -- directory listing mapping names to object references
//! - [`CommitObject`] -- a snapshot of the root tree plus its single parent
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`LooseObjectStore`] -- one file per object under `objects/xx/…`
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Write-then-link: objects land before any ref points at them.
//! 3. Concurrent reads are always safe (objects are immutable).
//! 4. Absence is `Ok(None)`, never an error.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod hasher;
pub mod loose;
pub mod memory;
pub mod object;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use hasher::ContentHasher;
pub use loose::LooseObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{
    Blob, CommitObject, EntryMode, ObjectKind, Person, StoredObject, Tree, TreeEntry,
};
pub use traits::ObjectStore;
