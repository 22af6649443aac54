//! Reference management for RAOA album repositories.
//!
//! An album repository has exactly one mutable pointer: the branch ref
//! `refs/heads/master`, naming the commit of the current snapshot. `HEAD` is a
//! symbolic ref naming that branch. History is strictly linear; the ref only
//! ever advances through [`RefStore::compare_and_swap`], which is how
//! concurrent writers are serialized without holding a lock across a batch.
//!
//! # Modules
//!
//! - [`error`] — Error types for ref operations
//! - [`types`] — [`Head`], [`RefUpdate`] and the well-known ref names
//! - [`traits`] — The [`RefStore`] trait defining the storage interface
//! - [`names`] — Ref name validation
//! - [`memory`] — In-memory [`InMemoryRefStore`] for tests
//! - [`file`] — [`FileRefStore`], lock-file based refs inside a git directory

pub mod error;
pub mod file;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, Result};
pub use file::{FileRefStore, DEFAULT_STALE_LOCK_AFTER};
pub use memory::InMemoryRefStore;
pub use names::validate_ref_name;
pub use traits::RefStore;
pub use types::{Head, RefUpdate, HEAD, MASTER_REF};
