//! Per-album repository access for RAOA.
//!
//! A [`RepositoryAccess`] wraps one album repository: it resolves the current
//! snapshot, streams file listings under credit, reads objects and sidecars,
//! and hands out [`CommitBuilder`]s that land batches atomically with a
//! compare-and-swap of the branch ref. All blocking work is admitted through
//! a shared [`AdmissionLimiter`](raoa_limiter::AdmissionLimiter).

pub mod access;
pub mod builder;
pub mod cache;
pub mod checkout;
pub mod config;
pub mod error;
pub mod listing;
pub mod metadata;
pub mod repository;
pub mod retry;
pub mod snapshot;

pub use access::RepositoryAccess;
pub use builder::{
    BuilderState, CommitBuilder, CommitContext, CommitOutcome, ImportOutcome, StagedChange,
};
pub use cache::TtlCache;
pub use checkout::{strategy_for, CheckoutStrategy, MaterializeMissing, NoCheckout};
pub use config::AccessConfig;
pub use error::{RepoError, RepoResult};
pub use listing::{FileListing, PathFilter};
pub use metadata::{
    parse_autoadd, parse_instant, render_autoadd, AlbumMeta, AUTOADD_FILE, METADATA_FILE,
};
pub use repository::{Repository, RepositoryLayout, BARE_SUFFIX, GIT_DIR_NAME};
pub use retry::RetryPolicy;
pub use snapshot::{validate_entry_path, FileEntry, Snapshot};

// Re-export key types
pub use raoa_store::{Blob, Person};
pub use raoa_types::{AlbumId, ObjectId};
