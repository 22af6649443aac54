use std::path::PathBuf;

use raoa_types::ObjectId;
use thiserror::Error;

/// Errors from repository access and commit operations.
///
/// Absence is never an error on the read path (reads return `Option`), and a
/// lost ref race is a [`CommitOutcome::Conflict`](crate::CommitOutcome), not
/// an `Err`.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("store error: {0}")]
    Store(#[from] raoa_store::StoreError),

    #[error("ref error: {0}")]
    Ref(#[from] raoa_refs::RefError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// An object referenced by a commit or tree is absent from the store.
    #[error("missing object {0}")]
    MissingObject(ObjectId),

    /// The commit builder is not open (already committed, failed or closed).
    #[error("invalid builder state: {0}")]
    InvalidState(String),

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid autoadd line {line:?}: {reason}")]
    InvalidAutoadd { line: String, reason: String },

    #[error("already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("not a repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// Every attempt of a retried update lost the ref race.
    #[error("gave up after {attempts} conflicting attempts")]
    ConflictExhausted { attempts: u32 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for RepoError {
    fn from(e: tokio::task::JoinError) -> Self {
        RepoError::Internal(format!("worker failed: {e}"))
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
