use std::path::PathBuf;

use raoa_repo::RepoError;
use raoa_types::AlbumId;
use thiserror::Error;

/// Errors from discovery, routing and album creation.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid album path {path:?}: {reason}")]
    InvalidAlbumPath { path: String, reason: String },

    #[error("album already exists: {}", .0.display())]
    AlbumExists(PathBuf),

    #[error("not an importable file: {}", .0.display())]
    InvalidSource(PathBuf),

    #[error("unknown album {0}")]
    UnknownAlbum(AlbumId),
}

impl From<toml::de::Error> for DirectoryError {
    fn from(e: toml::de::Error) -> Self {
        DirectoryError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for DirectoryError {
    fn from(e: toml::ser::Error) -> Self {
        DirectoryError::Config(e.to_string())
    }
}

impl From<tokio::task::JoinError> for DirectoryError {
    fn from(e: tokio::task::JoinError) -> Self {
        DirectoryError::Repo(RepoError::from(e))
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;
