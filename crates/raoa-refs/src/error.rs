//! Error types for reference operations.

use thiserror::Error;

/// Errors that can occur during reference operations.
///
/// A lost compare-and-swap is not an error; it is reported as
/// [`RefUpdate::Rejected`](crate::types::RefUpdate::Rejected).
#[derive(Debug, Error)]
pub enum RefError {
    /// The ref name is invalid.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidRefName { name: String, reason: String },

    /// A ref file exists but does not hold a valid commit id.
    #[error("corrupt ref {name}: {reason}")]
    Corrupt { name: String, reason: String },

    /// I/O error during file-based ref operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
