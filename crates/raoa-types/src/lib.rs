//! Foundation types for the RAOA album store.
//!
//! Every other `raoa-*` crate depends on this one.
//!
//! # Key Types
//!
//! - [`ObjectId`] — 20-byte content hash of a stored blob, tree or commit
//! - [`AlbumId`] — stable UUID identifying an album, independent of its path

pub mod album;
pub mod error;
pub mod object;

pub use album::AlbumId;
pub use error::TypeError;
pub use object::ObjectId;
