//! Album discovery and timestamp routing for RAOA.
//!
//! [`RepositoryDirectory`] finds every album repository under a storage root,
//! maps album ids to [`RepositoryAccess`](raoa_repo::RepositoryAccess)
//! instances and answers "which album owns this capture time" from the merged
//! autoadd markers. [`AlbumImporter`] builds on it to stage captured files in
//! the right album and land them one commit per album.

pub mod config;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod importer;
pub mod paths;
pub mod routing;

pub use config::{Author, CacheConfig, StorageConfig};
pub use directory::{AlbumCatalog, RepositoryDirectory};
pub use discovery::{discover, is_repository_boundary, DiscoveredRepository};
pub use error::{DirectoryError, DirectoryResult};
pub use importer::{import_entry_name, AlbumImporter, ImportResult};
pub use paths::album_relative_path;
pub use routing::AutoaddIndex;
