use std::time::Duration;

use raoa_store::Person;

use crate::retry::RetryPolicy;

/// Author recorded on commits made by the storage engine itself.
pub const DEFAULT_AUTHOR_NAME: &str = "raoa-importer";
pub const DEFAULT_AUTHOR_EMAIL: &str = "photos@raoa.local";

/// Tuning for one [`RepositoryAccess`](crate::RepositoryAccess).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessConfig {
    /// How long an opened repository handle is reused.
    pub repository_ttl: Duration,
    /// How long a resolved snapshot is reused before the ref is read again.
    pub snapshot_ttl: Duration,
    /// How long parsed album metadata is reused.
    pub metadata_ttl: Duration,
    pub retry: RetryPolicy,
    pub author: Person,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            repository_ttl: Duration::from_secs(20),
            snapshot_ttl: Duration::from_secs(20),
            metadata_ttl: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            author: Person::new(DEFAULT_AUTHOR_NAME, DEFAULT_AUTHOR_EMAIL),
        }
    }
}
