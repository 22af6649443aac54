use std::path::{Path, PathBuf};
use std::time::Duration;

use raoa_limiter::LimiterConfig;
use raoa_repo::config::{DEFAULT_AUTHOR_EMAIL, DEFAULT_AUTHOR_NAME};
use raoa_repo::{AccessConfig, Person, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::DirectoryResult;

/// Settings for one storage root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory scanned for album repositories.
    pub repository_root: PathBuf,
    pub limiter: LimiterConfig,
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
    pub author: Author,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            repository_root: PathBuf::from("./albums"),
            limiter: LimiterConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryPolicy::default(),
            author: Author::default(),
        }
    }
}

impl StorageConfig {
    /// Defaults with a different root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            repository_root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> DirectoryResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> DirectoryResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> DirectoryResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Per-repository settings derived from this config.
    pub fn access_config(&self) -> AccessConfig {
        AccessConfig {
            repository_ttl: Duration::from_secs(self.cache.repository_secs),
            snapshot_ttl: Duration::from_secs(self.cache.snapshot_secs),
            metadata_ttl: Duration::from_millis(self.cache.metadata_millis),
            retry: self.retry.clone(),
            author: self.author.to_person(),
        }
    }
}

/// Cache lifetimes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub repository_secs: u64,
    pub snapshot_secs: u64,
    pub metadata_millis: u64,
    /// Lifetime of the discovered album set.
    pub discovery_secs: u64,
    /// Lifetime of the merged autoadd routing index.
    pub autoadd_index_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            repository_secs: 20,
            snapshot_secs: 20,
            metadata_millis: 100,
            discovery_secs: 300,
            autoadd_index_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn discovery_ttl(&self) -> Duration {
        Duration::from_secs(self.discovery_secs)
    }

    pub fn autoadd_index_ttl(&self) -> Duration {
        Duration::from_secs(self.autoadd_index_secs)
    }
}

/// Commit author identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            name: DEFAULT_AUTHOR_NAME.into(),
            email: DEFAULT_AUTHOR_EMAIL.into(),
        }
    }
}

impl Author {
    pub fn to_person(&self) -> Person {
        Person::new(&self.name, &self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StorageConfig::default();
        assert_eq!(c.repository_root, PathBuf::from("./albums"));
        assert_eq!(c.limiter.max_concurrent, 30);
        assert_eq!(c.cache.discovery_secs, 300);
        assert_eq!(c.retry.max_attempts, 5);
        assert_eq!(c.author.name, "raoa-importer");

        let access = c.access_config();
        assert_eq!(access.snapshot_ttl, Duration::from_secs(20));
        assert_eq!(access.metadata_ttl, Duration::from_millis(100));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = StorageConfig::from_toml_str(
            r#"
            repository_root = "/srv/photos"

            [limiter]
            max_concurrent = 4

            [cache]
            snapshot_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(c.repository_root, PathBuf::from("/srv/photos"));
        assert_eq!(c.limiter.max_concurrent, 4);
        assert!(c.limiter.reentrant);
        assert_eq!(c.cache.snapshot_secs, 5);
        assert_eq!(c.cache.repository_secs, 20);
        assert_eq!(c.author, Author::default());
    }

    #[test]
    fn toml_round_trip() {
        let mut c = StorageConfig::with_root("/data");
        c.author.name = "someone".into();
        let text = c.to_toml_string().unwrap();
        assert_eq!(StorageConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn bad_toml_is_config_error() {
        assert!(matches!(
            StorageConfig::from_toml_str("repository_root = 3"),
            Err(crate::DirectoryError::Config(_))
        ));
    }
}
