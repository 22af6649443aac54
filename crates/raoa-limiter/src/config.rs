use serde::{Deserialize, Serialize};

/// Configuration for the admission limiter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Maximum number of admitted operations running at once.
    pub max_concurrent: usize,
    /// Use the reentrant variant (nested calls on the same limiter do not
    /// take a root slot).
    pub reentrant: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 30,
            reentrant: true,
        }
    }
}

impl LimiterConfig {
    /// Capacity actually used; a configured zero is treated as one.
    pub fn effective_capacity(&self) -> usize {
        self.max_concurrent.max(1)
    }
}
