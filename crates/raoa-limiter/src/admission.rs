use std::future::Future;

use crate::config::LimiterConfig;
use crate::flat::FlatLimiter;
use crate::reentrant::ReentrantLimiter;

/// The gate every blocking or CPU-heavy storage operation passes through.
///
/// Both variants share one contract: [`limit`](AdmissionLimiter::limit) starts
/// the wrapped operation only once a slot is free and releases the slot when
/// the operation completes, fails or is dropped. Cloning shares the gate.
#[derive(Clone, Debug)]
pub enum AdmissionLimiter {
    /// Plain capacity gate; nested calls take slots of their own.
    Flat(FlatLimiter),
    /// Capacity gate whose nested calls never wait on their own ancestors.
    Reentrant(ReentrantLimiter),
}

impl AdmissionLimiter {
    /// Build the limiter described by `config`.
    pub fn from_config(config: &LimiterConfig) -> Self {
        let capacity = config.effective_capacity();
        if config.reentrant {
            Self::Reentrant(ReentrantLimiter::new(capacity))
        } else {
            Self::Flat(FlatLimiter::new(capacity))
        }
    }

    /// A flat limiter with `capacity` slots.
    pub fn flat(capacity: usize) -> Self {
        Self::Flat(FlatLimiter::new(capacity))
    }

    /// A reentrant limiter with `capacity` root slots.
    pub fn reentrant(capacity: usize) -> Self {
        Self::Reentrant(ReentrantLimiter::new(capacity))
    }

    /// Run `operation` once admitted.
    pub async fn limit<F>(&self, operation: F) -> F::Output
    where
        F: Future,
    {
        match self {
            Self::Flat(limiter) => limiter.limit(operation).await,
            Self::Reentrant(limiter) => limiter.limit(operation).await,
        }
    }

    /// Run `operation` as one admitted unit where slots nest.
    ///
    /// With the reentrant variant the operation holds a slot and every
    /// `limit` call inside it passes through that slot's private gate, so a
    /// lock taken inside is never held while waiting for a root slot. Flat
    /// slots do not nest; there the operation runs unadmitted and its inner
    /// steps take slots of their own.
    pub async fn scope<F>(&self, operation: F) -> F::Output
    where
        F: Future,
    {
        match self {
            Self::Flat(_) => operation.await,
            Self::Reentrant(limiter) => limiter.limit(operation).await,
        }
    }

    /// Slots currently held (root slots for the reentrant variant).
    pub fn running(&self) -> usize {
        match self {
            Self::Flat(limiter) => limiter.running(),
            Self::Reentrant(limiter) => limiter.running(),
        }
    }

    /// Waiters queued for a slot.
    pub fn queued(&self) -> usize {
        match self {
            Self::Flat(limiter) => limiter.queued(),
            Self::Reentrant(limiter) => limiter.queued(),
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        match self {
            Self::Flat(limiter) => limiter.capacity(),
            Self::Reentrant(limiter) => limiter.capacity(),
        }
    }

    /// Human-readable `(running/capacity), queue: n` summary.
    pub fn describe_state(&self) -> String {
        match self {
            Self::Flat(limiter) => limiter.describe_state(),
            Self::Reentrant(limiter) => limiter.describe_state(),
        }
    }
}

impl Default for AdmissionLimiter {
    fn default() -> Self {
        Self::from_config(&LimiterConfig::default())
    }
}
