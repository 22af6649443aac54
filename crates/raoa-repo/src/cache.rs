use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct Entry<T> {
    value: T,
    loaded_at: Instant,
    generation: u64,
}

/// A single cached value with a time-to-live and single-flight reloads.
///
/// Concurrent callers that miss the cache wait on one shared load instead of
/// each running their own. [`invalidate`](TtlCache::invalidate) never blocks:
/// it bumps a generation counter, so a load already in flight is stored but
/// treated as stale by the next reader.
pub struct TtlCache<T> {
    ttl: Duration,
    entry: Mutex<Option<Entry<T>>>,
    generation: AtomicU64,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Return the cached value, or run `load` to refresh it.
    ///
    /// A failed load leaves the previous entry in place (already expired) and
    /// is not cached.
    pub async fn get_or_load<F, Fut, E>(&self, load: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut entry = self.entry.lock().await;
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(current) = entry.as_ref() {
            if current.generation == generation && current.loaded_at.elapsed() < self.ttl {
                return Ok(current.value.clone());
            }
        }
        let value = load().await?;
        *entry = Some(Entry {
            value: value.clone(),
            loaded_at: Instant::now(),
            generation,
        });
        Ok(value)
    }

    /// The cached value if present and fresh, without loading.
    pub fn peek(&self) -> Option<T> {
        let entry = self.entry.try_lock().ok()?;
        let current = entry.as_ref()?;
        let fresh = current.generation == self.generation.load(Ordering::Acquire)
            && current.loaded_at.elapsed() < self.ttl;
        fresh.then(|| current.value.clone())
    }

    /// Mark the cached value stale.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<T> std::fmt::Debug for TtlCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    async fn counting_load(counter: &AtomicUsize) -> Result<usize, ()> {
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[tokio::test]
    async fn fresh_value_is_reused() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let loads = AtomicUsize::new(0);
        assert_eq!(cache.get_or_load(|| counting_load(&loads)).await, Ok(1));
        assert_eq!(cache.get_or_load(|| counting_load(&loads)).await, Ok(1));
        assert_eq!(cache.peek(), Some(1));
    }

    #[tokio::test]
    async fn expired_value_is_reloaded() {
        let cache = TtlCache::new(Duration::from_millis(5));
        let loads = AtomicUsize::new(0);
        cache.get_or_load(|| counting_load(&loads)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.peek(), None);
        assert_eq!(cache.get_or_load(|| counting_load(&loads)).await, Ok(2));
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let loads = AtomicUsize::new(0);
        cache.get_or_load(|| counting_load(&loads)).await.unwrap();
        cache.invalidate();
        assert_eq!(cache.peek(), None);
        assert_eq!(cache.get_or_load(|| counting_load(&loads)).await, Ok(2));
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let cache: TtlCache<usize> = TtlCache::new(Duration::from_secs(60));
        let failed: Result<usize, &str> = cache.get_or_load(|| async { Err("io") }).await;
        assert!(failed.is_err());
        let ok: Result<usize, &str> = cache.get_or_load(|| async { Ok(9) }).await;
        assert_eq!(ok, Ok(9));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_load() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let loads = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load(|| async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        counting_load(&loads).await
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(1));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
