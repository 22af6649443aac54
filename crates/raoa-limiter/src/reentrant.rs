use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::context::AdmissionContext;
use crate::flat::FlatLimiter;

static NEXT_LIMITER_ID: AtomicU64 = AtomicU64::new(1);

/// Admission limiter that does not deadlock on nested use.
///
/// A top-level `limit` takes a slot from the root [`FlatLimiter`] and runs the
/// operation with an [`AdmissionContext`] recording that this limiter admitted
/// it, together with a fresh private gate of capacity 1. A `limit` call made
/// inside that operation on the same limiter is admitted through the private
/// gate instead of the root: a single nested call passes straight through,
/// while siblings of a nested fan-out run one at a time. Each admitted level
/// gets its own private gate, so deeper nesting never waits on an ancestor.
#[derive(Clone)]
pub struct ReentrantLimiter {
    id: u64,
    root: FlatLimiter,
}

impl ReentrantLimiter {
    /// Create a limiter with `capacity` root slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            id: NEXT_LIMITER_ID.fetch_add(1, Ordering::Relaxed),
            root: FlatLimiter::new(capacity),
        }
    }

    /// Unique identity of this limiter (shared by its clones).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run `operation` under this limiter.
    pub async fn limit<F>(&self, operation: F) -> F::Output
    where
        F: Future,
    {
        let ctx = AdmissionContext::current();
        let gate = match ctx.frame_for(self.id) {
            Some(frame) => {
                trace!(limiter = self.id, "nested admission");
                frame.nested.clone()
            }
            None => self.root.clone(),
        };
        let _slot = gate.acquire().await;
        ctx.enter(self.id).scope(operation).await
    }

    /// Returns `true` if the current task already runs inside a slot of
    /// this limiter.
    pub fn is_admitted(&self) -> bool {
        AdmissionContext::current().is_admitted_by(self.id)
    }

    /// Root slots currently held.
    pub fn running(&self) -> usize {
        self.root.running()
    }

    /// Operations waiting for a root slot.
    pub fn queued(&self) -> usize {
        self.root.queued()
    }

    /// Root capacity.
    pub fn capacity(&self) -> usize {
        self.root.capacity()
    }

    /// Human-readable summary of the root gate.
    pub fn describe_state(&self) -> String {
        self.root.describe_state()
    }
}

impl std::fmt::Debug for ReentrantLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReentrantLimiter")
            .field("id", &self.id)
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn nested_call_does_not_take_a_root_slot() {
        let limiter = ReentrantLimiter::new(1);
        let inner = limiter.clone();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            limiter.limit(async move {
                assert!(inner.is_admitted());
                let running = inner.running();
                let nested = inner.limit(async { 42 }).await;
                (running, nested, inner.running())
            }),
        )
        .await
        .expect("nested call deadlocked");
        assert_eq!(result, (1, 42, 1));
        assert_eq!(limiter.running(), 0);
        assert!(!limiter.is_admitted());
    }

    #[tokio::test]
    async fn deep_nesting_does_not_deadlock() {
        let limiter = ReentrantLimiter::new(1);
        let l1 = limiter.clone();
        let depth = tokio::time::timeout(
            Duration::from_secs(5),
            limiter.limit(async move {
                let l2 = l1.clone();
                l1.limit(async move {
                    let l3 = l2.clone();
                    l2.limit(async move { l3.limit(async { 3 }).await }).await
                })
                .await
            }),
        )
        .await
        .expect("deep nesting deadlocked");
        assert_eq!(depth, 3);
    }

    #[tokio::test]
    async fn nested_fan_out_is_serialized() {
        let limiter = ReentrantLimiter::new(4);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let inner = limiter.clone();
        let (c, p) = (Arc::clone(&current), Arc::clone(&peak));
        limiter
            .limit(async move {
                let ctx = AdmissionContext::current();
                let mut children = tokio::task::JoinSet::new();
                for _ in 0..6 {
                    let inner = inner.clone();
                    let (c, p) = (Arc::clone(&c), Arc::clone(&p));
                    children.spawn(ctx.clone().scope(async move {
                        inner
                            .limit(async move {
                                let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                                p.fetch_max(now, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(2)).await;
                                c.fetch_sub(1, Ordering::SeqCst);
                            })
                            .await
                    }));
                }
                while let Some(joined) = children.join_next().await {
                    joined.unwrap();
                }
            })
            .await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn separate_limiters_do_not_share_context() {
        let a = ReentrantLimiter::new(1);
        let b = ReentrantLimiter::new(1);
        let (a2, b2) = (a.clone(), b.clone());
        a.limit(async move {
            assert!(a2.is_admitted());
            assert!(!b2.is_admitted());
            let b3 = b2.clone();
            b2.limit(async move {
                assert!(b3.is_admitted());
                assert_eq!(b3.running(), 1);
            })
            .await;
            // Still inside a; a nested call must not wait on the held slot.
            a2.limit(async {}).await;
        })
        .await;
        assert_eq!(a.running(), 0);
        assert_eq!(b.running(), 0);
    }

    #[tokio::test]
    async fn top_level_calls_respect_capacity() {
        let limiter = ReentrantLimiter::new(2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            let (c, p) = (Arc::clone(&current), Arc::clone(&peak));
            handles.push(tokio::spawn(async move {
                limiter
                    .limit(async move {
                        let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                        p.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        c.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn spawned_task_inherits_explicit_context() {
        let limiter = ReentrantLimiter::new(1);
        let inner = limiter.clone();
        let admitted = limiter
            .limit(async move {
                let ctx = AdmissionContext::current();
                let probe = inner.clone();
                tokio::spawn(ctx.scope(async move {
                    // Would wait forever on the root slot without the context.
                    probe.limit(async { probe.is_admitted() }).await
                }))
                .await
                .unwrap()
            })
            .await;
        assert!(admitted);
    }

    #[tokio::test]
    async fn cancelled_operation_leaves_no_marker_or_slot() {
        let limiter = ReentrantLimiter::new(1);
        let inner = limiter.clone();
        let task = tokio::spawn(async move {
            inner
                .limit(tokio::time::sleep(Duration::from_secs(60)))
                .await
        });
        while limiter.running() == 0 {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;
        assert_eq!(limiter.running(), 0);
        assert!(!limiter.is_admitted());
        assert_eq!(limiter.limit(async { 1 }).await, 1);
    }
}
