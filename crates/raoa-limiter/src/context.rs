use std::future::Future;
use std::sync::Arc;

use crate::flat::FlatLimiter;

tokio::task_local! {
    static CURRENT: AdmissionContext;
}

/// One level of admission: "running inside a slot of limiter `limiter_id`",
/// plus the private capacity-1 gate nested calls on that limiter go through.
#[derive(Clone, Debug)]
pub(crate) struct Frame {
    pub(crate) limiter_id: u64,
    pub(crate) nested: FlatLimiter,
}

/// Ambient record of which limiters the current task is admitted under.
///
/// The context lives in task-local storage for the duration of an admitted
/// operation and disappears with it, including when the operation is
/// cancelled. It does not follow `tokio::spawn`; carry it across explicitly:
///
/// ```no_run
/// # async fn demo(limiter: raoa_limiter::ReentrantLimiter) {
/// use raoa_limiter::AdmissionContext;
///
/// let ctx = AdmissionContext::current();
/// tokio::spawn(ctx.scope(async move {
///     limiter.limit(async { /* nested work */ }).await;
/// }));
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct AdmissionContext {
    frames: Arc<Vec<Frame>>,
}

impl AdmissionContext {
    /// Snapshot of the context the current task runs under (empty outside
    /// any admitted operation).
    pub fn current() -> Self {
        CURRENT
            .try_with(|ctx| ctx.clone())
            .unwrap_or_default()
    }

    /// Run `fut` with this context installed.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, fut).await
    }

    /// Returns `true` if no limiter has admitted the current task.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns `true` if the limiter with `limiter_id` has admitted this task.
    pub fn is_admitted_by(&self, limiter_id: u64) -> bool {
        self.frame_for(limiter_id).is_some()
    }

    pub(crate) fn frame_for(&self, limiter_id: u64) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| f.limiter_id == limiter_id)
    }

    /// A copy of this context where `limiter_id` maps to a fresh nested gate.
    pub(crate) fn enter(&self, limiter_id: u64) -> Self {
        let mut frames: Vec<Frame> = self
            .frames
            .iter()
            .filter(|f| f.limiter_id != limiter_id)
            .cloned()
            .collect();
        frames.push(Frame {
            limiter_id,
            nested: FlatLimiter::new(1),
        });
        Self {
            frames: Arc::new(frames),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_outside_scope() {
        assert!(AdmissionContext::current().is_empty());
    }

    #[tokio::test]
    async fn scope_installs_and_removes_context() {
        let ctx = AdmissionContext::default().enter(7);
        let inside = ctx
            .scope(async { AdmissionContext::current().is_admitted_by(7) })
            .await;
        assert!(inside);
        assert!(!AdmissionContext::current().is_admitted_by(7));
    }

    #[test]
    fn entering_replaces_the_nested_gate() {
        let first = AdmissionContext::default().enter(1).enter(2);
        let second = first.enter(1);
        assert_eq!(second.frames.len(), 2);
        let old = first.frame_for(1).unwrap();
        let new = second.frame_for(1).unwrap();
        assert!(!old.nested.same_gate(&new.nested));
        assert!(second.is_admitted_by(2));
    }
}
