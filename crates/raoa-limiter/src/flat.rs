use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::trace;

/// Fixed-capacity admission gate with a FIFO queue of waiters.
///
/// The running count is an atomic taken by compare-and-swap. When a slot is
/// released the head of the queue is offered the slot; if a competing
/// acquirer grabbed it first, the head stays queued and is retried on the
/// next release. Cloning shares the same gate.
#[derive(Clone)]
pub struct FlatLimiter {
    inner: Arc<Gate>,
}

struct Gate {
    capacity: usize,
    running: AtomicUsize,
    queue: Mutex<VecDeque<Arc<Waiter>>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WaiterState {
    Pending,
    Granted,
    Cancelled,
}

struct Waiter {
    state: Mutex<WaiterState>,
    notify: Notify,
}

/// An admission slot. The slot is released when this value is dropped.
#[must_use = "the slot is released as soon as it is dropped"]
pub struct Slot {
    gate: Arc<Gate>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("capacity", &self.gate.capacity)
            .finish()
    }
}

/// Withdraws a waiter whose `acquire` future is dropped before completion.
struct QueuedAcquire {
    gate: Arc<Gate>,
    waiter: Arc<Waiter>,
    completed: bool,
}

impl Drop for QueuedAcquire {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let granted = {
            let mut queue = self.gate.queue.lock().expect("lock poisoned");
            let mut state = self.waiter.state.lock().expect("lock poisoned");
            match *state {
                WaiterState::Pending => {
                    *state = WaiterState::Cancelled;
                    queue.retain(|w| !Arc::ptr_eq(w, &self.waiter));
                    false
                }
                WaiterState::Granted => true,
                WaiterState::Cancelled => false,
            }
        };
        // Granted but never observed: hand the slot back.
        if granted {
            self.gate.release();
        }
    }
}

impl Gate {
    fn try_take(&self) -> bool {
        let mut current = self.running.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return false;
            }
            match self.running.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
        self.process_queue();
    }

    fn process_queue(&self) {
        let mut queue = self.queue.lock().expect("lock poisoned");
        while let Some(waiter) = queue.front().cloned() {
            {
                let mut state = waiter.state.lock().expect("lock poisoned");
                if *state == WaiterState::Pending {
                    if !self.try_take() {
                        // Lost the slot to a competing acquirer; stay at the head.
                        return;
                    }
                    *state = WaiterState::Granted;
                }
            }
            queue.pop_front();
            waiter.notify.notify_one();
        }
    }
}

impl FlatLimiter {
    /// Create a limiter admitting at most `capacity` operations at once.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Gate {
                capacity: capacity.max(1),
                running: AtomicUsize::new(0),
                queue: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Wait for a slot.
    ///
    /// Dropping the returned future before it completes withdraws the waiter
    /// from the queue (or returns a slot that was granted but not yet taken).
    pub async fn acquire(&self) -> Slot {
        let gate = &self.inner;
        let queue_empty = gate.queue.lock().expect("lock poisoned").is_empty();
        if queue_empty && gate.try_take() {
            trace!(state = %self.describe_state(), "slot granted immediately");
            return Slot {
                gate: Arc::clone(gate),
            };
        }

        let waiter = Arc::new(Waiter {
            state: Mutex::new(WaiterState::Pending),
            notify: Notify::new(),
        });
        gate.queue
            .lock()
            .expect("lock poisoned")
            .push_back(Arc::clone(&waiter));
        let mut pending = QueuedAcquire {
            gate: Arc::clone(gate),
            waiter: Arc::clone(&waiter),
            completed: false,
        };
        // A release may have happened between the fast path and the enqueue.
        gate.process_queue();

        loop {
            if *waiter.state.lock().expect("lock poisoned") == WaiterState::Granted {
                pending.completed = true;
                trace!(state = %self.describe_state(), "slot granted from queue");
                return Slot {
                    gate: Arc::clone(gate),
                };
            }
            waiter.notify.notified().await;
        }
    }

    /// Run `operation` once a slot is available; the slot is released when
    /// the operation finishes or is dropped.
    pub async fn limit<F>(&self, operation: F) -> F::Output
    where
        F: Future,
    {
        let _slot = self.acquire().await;
        operation.await
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of slots currently held.
    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Number of waiters in the queue.
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().expect("lock poisoned").len()
    }

    /// Human-readable `(running/capacity), queue: n` summary.
    pub fn describe_state(&self) -> String {
        format!(
            "({}/{}), queue: {}",
            self.running(),
            self.capacity(),
            self.queued()
        )
    }

    /// Returns `true` if both handles share the same gate.
    pub fn same_gate(&self, other: &FlatLimiter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for FlatLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatLimiter")
            .field("capacity", &self.capacity())
            .field("running", &self.running())
            .field("queued", &self.queued())
            .finish()
    }
}
