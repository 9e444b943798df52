//! Cooperative cancellation primitive shared by the worker loop and the
//! orchestrator's dispatch loop (§5).
//!
//! Deliberately hand-rolled rather than a `tokio-util` dependency: the
//! donor crate family already hand-rolls equivalent coordination
//! primitives for its hook/effect machinery, and a flag plus a
//! [`tokio::sync::Notify`] is all `is_cancelled`/`cancelled` need.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

struct Inner {
    flag: AtomicBool,
    notify: Notify,
}

/// A cooperative cancellation flag, cheap to clone and share across a
/// task's worker turn and tool invocations.
///
/// Checked at every suspension point named in §5: the worker's streaming
/// read loop, the worker's tool-dispatch loop, and the orchestrator's
/// dispatch loop. Cancelling is a one-way transition — a token cannot be
/// un-cancelled.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Request cancellation. Idempotent; wakes every waiter.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested. A no-op future if already
    /// cancelled at call time.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        // Re-check after registering interest to avoid a missed wakeup if
        // `cancel` runs between the initial check above and `notified()`.
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
