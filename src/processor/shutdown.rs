//! In-flight accounting and the termination signal.
//!
//! A [`ShutdownCoordinator`] is a cheap cloneable handle shared by the
//! scheduler and every processing task. Each task holds an [`InFlightGuard`]
//! for its whole lifetime; dropping the guard releases the unit, so the count
//! is decremented exactly once on every exit path, unwinding included.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Lifecycle of the relay as seen by the shutdown path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting new fetch cycles.
    Running,
    /// Termination requested; waiting for in-flight work.
    Draining,
    /// Termination requested and no work remains.
    Stopped,
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ShutdownState::Running => "running",
            ShutdownState::Draining => "draining",
            ShutdownState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Non-negative counter of running processing tasks with a wait-for-zero primitive.
#[derive(Debug, Default)]
pub struct InFlightCounter {
    count: AtomicUsize,
    zero: Notify,
}

impl InFlightCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn acquire(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Releases one unit.
    ///
    /// # Panics
    ///
    /// Panics when the counter is already zero; an unmatched release is a bug in the caller.
    pub fn release(&self) {
        let previous = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            })
            .unwrap_or_else(|_| panic!("in-flight counter released below zero"));

        if previous == 1 {
            self.zero.notify_waiters();
        }
    }

    /// Resolves once the counter is observed at zero.
    pub async fn wait_for_zero(&self) {
        loop {
            let notified = self.zero.notified();
            tokio::pin!(notified);
            // register before checking so a release between the load and the await is not lost
            notified.as_mut().enable();

            if self.get() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Holds one unit of in-flight work until dropped.
#[must_use = "dropping the guard immediately releases the in-flight unit"]
#[derive(Debug)]
pub struct InFlightGuard {
    inner: Arc<CoordinatorInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.release();
    }
}

#[derive(Clone, Debug)]
pub struct ShutdownCoordinator {
    inner: Arc<CoordinatorInner>,
}

#[derive(Debug)]
struct CoordinatorInner {
    termination: CancellationToken,
    in_flight: InFlightCounter,
    stopped: AtomicBool,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::with_cancellation_token(CancellationToken::new())
    }

    /// Uses `termination` as the termination signal, so cancelling it (or any parent token)
    /// starts the drain.
    pub fn with_cancellation_token(termination: CancellationToken) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                termination,
                in_flight: InFlightCounter::new(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Sets the termination signal. Repeated calls are no-ops.
    pub fn terminate(&self) {
        if !self.inner.termination.is_cancelled() {
            tracing::info!(in_flight = self.in_flight(), "termination requested; draining");
        }
        self.inner.termination.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.termination.is_cancelled()
    }

    /// Resolves once the termination signal is set.
    pub async fn terminated(&self) {
        self.inner.termination.cancelled().await;
    }

    /// Registers one unit of in-flight work. Must be called before the task is spawned.
    pub fn track(&self) -> InFlightGuard {
        self.inner.in_flight.acquire();
        InFlightGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.get()
    }

    pub fn state(&self) -> ShutdownState {
        if self.inner.stopped.load(Ordering::SeqCst) {
            ShutdownState::Stopped
        } else if self.is_terminated() {
            ShutdownState::Draining
        } else {
            ShutdownState::Running
        }
    }

    /// Waits for the termination signal, then for every in-flight unit to be released.
    ///
    /// No timeout is applied; a supervisor is expected to enforce one if needed.
    pub async fn drain(&self) {
        self.terminated().await;
        self.inner.in_flight.wait_for_zero().await;
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            tracing::info!("in-flight work drained; relay stopped");
        }
    }
}
