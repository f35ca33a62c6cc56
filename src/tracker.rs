//! Lifetime tracker for background subscriptions.
//!
//! The tracker is a wait-group: every live subscription holds one count,
//! and a shutdown sequence can block in [`LifetimeTracker::wait`] until all
//! of them have drained.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    count: Mutex<usize>,
    zero: Condvar,
}

/// Shared counter with a blocking "wait for zero".
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct LifetimeTracker {
    inner: Arc<Inner>,
}

impl LifetimeTracker {
    /// A tracker with nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.inner.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Increments the counter and returns a guard that decrements it on drop.
    #[must_use = "dropping the guard immediately releases the count"]
    pub fn track(&self) -> TrackerGuard {
        *self.lock() += 1;
        TrackerGuard {
            tracker: self.clone(),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn count(&self) -> usize {
        *self.lock()
    }

    fn release(&self) {
        let mut count = self.lock();
        debug_assert!(*count > 0, "tracker released more often than tracked");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.inner.zero.notify_all();
        }
    }

    /// Blocks until the counter reaches zero.
    pub fn wait(&self) {
        let mut count = self.lock();
        while *count > 0 {
            count = self.inner.zero.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the counter reaches zero or `timeout` passes.
    ///
    /// Returns `true` if the counter reached zero.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.lock();
        while *count > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            count = self
                .inner
                .zero
                .wait_timeout(count, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Holds one count on a [`LifetimeTracker`]; releases it exactly once on drop.
#[derive(Debug)]
pub struct TrackerGuard {
    tracker: LifetimeTracker,
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.tracker.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_increments_and_releases() {
        let tracker = LifetimeTracker::new();
        let a = tracker.track();
        let b = tracker.track();
        assert_eq!(tracker.count(), 2);
        drop(a);
        assert_eq!(tracker.count(), 1);
        drop(b);
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn wait_returns_immediately_when_idle() {
        let tracker = LifetimeTracker::new();
        tracker.wait();
        assert!(tracker.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn wait_blocks_until_all_guards_released() {
        let tracker = LifetimeTracker::new();
        let guards: Vec<_> = (0..4).map(|_| tracker.track()).collect();

        let handles: Vec<_> = guards
            .into_iter()
            .enumerate()
            .map(|(i, guard)| {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(10 * (i as u64 + 1)));
                    drop(guard);
                })
            })
            .collect();

        assert!(tracker.wait_timeout(Duration::from_secs(5)));
        assert_eq!(tracker.count(), 0);
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn wait_timeout_reports_outstanding_work() {
        let tracker = LifetimeTracker::new();
        let _guard = tracker.track();
        assert!(!tracker.wait_timeout(Duration::from_millis(20)));
        assert_eq!(tracker.count(), 1);
    }
}
