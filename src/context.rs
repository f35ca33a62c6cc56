//! Cancellable execution context.
//!
//! A [`Context`] governs how long a subscription runs. Cancelling it
//! disconnects its `done` channel, so anything blocked in a crossbeam
//! `select!` on that channel wakes immediately. Contexts form a tree:
//! cancelling a parent cancels every child derived from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, never, Receiver, Sender};

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    // Dropping the sender disconnects `done_rx`.
    cancel_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
    deadline: Option<Instant>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Arc<Self> {
        let (cancel_tx, done_rx) = bounded::<()>(0);
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            cancel_tx: Mutex::new(Some(cancel_tx)),
            done_rx,
            deadline,
            children: Mutex::new(Vec::new()),
        })
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        drop(self.cancel_tx.lock().unwrap_or_else(PoisonError::into_inner).take());

        let children = std::mem::take(&mut *self.children.lock().unwrap_or_else(PoisonError::into_inner));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// A cancellable context with an optional deadline.
///
/// Clones share the same cancellation state.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// A root context that is only cancelled explicitly.
    #[must_use]
    pub fn background() -> Self {
        Self { inner: Inner::new(None) }
    }

    /// A root context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Inner::new(Some(Instant::now() + timeout)),
        }
    }

    /// Derives a child context.
    ///
    /// The child inherits the parent's deadline and is cancelled when the
    /// parent is. Cancelling the child leaves the parent untouched.
    #[must_use]
    pub fn child(&self) -> Self {
        self.child_with_deadline(self.inner.deadline)
    }

    /// Derives a child context that also expires after `timeout`.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now() + timeout;
        let deadline = Some(self.inner.deadline.map_or(own, |parent| parent.min(own)));
        self.child_with_deadline(deadline)
    }

    fn child_with_deadline(&self, deadline: Option<Instant>) -> Self {
        let child = Inner::new(deadline);
        {
            let mut children = self.inner.children.lock().unwrap_or_else(PoisonError::into_inner);
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        // The parent may have been cancelled before the child was linked.
        if self.inner.cancelled.load(Ordering::Acquire) {
            child.cancel();
        }
        Self { inner: child }
    }

    /// Cancels this context and all of its descendants. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// True once cancelled or past the deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// A channel that disconnects when the context is cancelled.
    ///
    /// Intended for `select!`: a `recv` on it returns `Err` once cancelled.
    #[must_use]
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done_rx
    }

    /// A channel that fires once the deadline passes, or never.
    #[must_use]
    pub fn deadline_channel(&self) -> Receiver<Instant> {
        match self.inner.deadline {
            Some(deadline) => after(deadline.saturating_duration_since(Instant::now())),
            None => never(),
        }
    }

    /// Blocks until the context is cancelled or its deadline passes.
    pub fn wait(&self) {
        let deadline = self.deadline_channel();
        crossbeam_channel::select! {
            recv(self.inner.done_rx) -> _ => {}
            recv(deadline) -> _ => {}
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
