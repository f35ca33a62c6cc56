//! Flow completion watcher.
//!
//! [`FlowCompletionWatcher::register`] compiles the completion filter once,
//! then drives it on a dedicated thread, handing every matching row to the
//! caller's handler until the context is cancelled. Each registration holds
//! one slot in the caller's [`LifetimeTracker`] for as long as it runs.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use uuid::Uuid;

use crate::config::{RowFaultPolicy, ServerConfig};
use crate::context::Context;
use crate::error::{WatchError, WatchResult};
use crate::logging::{Component, LogLevel, PlainLogger};
use crate::query::{Query, QueryEngine, StreamEnd};
use crate::row::Row;
use crate::scope::Scope;
use crate::tracker::LifetimeTracker;

const WATCHER_THREAD_NAME: &str = "flowwatch-watcher";

/// Receives matching completion rows.
///
/// Runs on the watcher's thread, one row at a time, in arrival order.
/// Implemented for any `FnMut(&Context, &Scope, Row)` closure.
pub trait CompletionHandler: Send + 'static {
    /// Called once per matching row.
    fn on_row(&mut self, ctx: &Context, scope: &Scope, row: Row);
}

impl<F> CompletionHandler for F
where
    F: FnMut(&Context, &Scope, Row) + Send + 'static,
{
    fn on_row(&mut self, ctx: &Context, scope: &Scope, row: Row) {
        self(ctx, scope, row);
    }
}

/// Identifier of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(Uuid);

impl WatchId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a subscription ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The row source ran out.
    Completed,
    /// The context was cancelled or its deadline passed.
    Cancelled,
    /// The handler or the evaluation failed.
    Faulted {
        /// Panic payload or source error text.
        message: String,
    },
}

impl WatchOutcome {
    /// True for [`WatchOutcome::Faulted`].
    #[must_use]
    pub const fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted { .. })
    }
}

/// Handle to a running subscription.
///
/// Dropping the handle leaves the subscription running; it still stops when
/// the context passed to `register` is cancelled.
#[derive(Debug)]
pub struct WatchHandle {
    id: WatchId,
    artifact_name: String,
    ctx: Context,
    outcome_rx: Receiver<WatchOutcome>,
    outcome: OnceLock<WatchOutcome>,
}

impl WatchHandle {
    /// Identifier of this registration.
    #[must_use]
    pub const fn id(&self) -> WatchId {
        self.id
    }

    /// Artifact name passed to `register`.
    #[must_use]
    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    /// Cancels this subscription only. The caller's context is unaffected.
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// True once the task has closed its scope and released its tracker slot.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        if self.outcome.get().is_some() {
            return true;
        }
        match self.outcome_rx.try_recv() {
            Ok(outcome) => {
                self.store(outcome);
                true
            }
            Err(TryRecvError::Disconnected) => {
                self.store(lost_outcome());
                true
            }
            Err(TryRecvError::Empty) => false,
        }
    }

    /// Blocks until the subscription ends.
    pub fn wait(&self) -> WatchOutcome {
        if let Some(outcome) = self.outcome.get() {
            return outcome.clone();
        }
        let outcome = self.outcome_rx.recv().unwrap_or_else(|_| lost_outcome());
        self.store(outcome)
    }

    /// Blocks until the subscription ends or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<WatchOutcome> {
        if let Some(outcome) = self.outcome.get() {
            return Some(outcome.clone());
        }
        match self.outcome_rx.recv_timeout(timeout) {
            Ok(outcome) => Some(self.store(outcome)),
            Err(RecvTimeoutError::Disconnected) => Some(self.store(lost_outcome())),
            Err(RecvTimeoutError::Timeout) => None,
        }
    }

    fn store(&self, outcome: WatchOutcome) -> WatchOutcome {
        self.outcome.get_or_init(|| outcome).clone()
    }
}

// The task always reports before exiting; this covers a thread torn down
// without unwinding.
fn lost_outcome() -> WatchOutcome {
    WatchOutcome::Faulted {
        message: "watcher exited without reporting an outcome".to_string(),
    }
}

/// Registers completion watchers against a query engine.
#[derive(Debug, Clone)]
pub struct FlowCompletionWatcher {
    engine: Arc<QueryEngine>,
}

impl FlowCompletionWatcher {
    /// A watcher evaluating filters on `engine`.
    #[must_use]
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    /// The engine filters are compiled and evaluated on.
    #[must_use]
    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    /// Starts delivering completions of flows that produced `artifact_name`.
    ///
    /// The filter is compiled before anything else happens: a query that
    /// fails to parse returns [`WatchError::Parse`] with no task started and
    /// `tracker` untouched. Otherwise `tracker` counts the subscription until
    /// its task has closed the scope.
    ///
    /// Returns once the task has opened its row source, so any event
    /// published after `register` returns reaches the handler. If opening the
    /// source fails, the handle reports [`WatchOutcome::Faulted`].
    ///
    /// # Errors
    ///
    /// [`WatchError::Parse`] if `config.watcher.query` does not compile, or
    /// [`WatchError::Spawn`] if the watcher thread cannot be started.
    pub fn register<H>(
        &self,
        ctx: &Context,
        tracker: &LifetimeTracker,
        config: Arc<ServerConfig>,
        artifact_name: &str,
        handler: H,
    ) -> WatchResult<WatchHandle>
    where
        H: CompletionHandler,
    {
        let mut scope = Scope::new()
            .with_server_config(Arc::clone(&config))
            .with_var("artifact_name", artifact_name);
        scope.set_logger(PlainLogger::new(Component::Frontend, &config));

        let query = self.engine.parse(&config.watcher.query)?;

        let id = WatchId::new();
        let guard = tracker.track();
        let sub_ctx = ctx.child();
        let (outcome_tx, outcome_rx) = bounded(1);
        let (ready_tx, ready_rx) = bounded(1);

        let task = WatchTask {
            id,
            artifact: artifact_name.to_string(),
            engine: Arc::clone(&self.engine),
            query,
            policy: config.watcher.row_fault_policy,
            ctx: sub_ctx.clone(),
            scope,
        };

        thread::Builder::new()
            .name(WATCHER_THREAD_NAME.to_string())
            .spawn(move || {
                let outcome = task.run(handler, ready_tx);
                task.scope.close();
                drop(guard);
                let _ = outcome_tx.send(outcome);
            })
            .map_err(|source| WatchError::Spawn {
                artifact: artifact_name.to_string(),
                source,
            })?;

        // Disconnects without a message if the task faults before its source
        // is open; the outcome then carries the fault.
        let _ = ready_rx.recv();

        tracing::debug!(artifact = artifact_name, watch = %id, "completion watcher registered");

        Ok(WatchHandle {
            id,
            artifact_name: artifact_name.to_string(),
            ctx: sub_ctx,
            outcome_rx,
            outcome: OnceLock::new(),
        })
    }
}

struct WatchTask {
    id: WatchId,
    artifact: String,
    engine: Arc<QueryEngine>,
    query: Query,
    policy: RowFaultPolicy,
    ctx: Context,
    scope: Scope,
}

impl WatchTask {
    fn run<H: CompletionHandler>(&self, mut handler: H, ready: Sender<()>) -> WatchOutcome {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.drive(&mut handler, ready))) {
            Ok(outcome) => outcome,
            Err(payload) => WatchOutcome::Faulted {
                message: panic_message(payload.as_ref()),
            },
        };

        match &outcome {
            WatchOutcome::Faulted { message } => {
                tracing::error!(
                    component = Component::Frontend.as_str(),
                    artifact = %self.artifact,
                    watch = %self.id,
                    error = %message,
                    "completion watcher faulted"
                );
            }
            other => {
                tracing::debug!(artifact = %self.artifact, watch = %self.id, outcome = ?other, "completion watcher stopped");
            }
        }
        outcome
    }

    fn drive<H: CompletionHandler>(&self, handler: &mut H, ready: Sender<()>) -> WatchOutcome {
        let mut stream = self.engine.evaluate(&self.query, &self.ctx, &self.scope);
        let _ = ready.send(());
        drop(ready);

        for row in stream.by_ref() {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| handler.on_row(&self.ctx, &self.scope, row)));
            let Err(payload) = delivered else {
                continue;
            };
            let message = panic_message(payload.as_ref());
            match self.policy {
                RowFaultPolicy::Terminate => return WatchOutcome::Faulted { message },
                RowFaultPolicy::Skip => {
                    self.scope
                        .log(LogLevel::Warn, &format!("handler failed on row, skipping: {message}"));
                }
            }
        }

        match stream.end_reason() {
            Some(StreamEnd::Cancelled) => WatchOutcome::Cancelled,
            Some(StreamEnd::Failed(e)) => WatchOutcome::Faulted { message: e.to_string() },
            Some(StreamEnd::Exhausted | StreamEnd::LimitReached) | None => WatchOutcome::Completed,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
