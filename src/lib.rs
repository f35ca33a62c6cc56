//! # flowwatch - Flow completion subscriptions
//!
//! flowwatch lets a server component react whenever a flow finishes having
//! produced results for a given artifact. A registration compiles a
//! declarative filter once, evaluates it lazily against the monitoring queue
//! on its own thread, and hands each matching completion row to a handler
//! until the caller cancels.
//!
//! ## Core Concepts
//!
//! - **Context**: Cancellation signal and optional deadline, inherited by children
//! - **LifetimeTracker**: Counts live subscriptions so shutdown can wait for them
//! - **Scope**: Variable bindings, logger, and cleanup hooks for one evaluation
//! - **QueryEngine**: Compiles `SELECT ... FROM plugin(...) WHERE ...` and streams rows
//! - **MonitoringQueue**: In-process fan-out of published rows by artifact name
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowwatch::{
//!     Context, FlowCompletionWatcher, LifetimeTracker, MonitoringQueue, QueryEngine,
//!     Row, Scope, ServerConfig, WatchMonitoringPlugin,
//! };
//!
//! let queue = Arc::new(MonitoringQueue::new());
//! let engine = QueryEngine::new().with_plugin(Arc::new(WatchMonitoringPlugin::new(queue.clone())));
//! let watcher = FlowCompletionWatcher::new(Arc::new(engine));
//!
//! let ctx = Context::background();
//! let tracker = LifetimeTracker::new();
//! let handle = watcher.register(
//!     &ctx,
//!     &tracker,
//!     Arc::new(ServerConfig::default()),
//!     "Generic.Client.Info",
//!     |_: &Context, _: &Scope, row: Row| println!("{row:?}"),
//! )?;
//!
//! // ... later, on shutdown:
//! ctx.cancel();
//! handle.wait();
//! tracker.wait();
//! # Ok::<(), flowwatch::WatchError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Primitives
pub mod context;
pub mod error;
pub mod row;
pub mod scope;
pub mod tracker;
pub mod value;

// Configuration and logging
pub mod config;
pub mod logging;

// Query evaluation and sources
pub mod monitoring;
pub mod query;

// Subscriptions
pub mod watcher;

pub use config::{RowFaultPolicy, ServerConfig, WatcherConfig, FLOW_COMPLETION_QUERY};
pub use context::Context;
pub use error::{ConfigError, ExecutionError, ParseError, ValidationError, WatchError, WatchResult};
pub use logging::{Component, LogLevel, PlainLogger};
pub use monitoring::{FlowCompletion, FlowState, MonitoringQueue, SubscriptionId, WatchMonitoringPlugin};
pub use query::{Query, QueryBuilder, QueryEngine, RowStream, SourcePlugin};
pub use row::Row;
pub use scope::Scope;
pub use tracker::{LifetimeTracker, TrackerGuard};
pub use value::Value;
pub use watcher::{CompletionHandler, FlowCompletionWatcher, WatchHandle, WatchId, WatchOutcome};
