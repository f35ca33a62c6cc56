//! Monitoring queue and the query source that reads from it.
//!
//! Producers publish rows under an artifact name; each `watch_monitoring`
//! evaluation holds its own bounded subscription.

/// Event payloads and identifiers.
pub mod event;
/// `watch_monitoring` source plugin.
pub mod plugin;
/// Fan-out queue.
pub mod queue;

pub use event::{FlowCompletion, FlowState, SubscriptionId, FLOW_COMPLETION_ARTIFACT};
pub use plugin::{WatchMonitoringPlugin, WATCH_MONITORING};
pub use queue::MonitoringQueue;
