//! `watch_monitoring(artifact=...)` source plugin.

use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::context::Context;
use crate::error::ExecutionError;
use crate::query::{SourceCall, SourcePlugin};
use crate::row::Row;
use crate::scope::Scope;

use super::queue::MonitoringQueue;

/// Name the plugin is registered under.
pub const WATCH_MONITORING: &str = "watch_monitoring";

const DEFAULT_CAPACITY: usize = 1024;

/// Streams every row published on the monitoring queue for one artifact.
///
/// The stream is unbounded; it ends only when the evaluating context is
/// cancelled. The subscription is released when the scope closes.
#[derive(Debug, Clone)]
pub struct WatchMonitoringPlugin {
    queue: Arc<MonitoringQueue>,
    capacity: usize,
}

impl WatchMonitoringPlugin {
    /// A source reading from `queue`.
    #[must_use]
    pub fn new(queue: Arc<MonitoringQueue>) -> Self {
        Self {
            queue,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Buffer size used when the scope carries no server config.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// The queue subscriptions are taken on.
    #[must_use]
    pub fn queue(&self) -> &Arc<MonitoringQueue> {
        &self.queue
    }
}

impl SourcePlugin for WatchMonitoringPlugin {
    fn name(&self) -> &str {
        WATCH_MONITORING
    }

    fn open(&self, _ctx: &Context, scope: &Scope, call: &SourceCall) -> Result<Receiver<Row>, ExecutionError> {
        let artifact = match call.arg("artifact") {
            Some(value) => value.as_str().ok_or_else(|| ExecutionError::InvalidArgument {
                plugin: WATCH_MONITORING.to_string(),
                argument: "artifact".to_string(),
                reason: format!("expected string, got {}", value.type_name()),
            })?,
            None => {
                return Err(ExecutionError::InvalidArgument {
                    plugin: WATCH_MONITORING.to_string(),
                    argument: "artifact".to_string(),
                    reason: "required".to_string(),
                })
            }
        };

        let capacity = scope
            .server_config()
            .map_or(self.capacity, |cfg| cfg.watcher.subscription_capacity);
        let (id, rx) = self.queue.subscribe(artifact, capacity);

        let queue = Arc::clone(&self.queue);
        scope.add_destructor(move || queue.unsubscribe(id));
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::query::QueryEngine;
    use crate::value::Value;

    fn engine(queue: &Arc<MonitoringQueue>) -> QueryEngine {
        QueryEngine::new().with_plugin(Arc::new(WatchMonitoringPlugin::new(Arc::clone(queue))))
    }

    #[test]
    fn streams_published_rows() {
        let queue = Arc::new(MonitoringQueue::new());
        let engine = engine(&queue);
        let query = engine
            .parse("SELECT n FROM watch_monitoring(artifact='Test.Artifact') WHERE n > 1")
            .unwrap();
        let ctx = Context::background();
        let scope = Scope::new();

        let mut stream = engine.evaluate(&query, &ctx, &scope);
        assert_eq!(queue.subscriber_count("Test.Artifact"), 1);

        queue.publish("Test.Artifact", &Row::new().with("n", 1i64));
        queue.publish("Test.Artifact", &Row::new().with("n", 2i64).with("extra", true));

        let row = stream.next().unwrap();
        assert_eq!(row.get("n"), Some(&Value::Int(2)));
        assert!(row.get("extra").is_none());
    }

    #[test]
    fn closing_scope_unsubscribes() {
        let queue = Arc::new(MonitoringQueue::new());
        let engine = engine(&queue);
        let query = engine.parse("SELECT * FROM watch_monitoring(artifact='A')").unwrap();
        let ctx = Context::with_timeout(Duration::from_millis(10));
        let scope = Scope::new();

        {
            let mut stream = engine.evaluate(&query, &ctx, &scope);
            assert!(stream.next().is_none());
        }
        assert_eq!(queue.subscriber_count("A"), 1);
        scope.close();
        assert_eq!(queue.subscriber_count("A"), 0);
    }

    #[test]
    fn missing_artifact_argument_is_rejected() {
        let queue = Arc::new(MonitoringQueue::new());
        let plugin = WatchMonitoringPlugin::new(queue);
        let call = SourceCall {
            plugin: WATCH_MONITORING.to_string(),
            args: Vec::new(),
        };
        let err = plugin.open(&Context::background(), &Scope::new(), &call).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidArgument { ref argument, .. } if argument == "artifact"));
    }

    #[test]
    fn non_string_artifact_argument_is_rejected() {
        let queue = Arc::new(MonitoringQueue::new());
        let plugin = WatchMonitoringPlugin::new(Arc::clone(&queue));
        let call = SourceCall {
            plugin: WATCH_MONITORING.to_string(),
            args: vec![("artifact".to_string(), Value::Int(3))],
        };
        assert!(plugin.open(&Context::background(), &Scope::new(), &call).is_err());
        assert_eq!(queue.subscriber_count("3"), 0);
    }
}
