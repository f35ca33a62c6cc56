//! In-process monitoring queue.
//!
//! Publishers push rows under an artifact name; every subscriber of that
//! artifact gets its own copy (fan-out). Publishing never blocks: a
//! subscriber whose buffer is full loses the row and the loss is counted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::logging::Component;
use crate::row::Row;

use super::event::{FlowCompletion, SubscriptionId, FLOW_COMPLETION_ARTIFACT};

#[derive(Debug)]
struct SubscriberEntry {
    id: SubscriptionId,
    tx: Sender<Row>,
}

/// Fan-out broker keyed by artifact name.
#[derive(Debug, Default)]
pub struct MonitoringQueue {
    subscribers: Mutex<HashMap<String, Vec<SubscriberEntry>>>,
    dropped_rows: AtomicU64,
}

impl MonitoringQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<SubscriberEntry>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to `artifact` with a buffer of `capacity` rows.
    pub fn subscribe(&self, artifact: &str, capacity: usize) -> (SubscriptionId, Receiver<Row>) {
        let id = SubscriptionId::new();
        let (tx, rx) = bounded(capacity.max(1));
        self.lock()
            .entry(artifact.to_string())
            .or_default()
            .push(SubscriberEntry { id, tx });
        tracing::debug!(
            component = Component::Monitoring.as_str(),
            artifact,
            subscription = %id,
            "monitoring subscription added"
        );
        (id, rx)
    }

    /// Removes a subscription. Idempotent.
    ///
    /// The subscriber's receiver disconnects once buffered rows are drained.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.lock();
        for entries in subs.values_mut() {
            entries.retain(|e| e.id != id);
        }
        subs.retain(|_, entries| !entries.is_empty());
    }

    /// Publishes `row` to every subscriber of `artifact`.
    ///
    /// Returns how many subscribers accepted the row.
    pub fn publish(&self, artifact: &str, row: &Row) -> usize {
        let mut subs = self.lock();
        let Some(entries) = subs.get_mut(artifact) else {
            return 0;
        };

        let mut delivered = 0;
        entries.retain(|entry| match entry.tx.try_send(row.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped_rows.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    component = Component::Monitoring.as_str(),
                    artifact,
                    subscription = %entry.id,
                    "subscriber buffer full; row dropped"
                );
                true
            }
            // Receiver gone: prune.
            Err(TrySendError::Disconnected(_)) => false,
        });
        if entries.is_empty() {
            subs.remove(artifact);
        }
        delivered
    }

    /// Publishes a flow completion under `System.Flow.Completion`.
    pub fn publish_flow_completion(&self, completion: &FlowCompletion) -> usize {
        self.publish(FLOW_COMPLETION_ARTIFACT, &completion.to_row())
    }

    /// Number of live subscriptions for `artifact`.
    #[must_use]
    pub fn subscriber_count(&self, artifact: &str) -> usize {
        self.lock().get(artifact).map_or(0, Vec::len)
    }

    /// Rows lost to full subscriber buffers since creation.
    #[must_use]
    pub fn dropped_rows(&self) -> u64 {
        self.dropped_rows.load(Ordering::Relaxed)
    }
}
