//! Completion events published on the monitoring queue.
//!
//! These types are serializable so a flow record can be exposed to queries
//! as a structured `Flow` column.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::row::Row;
use crate::value::Value;

/// Artifact name completion events are published under.
pub const FLOW_COMPLETION_ARTIFACT: &str = "System.Flow.Completion";

/// Unique identifier for a queue subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal state of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    /// Ran to completion.
    Finished,
    /// Stopped on an error.
    Error,
    /// Cancelled before completion.
    Cancelled,
}

/// A flow finished; lists which artifacts produced results.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCompletion {
    pub flow_id: String,
    pub client_id: String,
    pub state: FlowState,
    pub artifacts_with_results: Vec<String>,
    pub total_collected_rows: u64,
    pub create_time: DateTime<Utc>,
    pub completion_time: DateTime<Utc>,
}

impl FlowCompletion {
    /// A finished flow with no artifacts, created and completed now.
    #[must_use]
    pub fn finished(client_id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            flow_id: flow_id.into(),
            client_id: client_id.into(),
            state: FlowState::Finished,
            artifacts_with_results: Vec::new(),
            total_collected_rows: 0,
            create_time: now,
            completion_time: now,
        }
    }

    /// Sets the artifacts that produced results.
    #[must_use]
    pub fn with_artifacts<I, S>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artifacts_with_results = artifacts.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the terminal state.
    #[must_use]
    pub fn with_state(mut self, state: FlowState) -> Self {
        self.state = state;
        self
    }

    /// Sets the number of rows the flow collected.
    #[must_use]
    pub fn with_total_rows(mut self, rows: u64) -> Self {
        self.total_collected_rows = rows;
        self
    }

    /// The row published on the monitoring queue.
    ///
    /// Columns: `Timestamp`, `ClientId`, `FlowId`, `Flow` (the whole record).
    #[must_use]
    pub fn to_row(&self) -> Row {
        let flow = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        Row::new()
            .with("Timestamp", self.completion_time.to_rfc3339())
            .with("ClientId", self.client_id.as_str())
            .with("FlowId", self.flow_id.as_str())
            .with("Flow", Value::Structured(flow))
    }
}
