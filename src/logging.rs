//! Component-tagged logging.
//!
//! Log events go through `tracing`; installing a subscriber is the host's
//! responsibility. A [`PlainLogger`] stamps every event with the component
//! that produced it and the server name from the config.

use std::fmt;

use crate::config::ServerConfig;

/// The part of the service an event originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Watcher registration and subscription tasks.
    Frontend,
    /// The monitoring queue and its source plugin.
    Monitoring,
    /// Query compilation and evaluation.
    Query,
}

impl Component {
    /// Value of the `component` field on emitted events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Monitoring => "monitoring",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level of a [`PlainLogger`] message.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Logger handed to scopes for evaluation-time diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainLogger {
    component: Component,
    server: String,
}

impl PlainLogger {
    /// A logger tagging events with `component` and `config.server_name`.
    #[must_use]
    pub fn new(component: Component, config: &ServerConfig) -> Self {
        Self {
            component,
            server: config.server_name.clone(),
        }
    }

    /// Component this logger tags events with.
    #[must_use]
    pub const fn component(&self) -> Component {
        self.component
    }

    /// Emits `message` at `level`. Never fails.
    pub fn log(&self, level: LogLevel, message: &str) {
        let component = self.component.as_str();
        let server = self.server.as_str();
        match level {
            LogLevel::Debug => tracing::debug!(component, server, "{message}"),
            LogLevel::Info => tracing::info!(component, server, "{message}"),
            LogLevel::Warn => tracing::warn!(component, server, "{message}"),
            LogLevel::Error => tracing::error!(component, server, "{message}"),
        }
    }
}
