//! Error types for flowwatch.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the failure that stopped a registration. Faults raised inside a running
//! subscription never surface here; they are reported through
//! [`crate::watcher::WatchOutcome`].

use thiserror::Error;

/// A filter expression failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at offset {position}: {message}")]
pub struct ParseError {
    /// Byte offset into the query text.
    pub position: usize,
    /// What the parser expected or rejected.
    pub message: String,
}

impl ParseError {
    /// Creates a parse error at `position`.
    #[must_use]
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// A structurally built query that has no faithful text form.
///
/// Returned by [`crate::query::Query::validate`] and
/// [`crate::query::QueryBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A plugin, argument, path segment or alias is not a plain identifier.
    #[error("Invalid {context} identifier '{ident}'")]
    InvalidIdentifier {
        /// Where the identifier appears.
        context: &'static str,
        /// The rejected text.
        ident: String,
    },

    /// A literal the query grammar cannot express.
    #[error("Unsupported literal {literal}: {reason}")]
    UnsupportedLiteral {
        /// The literal as displayed.
        literal: String,
        /// Why it cannot be written as query text.
        reason: &'static str,
    },

    /// The same source argument appears twice.
    #[error("Duplicate argument '{name}'")]
    DuplicateArgument {
        /// Argument name.
        name: String,
    },

    /// A named projection with no columns.
    #[error("Column list is empty")]
    EmptyProjection,
}

/// Errors raised while evaluating a compiled query.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Unknown source plugin: {name}")]
    UnknownPlugin {
        name: String,
    },

    #[error("Invalid argument '{argument}' for {plugin}: {reason}")]
    InvalidArgument {
        plugin: String,
        argument: String,
        reason: String,
    },

    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config text is not valid JSON for [`crate::config::ServerConfig`].
    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    /// A field holds a value outside its allowed range.
    #[error("Invalid config field '{field}': {reason}")]
    Invalid {
        /// Dotted field path, e.g. `watcher.query`.
        field: String,
        /// Constraint that was violated.
        reason: String,
    },
}

/// Errors returned synchronously by [`crate::watcher::FlowCompletionWatcher::register`].
#[derive(Debug, Error)]
pub enum WatchError {
    /// The configured filter did not compile.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// The watcher thread could not be started.
    #[error("Failed to spawn watcher for '{artifact}': {source}")]
    Spawn {
        /// Artifact the registration was for.
        artifact: String,
        /// OS error from the thread builder.
        #[source]
        source: std::io::Error,
    },
}

impl WatchError {
    /// Returns true if the filter expression failed to compile.
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    /// Returns true if registering again may succeed.
    ///
    /// Only thread spawn failures are transient; a query that failed to parse
    /// will fail the same way next time.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }
}

/// Result type alias for flowwatch operations.
pub type WatchResult<T> = Result<T, WatchError>;
