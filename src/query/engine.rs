//! Query engine: plugin registry, compilation, and lazy evaluation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{select, Receiver};

use crate::context::Context;
use crate::error::{ExecutionError, ParseError};
use crate::logging::{Component, LogLevel};
use crate::row::Row;
use crate::scope::Scope;

use super::ast::{Query, SourceCall};
use super::eval::{matches_filter, project};
use super::parser::parse_with_source_pos;

/// A named row source callable from a query's FROM clause.
///
/// `open` returns the receiving end of a channel. The source signals the end
/// of its rows by dropping the sender; a source that never does is an
/// unbounded stream that only the context can stop. Resources that must
/// outlive `open` should be released through [`Scope::add_destructor`].
pub trait SourcePlugin: Send + Sync {
    /// Name used in the FROM clause.
    fn name(&self) -> &str;

    /// Starts producing rows for one evaluation.
    fn open(&self, ctx: &Context, scope: &Scope, call: &SourceCall) -> Result<Receiver<Row>, ExecutionError>;
}

/// Why a [`RowStream`] stopped yielding rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The source closed its channel.
    Exhausted,
    /// The LIMIT was reached.
    LimitReached,
    /// The context was cancelled or its deadline passed.
    Cancelled,
    /// The source could not be opened.
    Failed(ExecutionError),
}

/// Compiles and evaluates queries against registered source plugins.
#[derive(Default, Clone)]
pub struct QueryEngine {
    plugins: HashMap<String, Arc<dyn SourcePlugin>>,
}

impl QueryEngine {
    /// An engine with no plugins.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin, replacing any with the same name.
    pub fn register_plugin(&mut self, plugin: Arc<dyn SourcePlugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    /// Builder form of [`register_plugin`](Self::register_plugin).
    #[must_use]
    pub fn with_plugin(mut self, plugin: Arc<dyn SourcePlugin>) -> Self {
        self.register_plugin(plugin);
        self
    }

    /// True if a plugin named `name` is registered.
    #[must_use]
    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Parses `text` and checks that its source plugin is registered.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] for malformed text, or one positioned at the
    /// plugin name if no plugin by that name is registered.
    pub fn parse(&self, text: &str) -> Result<Query, ParseError> {
        let (query, pos) = parse_with_source_pos(text)?;
        if !self.has_plugin(&query.source.plugin) {
            return Err(ParseError::new(
                pos,
                format!("unknown source plugin '{}'", query.source.plugin),
            ));
        }
        Ok(query)
    }

    /// Starts evaluating `query`.
    ///
    /// Evaluation is lazy: nothing is read until the stream is iterated.
    /// Failing to open the source is logged through the scope and yields an
    /// empty stream whose [`RowStream::end_reason`] carries the error.
    pub fn evaluate<'a>(&self, query: &'a Query, ctx: &'a Context, scope: &'a Scope) -> RowStream<'a> {
        let opened = match self.plugins.get(&query.source.plugin) {
            Some(plugin) => plugin.open(ctx, scope, &query.source),
            None => Err(ExecutionError::UnknownPlugin {
                name: query.source.plugin.clone(),
            }),
        };

        let (rows, end) = match opened {
            Ok(rx) => (Some(rx), None),
            Err(e) => {
                scope.log(LogLevel::Error, &format!("{}: {e}", query.source.plugin));
                (None, Some(StreamEnd::Failed(e)))
            }
        };

        RowStream {
            query,
            ctx,
            scope,
            rows,
            deadline: ctx.deadline_channel(),
            emitted: 0,
            end,
        }
    }
}

impl fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.plugins.keys().collect();
        names.sort();
        f.debug_struct("QueryEngine").field("plugins", &names).finish()
    }
}

/// Lazily evaluated, possibly unbounded sequence of matching rows.
///
/// `next` blocks until a row passes the filter, the source closes, or the
/// context is cancelled.
pub struct RowStream<'a> {
    query: &'a Query,
    ctx: &'a Context,
    scope: &'a Scope,
    rows: Option<Receiver<Row>>,
    deadline: Receiver<Instant>,
    emitted: u64,
    end: Option<StreamEnd>,
}

impl RowStream<'_> {
    /// Why the stream ended, once it has.
    #[must_use]
    pub fn end_reason(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    fn finish(&mut self, reason: StreamEnd) -> Option<Row> {
        tracing::debug!(
            component = Component::Query.as_str(),
            source = %self.query.source.plugin,
            emitted = self.emitted,
            reason = ?reason,
            "row stream ended"
        );
        self.end = Some(reason);
        // Drop our receiver so a bounded source sees the disconnect.
        self.rows = None;
        None
    }
}

impl Iterator for RowStream<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.end.is_some() {
            return None;
        }
        if self.query.limit.is_some_and(|limit| self.emitted >= limit) {
            return self.finish(StreamEnd::LimitReached);
        }
        let rows = self.rows.clone()?;
        let ctx = self.ctx;
        let deadline = self.deadline.clone();

        loop {
            // Checked first so a cancelled context wins over buffered rows.
            if ctx.is_cancelled() {
                return self.finish(StreamEnd::Cancelled);
            }

            select! {
                recv(rows) -> msg => match msg {
                    Ok(row) => {
                        if !matches_filter(self.query.filter.as_ref(), &row, self.scope) {
                            continue;
                        }
                        self.emitted += 1;
                        return Some(project(&self.query.columns, row, self.scope));
                    }
                    Err(_) => return self.finish(StreamEnd::Exhausted),
                },
                recv(ctx.done()) -> _ => return self.finish(StreamEnd::Cancelled),
                recv(deadline) -> _ => return self.finish(StreamEnd::Cancelled),
            }
        }
    }
}
