//! Structured construction of queries without string concatenation.

use crate::error::ValidationError;
use crate::value::Value;

use super::ast::{Column, Columns, Expr, Query, SourceCall};

/// Builds a [`Query`] piece by piece.
///
/// # Examples
///
/// ```
/// use flowwatch::query::{Expr, QueryBuilder};
///
/// let query = QueryBuilder::from_source("watch_monitoring")
///     .arg("artifact", "System.Flow.Completion")
///     .filter(Expr::regex_match(
///         Expr::path("Flow.artifacts_with_results"),
///         Expr::var("artifact_name"),
///     ))
///     .build()?;
///
/// assert_eq!(
///     query.to_string(),
///     "SELECT * FROM watch_monitoring(artifact='System.Flow.Completion') \
///      WHERE Flow.artifacts_with_results =~ artifact_name"
/// );
/// # Ok::<(), flowwatch::ValidationError>(())
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    columns: Columns,
    source: SourceCall,
    filter: Option<Expr>,
    limit: Option<u64>,
}

impl QueryBuilder {
    /// Starts a `SELECT *` query over `plugin`.
    #[must_use]
    pub fn from_source(plugin: impl Into<String>) -> Self {
        Self {
            columns: Columns::All,
            source: SourceCall {
                plugin: plugin.into(),
                args: Vec::new(),
            },
            filter: None,
            limit: None,
        }
    }

    /// Adds a literal argument to the source call, replacing one with the same name.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.source.args.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.source.args.push((name, value)),
        }
        self
    }

    /// Projects a column instead of `*`. `dotted_path` is split on `.`.
    #[must_use]
    pub fn column(mut self, dotted_path: &str, alias: Option<&str>) -> Self {
        let col = Column {
            path: dotted_path.split('.').map(str::to_string).collect(),
            alias: alias.map(str::to_string),
        };
        self.columns = match std::mem::replace(&mut self.columns, Columns::All) {
            Columns::All => Columns::Named(vec![col]),
            Columns::Named(mut cols) => {
                cols.push(col);
                Columns::Named(cols)
            }
        };
        self
    }

    /// Sets the WHERE clause, AND-ing with any existing one.
    #[must_use]
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Sets the LIMIT clause.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Finishes the query.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if a plugin name, argument name, path
    /// or alias is not a plain identifier, or a literal has no query syntax.
    /// The built query's text always parses back to the same query.
    pub fn build(self) -> Result<Query, ValidationError> {
        let query = Query {
            columns: self.columns,
            source: self.source,
            filter: self.filter,
            limit: self.limit,
        };
        query.validate()?;
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FLOW_COMPLETION_QUERY;
    use crate::query::parse;

    #[test]
    fn builder_matches_parsed_flow_completion_query() {
        let built = QueryBuilder::from_source("watch_monitoring")
            .arg("artifact", "System.Flow.Completion")
            .filter(Expr::regex_match(
                Expr::path("Flow.artifacts_with_results"),
                Expr::var("artifact_name"),
            ))
            .build()
            .unwrap();
        assert_eq!(built, parse(FLOW_COMPLETION_QUERY).unwrap());
    }

    #[test]
    fn hostile_literal_stays_a_literal() {
        let built = QueryBuilder::from_source("watch_monitoring")
            .arg("artifact", "x') WHERE 1=1 OR ('")
            .build()
            .unwrap();
        let reparsed = parse(&built.to_string()).unwrap();
        assert_eq!(reparsed, built);
        assert!(reparsed.filter.is_none());
    }

    #[test]
    fn repeated_filters_are_anded() {
        let q = QueryBuilder::from_source("s")
            .filter(Expr::equals(Expr::path("a"), Expr::literal(1i64)))
            .filter(Expr::equals(Expr::path("b"), Expr::literal(2i64)))
            .limit(5)
            .build()
            .unwrap();
        assert_eq!(q.to_string(), "SELECT * FROM s() WHERE a = 1 AND b = 2 LIMIT 5");
    }

    #[test]
    fn columns_replace_star() {
        let q = QueryBuilder::from_source("s")
            .column("FlowId", None)
            .column("Flow.state", Some("State"))
            .build()
            .unwrap();
        assert_eq!(q.to_string(), "SELECT FlowId, Flow.state AS State FROM s()");
    }

    #[test]
    fn path_carrying_syntax_is_rejected() {
        let err = QueryBuilder::from_source("s")
            .filter(Expr::equals(Expr::path("a = 1 OR TRUE"), Expr::literal(1i64)))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidIdentifier {
                context: "path",
                ident: "a = 1 OR TRUE".to_string(),
            }
        );
    }

    #[test]
    fn source_and_column_names_must_be_identifiers() {
        assert!(QueryBuilder::from_source("s() WHERE TRUE OR x").build().is_err());
        assert!(QueryBuilder::from_source("s").arg("a=1, b", 2i64).build().is_err());
        assert!(QueryBuilder::from_source("s").column("Flow.", None).build().is_err());
        assert!(QueryBuilder::from_source("s").column("FlowId", Some("FROM")).build().is_err());
        assert!(QueryBuilder::from_source("s").filter(Expr::var("select")).build().is_err());
    }

    #[test]
    fn large_float_argument_reparses() {
        let built = QueryBuilder::from_source("s").arg("x", 1e300).build().unwrap();
        assert_eq!(built.to_string(), "SELECT * FROM s(x=1e300)");
        assert_eq!(parse(&built.to_string()).unwrap(), built);
    }

    #[test]
    fn list_literal_is_rejected() {
        let err = QueryBuilder::from_source("s")
            .filter(Expr::equals(
                Expr::path("a"),
                Expr::literal(Value::List(vec![Value::from("x")])),
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedLiteral { .. }));
    }
}
