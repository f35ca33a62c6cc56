//! Structured representation of a compiled query.
//!
//! A `Query` renders back to text through `Display`. For any query that
//! passes [`Query::validate`] (every parsed query does), parsing that text
//! yields an equal `Query`. Identifiers are never quoted, so validation is
//! what keeps a path or plugin name from smuggling in extra syntax.

use std::fmt;

use crate::error::ValidationError;
use crate::value::Value;

use super::lexer::is_identifier;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`, loose equality across int and float.
    Eq,
    /// `!=`
    NotEq,
    /// `=~` regex search: right side is the pattern.
    RegexMatch,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl CompareOp {
    /// Operator text as written in a query.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::RegexMatch => "=~",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }
}

/// A filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant.
    Literal(Value),
    /// Dotted path. The first segment names a row column or, failing that,
    /// a scope variable.
    Path(Vec<String>),
    /// Logical negation.
    Not(Box<Expr>),
    /// Logical conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Logical disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// Binary comparison.
    Compare {
        /// Operator.
        op: CompareOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand; the pattern for `=~`.
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// A path expression from dotted text, e.g. `"Flow.artifacts_with_results"`.
    ///
    /// Segments are not checked here; [`Expr::validate`] rejects any that
    /// are not plain identifiers.
    #[must_use]
    pub fn path(dotted: &str) -> Self {
        Self::Path(dotted.split('.').map(str::to_string).collect())
    }

    /// A reference to a scope variable.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Path(vec![name.into()])
    }

    /// A constant expression.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// `lhs op rhs`.
    #[must_use]
    pub fn compare(op: CompareOp, lhs: Self, rhs: Self) -> Self {
        Self::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `lhs =~ pattern`.
    #[must_use]
    pub fn regex_match(lhs: Self, pattern: Self) -> Self {
        Self::compare(CompareOp::RegexMatch, lhs, pattern)
    }

    /// `lhs = rhs`.
    #[must_use]
    pub fn equals(lhs: Self, rhs: Self) -> Self {
        Self::compare(CompareOp::Eq, lhs, rhs)
    }

    /// `self AND other`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// `self OR other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// `NOT self`.
    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Checks that every path segment is an identifier and every literal
    /// has query syntax.
    ///
    /// # Errors
    ///
    /// The first offending identifier or literal.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Literal(v) => check_literal(v),
            Self::Path(segments) => check_path(segments),
            Self::Not(inner) => inner.validate(),
            Self::And(l, r) | Self::Or(l, r) => {
                l.validate()?;
                r.validate()
            }
            Self::Compare { lhs, rhs, .. } => {
                lhs.validate()?;
                rhs.validate()
            }
        }
    }

    const fn precedence(&self) -> u8 {
        match self {
            Self::Or(..) => 1,
            Self::And(..) => 2,
            Self::Not(_) => 3,
            Self::Compare { .. } => 4,
            Self::Literal(_) | Self::Path(_) => 5,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        let wrap = self.precedence() < min;
        if wrap {
            f.write_str("(")?;
        }
        match self {
            Self::Literal(v) => fmt_literal(v, f)?,
            Self::Path(segments) => f.write_str(&segments.join("."))?,
            Self::Not(inner) => {
                f.write_str("NOT ")?;
                inner.fmt_prec(f, 3)?;
            }
            Self::And(l, r) => {
                l.fmt_prec(f, 2)?;
                f.write_str(" AND ")?;
                r.fmt_prec(f, 3)?;
            }
            Self::Or(l, r) => {
                l.fmt_prec(f, 1)?;
                f.write_str(" OR ")?;
                r.fmt_prec(f, 2)?;
            }
            Self::Compare { op, lhs, rhs } => {
                lhs.fmt_prec(f, 5)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_prec(f, 5)?;
            }
        }
        if wrap {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

fn check_ident(context: &'static str, ident: &str) -> Result<(), ValidationError> {
    if is_identifier(ident) {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier {
            context,
            ident: ident.to_string(),
        })
    }
}

fn check_path(segments: &[String]) -> Result<(), ValidationError> {
    if segments.is_empty() {
        return Err(ValidationError::InvalidIdentifier {
            context: "path",
            ident: String::new(),
        });
    }
    segments.iter().try_for_each(|s| check_ident("path", s))
}

fn check_literal(v: &Value) -> Result<(), ValidationError> {
    let reason = match v {
        Value::Float(x) if !x.is_finite() => "non-finite floats have no literal syntax",
        Value::List(_) => "lists have no literal syntax",
        Value::Structured(_) => "structured values have no literal syntax",
        _ => return Ok(()),
    };
    Err(ValidationError::UnsupportedLiteral {
        literal: serde_json::to_string(v).unwrap_or_else(|_| format!("{v:?}")),
        reason,
    })
}

// Floats use `{:?}`, which always carries a `.` or an exponent so the lexer
// reads them back as floats. Lists and structured values render as their
// JSON text in a string; such queries do not pass validation.
fn fmt_literal(v: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match v {
        Value::Null => f.write_str("NULL"),
        Value::Bool(true) => f.write_str("TRUE"),
        Value::Bool(false) => f.write_str("FALSE"),
        Value::Int(i) => write!(f, "{i}"),
        Value::Float(x) => write!(f, "{x:?}"),
        Value::String(s) => fmt_quoted(s, f),
        Value::List(_) | Value::Structured(_) => {
            let json = serde_json::to_string(v).map_err(|_| fmt::Error)?;
            fmt_quoted(&json, f)
        }
    }
}

fn fmt_quoted(s: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("'")?;
    for ch in s.chars() {
        match ch {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

/// One projected column.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub path: Vec<String>,
    pub alias: Option<String>,
}

impl Column {
    /// Output column name: the alias, or the last path segment.
    #[must_use]
    pub fn output_name(&self) -> &str {
        self.alias
            .as_deref()
            .or_else(|| self.path.last().map(String::as_str))
            .unwrap_or_default()
    }
}

/// Projection list.
#[derive(Debug, Clone, PartialEq)]
pub enum Columns {
    /// `*`: rows pass through unchanged.
    All,
    /// Explicit columns, in output order.
    Named(Vec<Column>),
}

/// The row source a query reads from, e.g. `watch_monitoring(artifact='X')`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCall {
    pub plugin: String,
    pub args: Vec<(String, Value)>,
}

impl SourceCall {
    /// Returns an argument by name.
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// A compiled query. Immutable once built.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub columns: Columns,
    pub source: SourceCall,
    pub filter: Option<Expr>,
    pub limit: Option<u64>,
}

impl Query {
    /// Checks that this query renders to text that parses back to it.
    ///
    /// # Errors
    ///
    /// The first identifier, duplicate argument or literal that has no
    /// faithful text form.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_ident("source", &self.source.plugin)?;
        for (i, (name, value)) in self.source.args.iter().enumerate() {
            check_ident("argument", name)?;
            if self.source.args[..i].iter().any(|(k, _)| k == name) {
                return Err(ValidationError::DuplicateArgument { name: name.clone() });
            }
            check_literal(value)?;
        }

        if let Columns::Named(cols) = &self.columns {
            if cols.is_empty() {
                return Err(ValidationError::EmptyProjection);
            }
            for col in cols {
                check_path(&col.path)?;
                if let Some(alias) = &col.alias {
                    check_ident("alias", alias)?;
                }
            }
        }

        self.filter.as_ref().map_or(Ok(()), Expr::validate)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        match &self.columns {
            Columns::All => f.write_str("*")?,
            Columns::Named(cols) => {
                for (i, col) in cols.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&col.path.join("."))?;
                    if let Some(alias) = &col.alias {
                        write!(f, " AS {alias}")?;
                    }
                }
            }
        }

        write!(f, " FROM {}(", self.source.plugin)?;
        for (i, (name, value)) in self.source.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}=")?;
            fmt_literal(value, f)?;
        }
        f.write_str(")")?;

        if let Some(filter) = &self.filter {
            write!(f, " WHERE {filter}")?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}
