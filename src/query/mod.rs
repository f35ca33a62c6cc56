//! Declarative query engine.
//!
//! Queries select rows from a named source plugin and filter them with a
//! WHERE expression that may reference scope variables. Compilation happens
//! once ([`QueryEngine::parse`] or [`QueryBuilder`]); evaluation
//! ([`QueryEngine::evaluate`]) returns a lazy [`RowStream`] bound to a
//! context and a scope.

/// Query AST and rendering.
pub mod ast;
/// Structured query construction.
pub mod builder;
/// Plugin registry and lazy evaluation.
pub mod engine;
mod eval;
mod lexer;
mod parser;

pub use ast::{Column, Columns, CompareOp, Expr, Query, SourceCall};
pub use builder::QueryBuilder;
pub use engine::{QueryEngine, RowStream, SourcePlugin, StreamEnd};
pub use parser::parse;
