//! Expression evaluation against a row and a scope.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::error::ExecutionError;
use crate::logging::LogLevel;
use crate::row::Row;
use crate::scope::Scope;
use crate::value::Value;

use super::ast::{Columns, CompareOp, Expr};

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, regex::Regex>>> = OnceLock::new();

fn cached_regex(pattern: &str) -> Result<regex::Regex, ExecutionError> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Ok(guard) = cache.read() {
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = regex::Regex::new(pattern).map_err(|e| ExecutionError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    // A poisoned cache only costs recompilation.
    if let Ok(mut guard) = cache.write() {
        if guard.len() >= REGEX_CACHE_MAX {
            guard.clear();
        }
        guard
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }
    Ok(compiled)
}

/// Resolves a dotted path: row column first, then scope variable, then
/// member access for the remaining segments. Missing pieces yield `Null`.
pub(crate) fn resolve_path(path: &[String], row: &Row, scope: &Scope) -> Value {
    let Some((first, rest)) = path.split_first() else {
        return Value::Null;
    };
    let mut current = row
        .get(first)
        .or_else(|| scope.resolve(first))
        .cloned()
        .unwrap_or(Value::Null);
    for segment in rest {
        current = current.get(segment).unwrap_or(Value::Null);
    }
    current
}

/// Evaluates `expr` to a value.
pub(crate) fn evaluate(expr: &Expr, row: &Row, scope: &Scope) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Path(path) => resolve_path(path, row, scope),
        Expr::Not(inner) => Value::Bool(!evaluate(inner, row, scope).is_truthy()),
        Expr::And(l, r) => {
            Value::Bool(evaluate(l, row, scope).is_truthy() && evaluate(r, row, scope).is_truthy())
        }
        Expr::Or(l, r) => {
            Value::Bool(evaluate(l, row, scope).is_truthy() || evaluate(r, row, scope).is_truthy())
        }
        Expr::Compare { op, lhs, rhs } => {
            let lhs = evaluate(lhs, row, scope);
            let rhs = evaluate(rhs, row, scope);
            Value::Bool(compare(*op, &lhs, &rhs, scope))
        }
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value, scope: &Scope) -> bool {
    use std::cmp::Ordering::{Equal, Greater, Less};

    match op {
        CompareOp::Eq => lhs.loosely_equals(rhs),
        CompareOp::NotEq => !lhs.loosely_equals(rhs),
        CompareOp::Lt => lhs.compare(rhs) == Some(Less),
        CompareOp::LtEq => matches!(lhs.compare(rhs), Some(Less | Equal)),
        CompareOp::Gt => lhs.compare(rhs) == Some(Greater),
        CompareOp::GtEq => matches!(lhs.compare(rhs), Some(Greater | Equal)),
        CompareOp::RegexMatch => {
            let Some(pattern) = rhs.as_str() else {
                scope.log(
                    LogLevel::Warn,
                    &format!("regex pattern must be a string, got {}", rhs.type_name()),
                );
                return false;
            };
            match cached_regex(pattern) {
                Ok(re) => regex_matches(&re, lhs),
                Err(e) => {
                    scope.log(LogLevel::Warn, &e.to_string());
                    false
                }
            }
        }
    }
}

// A list matches if any member does; scalars match on their text form.
fn regex_matches(re: &regex::Regex, value: &Value) -> bool {
    match value {
        Value::Null | Value::Structured(_) => false,
        Value::String(s) => re.is_match(s),
        Value::List(items) => items.iter().any(|item| regex_matches(re, item)),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => re.is_match(&value.to_string()),
    }
}

/// True if `row` passes the WHERE clause (or there is none).
pub(crate) fn matches_filter(filter: Option<&Expr>, row: &Row, scope: &Scope) -> bool {
    filter.map_or(true, |f| evaluate(f, row, scope).is_truthy())
}

/// Applies the projection list.
pub(crate) fn project(columns: &Columns, row: Row, scope: &Scope) -> Row {
    match columns {
        Columns::All => row,
        Columns::Named(cols) => cols
            .iter()
            .map(|col| (col.output_name().to_string(), resolve_path(&col.path, &row, scope)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;

    fn flow_row(artifacts: &[&str]) -> Row {
        Row::new().with("FlowId", "F.1").with(
            "Flow",
            Value::Structured(serde_json::json!({
                "artifacts_with_results": artifacts,
                "state": "FINISHED",
                "total_collected_rows": 12
            })),
        )
    }

    fn filter_of(text: &str) -> Expr {
        parse(&format!("SELECT * FROM s() WHERE {text}"))
            .unwrap()
            .filter
            .unwrap()
    }

    #[test]
    fn regex_matches_any_list_member() {
        let scope = Scope::new().with_var("artifact_name", "A");
        let expr = filter_of("Flow.artifacts_with_results =~ artifact_name");

        assert!(evaluate(&expr, &flow_row(&["A", "B"]), &scope).is_truthy());
        assert!(!evaluate(&expr, &flow_row(&["B"]), &scope).is_truthy());
        assert!(!evaluate(&expr, &flow_row(&[]), &scope).is_truthy());
    }

    #[test]
    fn row_column_shadows_scope_variable() {
        let scope = Scope::new().with_var("FlowId", "from-scope");
        let expr = filter_of("FlowId = 'F.1'");
        assert!(evaluate(&expr, &flow_row(&[]), &scope).is_truthy());
    }

    #[test]
    fn unbound_variable_is_null() {
        let scope = Scope::new();
        let expr = filter_of("Flow.artifacts_with_results =~ artifact_name");
        assert!(!evaluate(&expr, &flow_row(&["A"]), &scope).is_truthy());
        assert_eq!(
            resolve_path(&["nope".to_string(), "deeper".to_string()], &Row::new(), &scope),
            Value::Null
        );
    }

    #[test]
    fn invalid_regex_does_not_match() {
        let scope = Scope::new().with_var("artifact_name", "(unclosed");
        let expr = filter_of("Flow.artifacts_with_results =~ artifact_name");
        assert!(!evaluate(&expr, &flow_row(&["(unclosed"]), &scope).is_truthy());
        assert!(cached_regex("(unclosed").is_err());
    }

    #[test]
    fn numeric_comparisons() {
        let scope = Scope::new();
        let row = flow_row(&[]);
        assert!(evaluate(&filter_of("Flow.total_collected_rows > 10"), &row, &scope).is_truthy());
        assert!(evaluate(&filter_of("Flow.total_collected_rows <= 12.0"), &row, &scope).is_truthy());
        assert!(!evaluate(&filter_of("Flow.total_collected_rows < 12"), &row, &scope).is_truthy());
        assert!(evaluate(&filter_of("Flow.total_collected_rows = 12.0"), &row, &scope).is_truthy());
    }

    #[test]
    fn boolean_connectives() {
        let scope = Scope::new();
        let row = flow_row(&["A"]);
        assert!(evaluate(&filter_of("Flow.state = 'FINISHED' AND NOT FlowId = 'x'"), &row, &scope).is_truthy());
        assert!(evaluate(&filter_of("FlowId = 'x' OR Flow.state != 'RUNNING'"), &row, &scope).is_truthy());
        assert!(!evaluate(&filter_of("NOT (FlowId = 'F.1')"), &row, &scope).is_truthy());
    }

    #[test]
    fn projection_renames_and_descends() {
        let scope = Scope::new();
        let q = parse("SELECT FlowId, Flow.state AS State FROM s()").unwrap();
        let out = project(&q.columns, flow_row(&[]), &scope);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["FlowId", "State"]);
        assert_eq!(out.get("State"), Some(&Value::from("FINISHED")));
    }

    #[test]
    fn missing_filter_accepts_everything() {
        assert!(matches_filter(None, &Row::new(), &Scope::new()));
    }
}
