//! Dynamically typed values carried by rows and scope variables.
//!
//! Values cover the primitives a filter expression can compare, ordered
//! lists, and structured JSON data that paths descend into.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A value held by a row column or a scope binding.
///
/// # Examples
///
/// ```
/// use flowwatch::Value;
///
/// let name = Value::from("System.Flow.Completion");
/// let count = Value::Int(3);
///
/// assert!(name.is_string());
/// assert_eq!(count.as_int(), Some(3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent or SQL `NULL`.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list, e.g. `artifacts_with_results`.
    List(Vec<Value>),
    /// Arbitrary JSON, addressed by dotted paths.
    Structured(serde_json::Value),
}

impl Value {
    /// True for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for [`Value::String`].
    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// True for [`Value::List`].
    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// True for [`Value::Structured`].
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    /// The boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The integer, if this is one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The number as a float; integers are widened.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The string, including a JSON string inside a structured value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            Self::Structured(serde_json::Value::String(v)) => Some(v),
            _ => None,
        }
    }

    /// Truthiness used by WHERE clauses.
    ///
    /// Null, false, zero, and empty strings or lists are false.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(v) => *v,
            Self::Int(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::String(v) => !v.is_empty(),
            Self::List(v) => !v.is_empty(),
            Self::Structured(serde_json::Value::Object(map)) => !map.is_empty(),
            Self::Structured(v) => Self::from(v.clone()).is_truthy(),
        }
    }

    /// Looks up a member of a structured value.
    ///
    /// Returns `None` for non-object values or missing keys.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Self::Structured(serde_json::Value::Object(map)) => map.get(key).cloned().map(Value::from),
            _ => None,
        }
    }

    /// Compares two values for ordering operators.
    ///
    /// Numbers compare numerically across int/float, strings lexically.
    /// Any other combination is unordered.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            _ => {
                let a = self.as_float()?;
                let b = other.as_float()?;
                a.partial_cmp(&b)
            }
        }
    }

    /// Equality used by the `=` operator.
    ///
    /// Unlike `PartialEq`, an int and a float holding the same number are equal.
    #[must_use]
    pub fn loosely_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.compare(other) == Some(Ordering::Equal)
            }
            _ => self == other,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Structured(_) => "structured",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::List(v) => write!(f, "list[{}]", v.len()),
            Self::Structured(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Self::Float(v as f64), Self::Int)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

// Scalars and arrays are lifted into native variants so that operators see
// the same shapes whether a value came from a row column or a JSON path.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .unwrap_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN))),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            obj @ serde_json::Value::Object(_) => Self::Structured(obj),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from_json_lifts_scalars() {
        assert_eq!(Value::from(serde_json::json!(3)), Value::Int(3));
        assert_eq!(Value::from(serde_json::json!("x")), Value::String("x".into()));
        assert_eq!(
            Value::from(serde_json::json!(["a", 1])),
            Value::List(vec![Value::String("a".into()), Value::Int(1)])
        );
        assert!(Value::from(serde_json::json!({"k": 1})).is_structured());
    }

    #[test]
    fn test_value_get_member() {
        let flow = Value::from(serde_json::json!({
            "artifacts_with_results": ["A", "B"],
            "state": "FINISHED"
        }));
        assert_eq!(
            flow.get("artifacts_with_results"),
            Some(Value::List(vec![Value::from("A"), Value::from("B")]))
        );
        assert_eq!(flow.get("state"), Some(Value::from("FINISHED")));
        assert!(flow.get("missing").is_none());
        assert!(Value::Int(1).get("x").is_none());
    }

    #[test]
    fn test_value_compare_numbers() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(Value::Int(2).compare(&Value::Int(2)), Some(Ordering::Equal));
        assert_eq!(Value::from("b").compare(&Value::from("a")), Some(Ordering::Greater));
        assert!(Value::from("a").compare(&Value::Int(1)).is_none());
    }

    #[test]
    fn test_value_loose_equality() {
        assert!(Value::Int(2).loosely_equals(&Value::Float(2.0)));
        assert!(!Value::Int(2).loosely_equals(&Value::from("2")));
        assert!(Value::Null.loosely_equals(&Value::Null));
    }

    #[test]
    fn test_value_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::List(Vec::new()).is_truthy());
        assert!(Value::from(serde_json::json!({"a": 1})).is_truthy());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", Value::Bool(true)), "true");
        assert_eq!(format!("{}", Value::Int(42)), "42");
        assert_eq!(format!("{}", Value::from("hi")), "\"hi\"");
        assert_eq!(format!("{}", Value::Null), "null");
        assert_eq!(format!("{}", Value::List(vec![Value::Null; 3])), "list[3]");
    }
}
