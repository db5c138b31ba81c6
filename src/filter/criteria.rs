//! Filter criteria
//!
//! A criterion is `(column, operator, value)`. Criteria are validated against
//! the column set when a view is created, so evaluation itself cannot fail:
//! a value that does not coerce simply does not match.

use super::column::{Column, ColumnSet, ColumnType};
use super::{FilterError, RowView};
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Regular expression match on text columns
    Matches,
    /// Membership in list columns, substring in text columns
    Contains,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Matches => "=~",
            Self::Contains => "contains",
        }
    }

    fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            _ => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Operator tokens in match order; longer tokens first
const OPERATOR_TOKENS: &[(&str, Operator)] = &[
    ("==", Operator::Eq),
    ("!=", Operator::Ne),
    ("<=", Operator::Le),
    (">=", Operator::Ge),
    ("=~", Operator::Matches),
    ("=", Operator::Eq),
    ("<", Operator::Lt),
    (">", Operator::Gt),
];

/// A `(column, operator, value)` predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub column: String,
    pub op: Operator,
    pub value: Value,
}

impl Comparison {
    pub fn new(column: &str, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            op,
            value: value.into(),
        }
    }

    /// Equality criterion, the common case
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Eq, value)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.value)
    }
}

impl FromStr for Comparison {
    type Err = FilterError;

    /// Parse `slot=2`, `pid>=100`, `name=~^disk`, `tags contains ssd`
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| FilterError::InvalidCriterion {
            input: input.to_string(),
            message: message.to_string(),
        };

        let trimmed = input.trim();
        let split = trimmed
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(trimmed.len());
        let (column, rest) = trimmed.split_at(split);

        if column.is_empty() {
            return Err(invalid("missing column name"));
        }

        let rest = rest.trim_start();
        let (op, raw) = if let Some(raw) = rest.strip_prefix("contains ") {
            (Operator::Contains, raw)
        } else {
            OPERATOR_TOKENS
                .iter()
                .find_map(|(token, op)| rest.strip_prefix(token).map(|raw| (*op, raw)))
                .ok_or_else(|| invalid("expected one of == != < <= > >= =~ contains"))?
        };

        let raw = raw.trim();
        let value = match op {
            // Patterns stay verbatim
            Operator::Matches => Value::String(raw.to_string()),
            _ => parse_operand(raw),
        };

        Ok(Self::new(column, op, value))
    }
}

/// Keep a criterion operand as written; numbers are coerced per column type
/// when the criterion is evaluated
fn parse_operand(raw: &str) -> Value {
    match raw {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
        _ => Value::String(raw.to_string()),
    }
}

/// Read a literal as JSON when it parses, otherwise as a bare string
pub fn parse_literal(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Custom row predicate for `filter_by`
pub type RowPredicate = Arc<dyn Fn(&RowView<'_>) -> bool>;

/// A validated criterion, ready to evaluate
#[derive(Clone)]
pub(crate) enum Criterion {
    Compare {
        comparison: Comparison,
        pattern: Option<Regex>,
    },
    Predicate(RowPredicate),
}

impl fmt::Debug for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { comparison, .. } => write!(f, "{}", comparison),
            Self::Predicate(_) => f.write_str("<predicate>"),
        }
    }
}

impl Criterion {
    /// Validate a comparison against the columns it references
    pub(crate) fn compile(comparison: Comparison, columns: &ColumnSet) -> Result<Self, FilterError> {
        let column = columns.get(&comparison.column)?;
        let kind = column.column_type();
        let unsupported = || FilterError::UnsupportedOperator {
            column: comparison.column.clone(),
            op: comparison.op.symbol().to_string(),
            kind,
        };

        let mut pattern = None;
        match comparison.op {
            Operator::Eq | Operator::Ne => {}
            op if op.is_ordering() => {
                if !kind.is_ordered() {
                    return Err(unsupported());
                }
                if coerce(kind, &comparison.value).is_none() {
                    return Err(FilterError::InvalidCriterion {
                        input: comparison.to_string(),
                        message: format!("value is not a {}", kind),
                    });
                }
            }
            Operator::Matches => {
                if kind != ColumnType::Text {
                    return Err(unsupported());
                }
                let source = text(&comparison.value);
                let compiled = Regex::new(&source).map_err(|e| FilterError::InvalidPattern {
                    pattern: source.clone(),
                    message: e.to_string(),
                })?;
                pattern = Some(compiled);
            }
            Operator::Contains => {
                if !matches!(kind, ColumnType::List | ColumnType::Text) {
                    return Err(unsupported());
                }
            }
            _ => return Err(unsupported()),
        }

        Ok(Self::Compare {
            comparison,
            pattern,
        })
    }

    /// Evaluate against one row
    pub(crate) fn accepts(&self, row: &RowView<'_>) -> bool {
        match self {
            Self::Predicate(f) => f(row),
            Self::Compare {
                comparison,
                pattern,
            } => {
                let Ok(column) = row.columns().get(&comparison.column) else {
                    return false;
                };
                evaluate(column, row, comparison, pattern.as_ref())
            }
        }
    }
}

fn evaluate(column: &Column, row: &RowView<'_>, comparison: &Comparison, pattern: Option<&Regex>) -> bool {
    let kind = column.column_type();
    let actual = column.value(row.raw());
    let expected = &comparison.value;

    match comparison.op {
        Operator::Eq => loose_eq(kind, &actual, expected),
        Operator::Ne => !loose_eq(kind, &actual, expected),
        Operator::Matches => {
            !actual.is_null() && pattern.is_some_and(|re| re.is_match(&text(&actual)))
        }
        Operator::Contains => match &actual {
            Value::Array(items) => items.iter().any(|item| loose_eq(ColumnType::Text, item, expected)),
            Value::String(s) => s.contains(&text(expected)),
            _ => false,
        },
        op => compare(kind, &actual, expected).is_some_and(|ord| op.accepts(ord)),
    }
}

/// Order two values of an ordered column; integers compare exactly
fn compare(kind: ColumnType, a: &Value, b: &Value) -> Option<Ordering> {
    if kind == ColumnType::Number {
        if let (Some(x), Some(y)) = (integer(a), integer(b)) {
            return Some(x.cmp(&y));
        }
    }
    coerce(kind, a)?.partial_cmp(&coerce(kind, b)?)
}

fn integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

/// Equality that tolerates `"2"` against `2`
fn loose_eq(kind: ColumnType, actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    if actual.is_null() || expected.is_null() {
        return false;
    }
    if kind.is_ordered() {
        if let Some(ord) = compare(kind, actual, expected) {
            return ord == Ordering::Equal;
        }
    }
    text(actual) == text(expected)
}

/// Plain text form of a value
pub(crate) fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numeric form used for ordering: numbers as-is, times as epoch milliseconds
fn coerce(kind: ColumnType, value: &Value) -> Option<f64> {
    match kind {
        ColumnType::Time => match value {
            Value::String(s) => parse_time(s),
            Value::Number(n) => n.as_f64().map(|secs| secs * 1000.0),
            _ => None,
        },
        _ => match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        },
    }
}

fn parse_time(s: &str) -> Option<f64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
        return Some(dt.timestamp_millis() as f64);
    }
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_operators() {
        let c: Comparison = "slot=2".parse().unwrap();
        assert_eq!(c, Comparison::eq("slot", "2"));

        let c: Comparison = "pid >= 100".parse().unwrap();
        assert_eq!(c, Comparison::new("pid", Operator::Ge, "100"));

        let c: Comparison = "name=~^disk-[0-9]+".parse().unwrap();
        assert_eq!(c, Comparison::new("name", Operator::Matches, "^disk-[0-9]+"));

        let c: Comparison = "status != \"FAILED\"".parse().unwrap();
        assert_eq!(c, Comparison::new("status", Operator::Ne, "FAILED"));

        let c: Comparison = "tags contains ssd".parse().unwrap();
        assert_eq!(c, Comparison::new("tags", Operator::Contains, "ssd"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "=2".parse::<Comparison>(),
            Err(FilterError::InvalidCriterion { .. })
        ));
        assert!(matches!(
            "slot ~ 2".parse::<Comparison>(),
            Err(FilterError::InvalidCriterion { .. })
        ));
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_eq(ColumnType::Text, &json!("2"), &json!(2)));
        assert!(loose_eq(ColumnType::Number, &json!("2.0"), &json!(2)));
        assert!(!loose_eq(ColumnType::Text, &json!(null), &json!("")));
        assert!(loose_eq(ColumnType::Boolean, &json!(true), &json!("true")));
    }

    #[test]
    fn test_operands_keep_their_text() {
        let c: Comparison = "version=1.10".parse().unwrap();
        assert_eq!(c.value, json!("1.10"));
        let c: Comparison = "size=1e3".parse().unwrap();
        assert_eq!(c.value, json!("1e3"));
        let c: Comparison = "enabled=true".parse().unwrap();
        assert_eq!(c.value, json!(true));
        let c: Comparison = "owner=null".parse().unwrap();
        assert_eq!(c.value, Value::Null);

        assert!(loose_eq(ColumnType::Text, &json!("1.10"), &json!("1.10")));
        assert!(!loose_eq(ColumnType::Text, &json!("1.1"), &json!("1.10")));
        assert!(loose_eq(ColumnType::Number, &json!(1000), &json!("1e3")));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let row = json!(9007199254740992u64);
        assert!(!loose_eq(ColumnType::Number, &row, &json!("9007199254740993")));
        assert!(loose_eq(ColumnType::Number, &row, &json!("9007199254740992")));
        assert_eq!(
            compare(ColumnType::Number, &row, &json!(9007199254740993u64)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare(ColumnType::Number, &json!(2.5), &json!("2")),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_time_coercion() {
        let a = coerce(ColumnType::Time, &json!("2024-01-01T00:00:00Z")).unwrap();
        let b = coerce(ColumnType::Time, &json!("2024-01-01")).unwrap();
        assert_eq!(a, b);
        assert!(coerce(ColumnType::Time, &json!("yesterday")).is_none());
    }
}
