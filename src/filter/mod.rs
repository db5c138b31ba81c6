//! Filter Engine
//!
//! A [`FilterTable`] is a lazily evaluated, non-destructive view over the
//! rows a plural resource enumerated from its target. Every call to
//! [`FilterTable::filter`] returns a new view whose criteria are the old
//! criteria plus the new ones, combined with AND. The underlying rows are
//! shared and never touched, so views can be derived from the same base
//! table in any order.
//!
//! - [`column`] - Column definitions and dot-notation extraction
//! - [`criteria`] - Operators, comparisons, and their evaluation
//!
//! # Example
//!
//! ```ignore
//! let columns = Arc::new(ColumnSet::new(vec![
//!     Column::new("slot"),
//!     Column::new("drive").path("logical_drives.*.name").plural("names").flatten(),
//! ])?);
//! let table = FilterTable::new(rows, columns);
//! let slot_two = table.filter([Comparison::eq("slot", "2")])?;
//! assert_eq!(slot_two.count(), 1);
//! ```

pub mod column;
pub mod criteria;

pub use column::{extract_path, rows_from_value, Column, ColumnSet, ColumnType, Row};
pub use criteria::{parse_literal, Comparison, Operator, RowPredicate};

use criteria::Criterion;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building a filtered view
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("unknown column '{column}' (available: {})", .available.join(", "))]
    UnknownColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("operator '{op}' is not supported on {kind} column '{column}'")]
    UnsupportedOperator {
        column: String,
        op: String,
        kind: ColumnType,
    },

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("invalid criterion '{input}': {message}")]
    InvalidCriterion { input: String, message: String },

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
}

/// Lazily filtered view over a shared row set
#[derive(Clone)]
pub struct FilterTable {
    rows: Arc<[Row]>,
    columns: Arc<ColumnSet>,
    criteria: Vec<Criterion>,
}

impl fmt::Debug for FilterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterTable")
            .field("rows", &self.rows.len())
            .field("columns", &self.columns.names())
            .field("criteria", &self.criteria)
            .finish()
    }
}

impl FilterTable {
    /// Base table over `rows`, no criteria
    pub fn new(rows: Vec<Row>, columns: Arc<ColumnSet>) -> Self {
        Self {
            rows: rows.into(),
            columns,
            criteria: Vec::new(),
        }
    }

    /// Table with no rows
    pub fn empty(columns: Arc<ColumnSet>) -> Self {
        Self::new(Vec::new(), columns)
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    /// Number of criteria applied to this view
    pub fn criteria_len(&self) -> usize {
        self.criteria.len()
    }

    /// New view with additional criteria; `self` is left as it was
    pub fn filter<I>(&self, criteria: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = Comparison>,
    {
        let mut next = self.clone();
        for comparison in criteria {
            tracing::debug!("filter: {}", comparison);
            next.criteria
                .push(Criterion::compile(comparison, &self.columns)?);
        }
        Ok(next)
    }

    /// New view restricted by a custom row predicate
    pub fn filter_by(&self, predicate: impl Fn(&RowView<'_>) -> bool + 'static) -> Self {
        let mut next = self.clone();
        next.criteria.push(Criterion::Predicate(Arc::new(predicate)));
        next
    }

    /// Rows passing every criterion, in enumeration order
    pub fn entries(&self) -> impl Iterator<Item = RowView<'_>> + '_ {
        self.rows
            .iter()
            .map(|row| RowView {
                row,
                columns: &self.columns,
            })
            .filter(|view| self.criteria.iter().all(|c| c.accepts(view)))
    }

    /// Number of rows in the current view
    pub fn count(&self) -> usize {
        self.entries().count()
    }

    pub fn exists(&self) -> bool {
        self.entries().next().is_some()
    }

    /// Values of one column across the current view
    pub fn values(&self, column: &str) -> Result<Vec<Value>, FilterError> {
        let column = self.columns.get(column)?;
        let values: Vec<Value> = self.entries().map(|r| column.value(r.row)).collect();

        if column.is_flattened() {
            return Ok(flatten_unique(values));
        }
        Ok(values)
    }

    /// Values of the column whose plural name is `plural` (`names`, `pids`)
    pub fn plural(&self, plural: &str) -> Result<Vec<Value>, FilterError> {
        let Some(column) = self.columns.by_plural(plural) else {
            return Err(FilterError::UnknownColumn {
                column: plural.to_string(),
                available: self
                    .columns
                    .iter()
                    .map(|c| c.plural_name().to_string())
                    .collect(),
            });
        };
        let name = column.name().to_string();
        self.values(&name)
    }

    /// The current view as JSON objects of column values
    pub fn to_values(&self) -> Vec<Value> {
        self.entries().map(|r| r.to_value()).collect()
    }
}

/// Flatten nested arrays, drop nulls and repeated values, keep first-seen order
fn flatten_unique(values: Vec<Value>) -> Vec<Value> {
    fn push(out: &mut Vec<Value>, value: Value) {
        match value {
            Value::Array(items) => items.into_iter().for_each(|v| push(out, v)),
            Value::Null => {}
            other => {
                if !out.contains(&other) {
                    out.push(other);
                }
            }
        }
    }

    let mut out = Vec::new();
    for value in values {
        push(&mut out, value);
    }
    out
}

/// One row of a view, exposing its columns
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    row: &'a Row,
    columns: &'a ColumnSet,
}

impl<'a> RowView<'a> {
    /// Column value, `None` if the column does not exist
    pub fn get(&self, column: &str) -> Option<Value> {
        self.columns.get(column).ok().map(|c| c.value(self.row))
    }

    /// The underlying record
    pub fn raw(&self) -> &'a Row {
        self.row
    }

    pub fn columns(&self) -> &'a ColumnSet {
        self.columns
    }

    /// All column values as a JSON object
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .columns
            .iter()
            .map(|c| (c.name().to_string(), c.value(self.row)))
            .collect();
        Value::Object(map)
    }
}
