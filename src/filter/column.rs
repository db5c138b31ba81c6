//! Column definitions
//!
//! A column computes one value from each row, either by walking a
//! dot-notation path into the row or with a closure.

use super::FilterError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// One record of a plural resource
pub type Row = Map<String, Value>;

/// Semantic type of a column; decides which operators apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Text,
    Number,
    Boolean,
    Time,
    List,
}

impl ColumnType {
    /// Whether `<`, `<=`, `>`, `>=` are meaningful
    pub fn is_ordered(self) -> bool {
        matches!(self, Self::Number | Self::Time)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Time => "time",
            Self::List => "list",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type ComputeFn = Arc<dyn Fn(&Row) -> Value + Send + Sync>;

#[derive(Clone)]
enum Source {
    Path(String),
    Computed(ComputeFn),
}

/// A named, typed projection of a row
#[derive(Clone)]
pub struct Column {
    name: String,
    plural: String,
    kind: ColumnType,
    flatten: bool,
    source: Source,
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Path(path) => path.as_str(),
            Source::Computed(_) => "<computed>",
        };
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("plural", &self.plural)
            .field("kind", &self.kind)
            .field("flatten", &self.flatten)
            .field("source", &source)
            .finish()
    }
}

impl Column {
    /// Column reading the row field of the same name; plural defaults to `<name>s`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            plural: format!("{}s", name),
            kind: ColumnType::Text,
            flatten: false,
            source: Source::Path(name.to_string()),
        }
    }

    /// Column computed by a closure
    pub fn computed(name: &str, f: impl Fn(&Row) -> Value + Send + Sync + 'static) -> Self {
        Self {
            source: Source::Computed(Arc::new(f)),
            ..Self::new(name)
        }
    }

    /// Read the value from a dot-notation path (`*` maps over arrays)
    pub fn path(mut self, path: &str) -> Self {
        self.source = Source::Path(path.to_string());
        self
    }

    /// Name of the aggregate property (`names`, `pids`)
    pub fn plural(mut self, plural: &str) -> Self {
        self.plural = plural.to_string();
        self
    }

    pub fn kind(mut self, kind: ColumnType) -> Self {
        self.kind = kind;
        self
    }

    /// Flatten nested lists and drop duplicates in the aggregate property
    pub fn flatten(mut self) -> Self {
        self.flatten = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plural_name(&self) -> &str {
        &self.plural
    }

    pub fn column_type(&self) -> ColumnType {
        self.kind
    }

    pub fn is_flattened(&self) -> bool {
        self.flatten
    }

    /// Compute this column's value for a row
    pub fn value(&self, row: &Row) -> Value {
        match &self.source {
            Source::Path(path) => extract_row_path(row, path),
            Source::Computed(f) => f(row),
        }
    }
}

/// The ordered set of columns a table exposes
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    columns: IndexMap<String, Column>,
}

impl ColumnSet {
    /// Build a column set; names and plural names must be unique
    pub fn new(columns: Vec<Column>) -> Result<Self, FilterError> {
        let mut set = IndexMap::new();
        let mut seen: Vec<&str> = Vec::new();

        for column in &columns {
            let mut names = vec![column.name()];
            if column.plural_name() != column.name() {
                names.push(column.plural_name());
            }
            for name in names {
                if seen.contains(&name) {
                    return Err(FilterError::DuplicateColumn(name.to_string()));
                }
                seen.push(name);
            }
        }

        for column in columns {
            set.insert(column.name.clone(), column);
        }

        Ok(Self { columns: set })
    }

    /// Look up a column by name
    pub fn get(&self, name: &str) -> Result<&Column, FilterError> {
        self.columns
            .get(name)
            .ok_or_else(|| FilterError::UnknownColumn {
                column: name.to_string(),
                available: self.names(),
            })
    }

    /// Look up a column by its plural name
    pub fn by_plural(&self, plural: &str) -> Option<&Column> {
        self.columns.values().find(|c| c.plural == plural)
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Extract a value from JSON using a dot-notation path.
///
/// Numeric segments index arrays, `*` maps the rest of the path over every
/// array element. Missing segments yield `null`.
pub fn extract_path(value: &Value, path: &str) -> Value {
    if path.is_empty() {
        return value.clone();
    }
    let parts: Vec<&str> = path.split('.').collect();
    walk(value, &parts)
}

fn extract_row_path(row: &Row, path: &str) -> Value {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((first, rest)) = parts.split_first() else {
        return Value::Null;
    };

    match row.get(*first) {
        Some(v) => walk(v, rest),
        None => Value::Null,
    }
}

fn walk(current: &Value, parts: &[&str]) -> Value {
    let Some((part, rest)) = parts.split_first() else {
        return current.clone();
    };

    if *part == "*" {
        let Some(items) = current.as_array() else {
            return Value::Null;
        };
        return Value::Array(
            items
                .iter()
                .map(|item| walk(item, rest))
                .filter(|v| !v.is_null())
                .collect(),
        );
    }

    // Handle array index
    let next = if let Ok(idx) = part.parse::<usize>() {
        current.get(idx)
    } else {
        current.get(*part)
    };

    match next {
        Some(v) => walk(v, rest),
        None => Value::Null,
    }
}

/// Turn a JSON array into rows; non-object items become `{"value": item}`
pub fn rows_from_value(value: &Value) -> Vec<Row> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => map.clone(),
            other => {
                let mut row = Row::new();
                row.insert("value".to_string(), other.clone());
                row
            }
        })
        .collect()
}
