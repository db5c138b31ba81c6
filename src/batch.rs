//! Batch Queries
//!
//! Runs a list of resource queries against one context. A query that is
//! skipped or fails is reported and the batch moves on.
//!
//! ```yaml
//! - resource: local_storage
//!   params: { path: /var/lib/ssa/report.json }
//!   where: { slot: "2" }
//!   members: [count, names]
//! - resource: file
//!   params: { path: /etc/hosts }
//!   members: [be_file, mode]
//! ```

use crate::context::SharedContext;
use crate::filter::{Comparison, FilterError, FilterTable};
use crate::resource::definition::MemberSource;
use crate::resource::{Params, Registry, ResourceError, ResourceInstance};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// One resource query
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Query {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default)]
    pub params: Params,
    #[serde(default, rename = "where")]
    pub criteria: Criteria,
    /// Exposed member names; all members when empty
    #[serde(default)]
    pub members: Vec<String>,
}

/// Filter criteria as `column: value` equalities or criterion strings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Criteria {
    Equal(IndexMap<String, Value>),
    Parsed(Vec<String>),
}

impl Default for Criteria {
    fn default() -> Self {
        Self::Parsed(Vec::new())
    }
}

impl Criteria {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Equal(map) => map.is_empty(),
            Self::Parsed(list) => list.is_empty(),
        }
    }

    pub fn comparisons(&self) -> Result<Vec<Comparison>, FilterError> {
        match self {
            Self::Equal(map) => Ok(map
                .iter()
                .map(|(column, value)| Comparison::eq(column, value.clone()))
                .collect()),
            Self::Parsed(list) => list.iter().map(|s| s.parse()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Ok,
    Skipped,
    Errored,
}

/// Outcome of one query
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub resource: String,
    pub status: QueryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub values: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub errors: IndexMap<String, String>,
}

impl QueryReport {
    fn errored(resource: &str, err: &ResourceError) -> Self {
        Self {
            resource: resource.to_string(),
            status: QueryStatus::Errored,
            reason: Some(err.to_string()),
            values: IndexMap::new(),
            errors: IndexMap::new(),
        }
    }
}

/// Count of reports by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub ok: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl BatchSummary {
    pub fn from_reports(reports: &[QueryReport]) -> Self {
        reports.iter().fold(Self::default(), |mut acc, r| {
            match r.status {
                QueryStatus::Ok => acc.ok += 1,
                QueryStatus::Skipped => acc.skipped += 1,
                QueryStatus::Errored => acc.errored += 1,
            }
            acc
        })
    }
}

/// Load queries from a YAML or JSON file
pub fn load_queries(path: &Path) -> Result<Vec<Query>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    let queries = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&raw).context("Failed to parse batch JSON")?,
        _ => serde_yaml::from_str(&raw).context("Failed to parse batch YAML")?,
    };
    Ok(queries)
}

/// Run every query; failures are recorded per query
pub fn run_batch(registry: &Registry, queries: &[Query], context: &SharedContext) -> Vec<QueryReport> {
    let reports: Vec<QueryReport> = queries
        .iter()
        .map(|q| run_query(registry, q, context))
        .collect();

    let summary = BatchSummary::from_reports(&reports);
    tracing::info!(
        "Batch finished: {} ok, {} skipped, {} errored",
        summary.ok,
        summary.skipped,
        summary.errored
    );
    reports
}

/// Run one query
pub fn run_query(registry: &Registry, query: &Query, context: &SharedContext) -> QueryReport {
    let instance = match registry.instantiate(
        &query.resource,
        query.version,
        query.params.clone(),
        context.clone(),
    ) {
        Ok(instance) => instance,
        Err(e) => {
            tracing::warn!("Query for {} failed: {}", query.resource, e);
            return QueryReport::errored(&query.resource, &e);
        }
    };

    let view = if query.criteria.is_empty() {
        None
    } else {
        let filtered = query
            .criteria
            .comparisons()
            .map_err(ResourceError::from)
            .and_then(|c| instance.filter(c));
        match filtered {
            Ok(view) => Some(view),
            Err(e) => return QueryReport::errored(&instance.to_string(), &e),
        }
    };

    let names: Vec<String> = if query.members.is_empty() {
        instance.members().names().into_iter().map(String::from).collect()
    } else {
        query.members.clone()
    };

    let mut values = IndexMap::new();
    let mut errors = IndexMap::new();
    for name in names {
        match evaluate(&instance, view.as_ref(), &name) {
            Ok(value) => {
                values.insert(name, value);
            }
            Err(e) => {
                errors.insert(name, e.to_string());
            }
        }
    }

    let (status, reason) = if let Some(reason) = instance.skip_reason() {
        (QueryStatus::Skipped, Some(reason.to_string()))
    } else if !errors.is_empty() {
        (QueryStatus::Errored, None)
    } else {
        (QueryStatus::Ok, None)
    };

    QueryReport {
        resource: instance.to_string(),
        status,
        reason,
        values,
        errors,
    }
}

/// Evaluate a member, answering table members from the filtered view
fn evaluate(
    instance: &ResourceInstance,
    view: Option<&FilterTable>,
    name: &str,
) -> Result<Value, ResourceError> {
    let Some(view) = view else {
        return instance.property(name);
    };
    let Some(member) = instance.members().get(name) else {
        return instance.property(name);
    };

    match &member.source {
        MemberSource::Count => Ok(Value::from(view.count())),
        MemberSource::Entries => Ok(Value::Array(view.to_values())),
        MemberSource::Exists => Ok(Value::Bool(view.exists())),
        MemberSource::Column(column) => Ok(Value::Array(view.values(column)?)),
        MemberSource::Method(_) | MemberSource::Identifier => instance.property(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::register_builtins;
    use crate::context::MockContext;
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        register_builtins(&mut registry).unwrap();
        registry
    }

    fn queries(yaml: &str) -> Vec<Query> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_batch_continues_past_failures() {
        let ctx: SharedContext = Arc::new(MockContext::new().with_file("/etc/hosts", "x\n"));
        let reports = run_batch(
            &registry(),
            &queries(
                r#"
- resource: nonexistent
- resource: local_storage
  params: { path: /missing.json }
  members: [count]
- resource: file
  params: { path: /etc/hosts }
  members: [be_file, size, bogus]
- resource: file
  params: { path: /etc/hosts }
  members: [be_file]
"#,
            ),
            &ctx,
        );

        let statuses: Vec<QueryStatus> = reports.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                QueryStatus::Errored,
                QueryStatus::Skipped,
                QueryStatus::Errored,
                QueryStatus::Ok
            ]
        );
        assert_eq!(reports[1].values["count"], json!(0));
        assert_eq!(reports[2].values["size"], json!(2));
        assert!(reports[2].errors.contains_key("bogus"));
        assert_eq!(reports[3].resource, "file(/etc/hosts)");

        assert_eq!(
            BatchSummary::from_reports(&reports),
            BatchSummary { ok: 1, skipped: 1, errored: 2 }
        );
    }

    #[test]
    fn test_where_applies_to_table_members() {
        let report = json!({"controllers": [
            {"slot": "1", "logical_drives": [{"name": "disk-1-1"}]},
            {"slot": "2", "logical_drives": [{"name": "disk-2-1"}, {"name": "disk-2-2"}]}
        ]});
        let ctx: SharedContext = Arc::new(MockContext::new().with_json("/r.json", &report));

        for criteria in ["{ slot: \"2\" }", "[\"slot=2\"]"] {
            let q = queries(&format!(
                "- resource: local_storage\n  params: {{ path: /r.json }}\n  where: {}\n  members: [count, names, path]\n",
                criteria
            ));
            let r = run_query(&registry(), &q[0], &ctx);
            assert_eq!(r.status, QueryStatus::Ok);
            assert_eq!(r.values["count"], json!(1));
            assert_eq!(r.values["names"], json!(["disk-2-1", "disk-2-2"]));
            assert_eq!(r.values["path"], json!("/r.json"));
        }
    }

    #[test]
    fn test_bad_criterion_is_an_error() {
        let ctx: SharedContext = Arc::new(MockContext::new().with_json("/r.json", &json!({"controllers": []})));
        let q = queries("- resource: local_storage\n  params: { path: /r.json }\n  where: { bay: 1 }\n");
        let r = run_query(&registry(), &q[0], &ctx);
        assert_eq!(r.status, QueryStatus::Errored);
        assert!(r.reason.unwrap().contains("bay"));
    }

    #[test]
    fn test_load_queries_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checks.yaml");
        std::fs::write(&path, "- resource: processes\n  members: [count]\n").unwrap();
        let loaded = load_queries(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].resource, "processes");
        assert!(loaded[0].criteria.is_empty());
    }
}
