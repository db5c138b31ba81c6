//! `local_storage` - storage controllers from a controller report
//!
//! The report is a JSON document written by the vendor's array utility:
//!
//! ```json
//! {"controllers": [
//!   {"slot": "1", "model": "P440ar", "status": "OK",
//!    "logical_drives": [{"name": "disk-1-1"}]}
//! ]}
//! ```
//!
//! One row per controller. `names` lists the logical drive names of the
//! controllers in view.

use crate::context::{SharedContext, TargetSelector};
use crate::filter::{rows_from_value, Column, ColumnSet, ColumnType, Row};
use crate::resource::{fail, Flow, OrSkip, Params, ResourceDefinition, ResourceError};
use serde_json::Value;

pub struct Report {
    controllers: Vec<Row>,
}

impl Report {
    fn read(params: &Params, context: &SharedContext) -> Flow<Self> {
        let Some(path) = params.get("path").and_then(Value::as_str) else {
            return Err(fail("parameter 'path' must be a string"));
        };

        let selector = TargetSelector::file(path);
        let report = context
            .fetch(&selector)
            .or_skip("storage report unavailable")?
            .into_json(&selector)?;

        let Some(controllers) = report.get("controllers") else {
            return Err(fail(format!("{} has no 'controllers' list", path)));
        };

        Ok(Self {
            controllers: rows_from_value(controllers),
        })
    }
}

fn columns() -> Result<ColumnSet, ResourceError> {
    Ok(ColumnSet::new(vec![
        Column::new("slot"),
        Column::new("model"),
        Column::new("status").plural("statuses"),
        Column::new("drive")
            .path("logical_drives.*.name")
            .plural("names")
            .kind(ColumnType::List)
            .flatten(),
        Column::computed("drive_count", |row| {
            Value::from(
                row.get("logical_drives")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len),
            )
        })
        .kind(ColumnType::Number),
    ])?)
}

pub fn definition() -> Result<ResourceDefinition<Report>, ResourceError> {
    Ok(ResourceDefinition::new("local_storage", 1, Report::read)
        .description("Storage controllers and their logical drives")
        .example("local_storage(path: \"/var/lib/ssa/report.json\").where(\"slot=2\").names")
        .identifier("path")
        .predicate("healthy?", |r| {
            Ok(!r.controllers.is_empty()
                && r.controllers
                    .iter()
                    .all(|c| c.get("status").and_then(Value::as_str) == Some("OK")))
        })
        .plural(columns()?, |r| r.controllers.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MockContext;
    use crate::filter::Comparison;
    use crate::resource::Registry;
    use serde_json::json;
    use std::sync::Arc;

    fn report() -> Value {
        json!({"controllers": [
            {"slot": "1", "model": "P440ar", "status": "OK",
             "logical_drives": [{"name": "disk-1-1"}]},
            {"slot": "2", "model": "P840", "status": "Degraded",
             "logical_drives": [{"name": "disk-2-1"}, {"name": "disk-2-2"}]}
        ]})
    }

    fn open(ctx: MockContext) -> crate::resource::ResourceInstance {
        let mut registry = Registry::new();
        registry.register(definition().unwrap()).unwrap();
        registry
            .instantiate(
                "local_storage",
                None,
                json!({"path": "/r.json"}).as_object().cloned().unwrap(),
                Arc::new(ctx),
            )
            .unwrap()
    }

    #[test]
    fn test_slot_filter() {
        let storage = open(MockContext::new().with_json("/r.json", &report()));
        let slot = storage.filter([Comparison::eq("slot", "2")]).unwrap();
        assert_eq!(slot.count(), 1);
        assert_eq!(slot.plural("names").unwrap(), vec![json!("disk-2-1"), json!("disk-2-2")]);
        assert_eq!(storage.property("count").unwrap(), json!(2));
        assert!(!storage.matcher("be_healthy").unwrap());
    }

    #[test]
    fn test_drive_count_column() {
        let storage = open(MockContext::new().with_json("/r.json", &report()));
        let big = storage.filter(["drive_count>=2".parse().unwrap()]).unwrap();
        assert_eq!(big.plural("models").unwrap(), vec![json!("P840")]);
    }

    #[test]
    fn test_missing_report_skips() {
        let storage = open(MockContext::new());
        assert!(storage.is_skipped());
        assert!(storage.skip_reason().unwrap().contains("/r.json"));
        assert_eq!(storage.property("names").unwrap(), json!([]));
        assert_eq!(storage.property("count").unwrap(), json!(0));
        assert_eq!(storage.property("path").unwrap(), json!("/r.json"));
    }

    #[test]
    fn test_report_without_controllers_fails() {
        let mut registry = Registry::new();
        registry.register(definition().unwrap()).unwrap();
        let err = registry
            .instantiate(
                "local_storage",
                None,
                json!({"path": "/r.json"}).as_object().cloned().unwrap(),
                Arc::new(MockContext::new().with_json("/r.json", &json!({}))),
            )
            .unwrap_err();
        assert!(matches!(err, ResourceError::Construction { .. }));
    }
}
