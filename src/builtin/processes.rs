//! `processes` - the process table, one row per process

use crate::context::{SharedContext, TargetSelector};
use crate::filter::{rows_from_value, Column, ColumnSet, ColumnType, Row};
use crate::resource::declarative::Format;
use crate::resource::{fail, skip, Flow, OrSkip, Params, ResourceDefinition, ResourceError};
use serde_json::Value;

pub const PS_COMMAND: &str = "ps -eo pid=,ppid=,user=,args=";

pub struct ProcessTable {
    rows: Vec<Row>,
}

impl ProcessTable {
    fn list(_params: &Params, context: &SharedContext) -> Flow<Self> {
        let selector = TargetSelector::command(PS_COMMAND);
        let result = context
            .fetch(&selector)
            .or_skip("cannot list processes")?
            .into_json(&selector)?;

        let status = result["exit_status"].as_i64().unwrap_or(-1);
        if status != 0 {
            return Err(skip(format!("ps exited with status {}", status)));
        }

        let format = Format::Delimited {
            delimiter: None,
            fields: ["pid", "ppid", "user", "command"].map(String::from).to_vec(),
            header: false,
        };
        let table = format
            .parse(result["stdout"].as_str().unwrap_or_default())
            .map_err(fail)?;

        Ok(Self {
            rows: rows_from_value(&table).into_iter().map(numeric_ids).collect(),
        })
    }
}

/// `pid` and `ppid` as JSON numbers
fn numeric_ids(mut row: Row) -> Row {
    for key in ["pid", "ppid"] {
        let parsed = row
            .get(key)
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(n) = parsed {
            row.insert(key.to_string(), Value::from(n));
        }
    }
    row
}

pub fn definition() -> Result<ResourceDefinition<ProcessTable>, ResourceError> {
    let columns = ColumnSet::new(vec![
        Column::new("pid").kind(ColumnType::Number),
        Column::new("ppid").kind(ColumnType::Number),
        Column::new("user"),
        Column::new("command"),
    ])?;

    Ok(ResourceDefinition::new("processes", 1, ProcessTable::list)
        .description("Running processes")
        .example("processes.where(\"command=~nginx\").users")
        .plural(columns, |t| t.rows.clone()))
}
