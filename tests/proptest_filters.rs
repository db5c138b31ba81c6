//! Property-based tests using proptest
//!
//! These tests verify the filter table, path extraction, and the naming
//! transform using randomized inputs.

use inspekt::filter::{
    extract_path, rows_from_value, Column, ColumnSet, ColumnType, Comparison, FilterTable,
    Operator,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

/// Generate arbitrary controller-like rows
fn arb_row() -> impl Strategy<Value = Value> {
    (
        "[a-z][a-z0-9-]{0,20}", // name
        prop_oneof!["OK", "Degraded", "Failed"],
        0u32..8, // slot
        prop::collection::vec("disk-[0-9]", 0..4),
    )
        .prop_map(|(name, status, slot, drives)| {
            json!({
                "name": name,
                "status": status,
                "slot": slot,
                "drives": drives,
            })
        })
}

/// Generate a list of rows
fn arb_rows() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(arb_row(), 0..60)
}

fn arb_status() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("OK"), Just("Degraded"), Just("Failed")]
}

fn table(rows: &[Value]) -> FilterTable {
    let columns = ColumnSet::new(vec![
        Column::new("name"),
        Column::new("status").plural("statuses"),
        Column::new("slot").kind(ColumnType::Number),
        Column::new("drive")
            .path("drives")
            .kind(ColumnType::List)
            .flatten(),
    ])
    .unwrap();
    FilterTable::new(rows_from_value(&Value::Array(rows.to_vec())), Arc::new(columns))
}

fn names(view: &FilterTable) -> Vec<Value> {
    view.values("name").unwrap()
}

proptest! {
    /// No criteria returns every row
    #[test]
    fn empty_filter_returns_all(rows in arb_rows()) {
        let t = table(&rows);
        let view = t.filter(Vec::<Comparison>::new()).unwrap();
        prop_assert_eq!(view.count(), rows.len());
    }

    /// Filtering never increases the number of rows
    #[test]
    fn filter_never_increases_count(rows in arb_rows(), status in arb_status()) {
        let t = table(&rows);
        let view = t.filter([Comparison::eq("status", status)]).unwrap();
        prop_assert!(view.count() <= t.count());
    }

    /// Filtering leaves the table it was derived from untouched
    #[test]
    fn filter_does_not_mutate_base(rows in arb_rows(), slot in 0u32..8) {
        let t = table(&rows);
        let before = t.to_values();
        let _view = t.filter([Comparison::new("slot", Operator::Ge, slot)]).unwrap();
        prop_assert_eq!(t.to_values(), before);
        prop_assert_eq!(t.criteria_len(), 0);
    }

    /// Surviving rows keep their enumeration order
    #[test]
    fn filter_preserves_order(rows in arb_rows(), status in arb_status()) {
        let t = table(&rows);
        let expected: Vec<Value> = rows
            .iter()
            .filter(|r| r["status"] == status)
            .map(|r| r["name"].clone())
            .collect();
        let view = t.filter([Comparison::eq("status", status)]).unwrap();
        prop_assert_eq!(names(&view), expected);
    }

    /// Chaining two filters equals applying both at once
    #[test]
    fn chained_filters_are_conjunctive(
        rows in arb_rows(),
        status in arb_status(),
        slot in 0u32..8
    ) {
        let t = table(&rows);
        let by_status = Comparison::eq("status", status);
        let by_slot = Comparison::new("slot", Operator::Lt, slot);

        let chained = t.filter([by_status.clone()]).unwrap().filter([by_slot.clone()]).unwrap();
        let combined = t.filter([by_status, by_slot]).unwrap();

        prop_assert_eq!(chained.to_values(), combined.to_values());
        for row in chained.to_values() {
            prop_assert_eq!(&row["status"], &json!(status));
            prop_assert!(row["slot"].as_u64().unwrap() < u64::from(slot));
        }
    }

    /// Every row in an equality view has the requested value
    #[test]
    fn equality_view_is_exact(rows in arb_rows(), status in arb_status()) {
        let view = table(&rows).filter([Comparison::eq("status", status)]).unwrap();
        prop_assert!(view.values("status").unwrap().iter().all(|s| s == status));
    }

    /// Flattened plural values are unique
    #[test]
    fn flattened_values_are_unique(rows in arb_rows()) {
        let drives = table(&rows).plural("drives").unwrap();
        let mut seen = drives.clone();
        seen.sort_by_key(|v| v.to_string());
        seen.dedup();
        prop_assert_eq!(seen.len(), drives.len());
    }

    /// Criterion strings parse to the comparisons they spell
    #[test]
    fn parsed_criteria_filter_like_built_ones(rows in arb_rows(), slot in 0u32..8) {
        let t = table(&rows);
        let parsed: Comparison = format!("slot>={}", slot).parse().unwrap();
        let built = Comparison::new("slot", Operator::Ge, slot);
        prop_assert_eq!(
            t.filter([parsed]).unwrap().count(),
            t.filter([built]).unwrap().count()
        );
    }
}

/// Tests for JSON path extraction
mod json_path_tests {
    use super::*;

    proptest! {
        /// Extracting with empty path returns the original value
        #[test]
        fn empty_path_returns_original(row in arb_row()) {
            prop_assert_eq!(extract_path(&row, ""), row);
        }

        /// Extracting "name" always returns a string
        #[test]
        fn name_extraction_returns_string(row in arb_row()) {
            prop_assert!(extract_path(&row, "name").is_string());
        }

        /// Extracting a non-existent path returns null
        #[test]
        fn nonexistent_path_returns_null(row in arb_row()) {
            prop_assert!(extract_path(&row, "nonexistent.deeply.nested").is_null());
        }
    }
}

/// Tests for the naming transform
mod naming_tests {
    use inspekt::resource::derive_exposed_name;
    use proptest::prelude::*;

    proptest! {
        /// Predicate names gain a `be_` prefix
        #[test]
        fn question_mark_becomes_be(name in "[a-z][a-z0-9_]{0,20}") {
            prop_assert_eq!(
                derive_exposed_name(&format!("{}?", name)).unwrap(),
                format!("be_{}", name)
            );
        }

        /// `has_` becomes `have_`
        #[test]
        fn has_becomes_have(name in "[a-z][a-z0-9_]{0,20}") {
            prop_assert_eq!(
                derive_exposed_name(&format!("has_{}", name)).unwrap(),
                format!("have_{}", name)
            );
        }

        /// Plain names are exposed unchanged
        #[test]
        fn plain_names_are_identity(name in "[a-gi-z][a-z0-9_]{0,20}") {
            prop_assert_eq!(derive_exposed_name(&name).unwrap(), name);
        }
    }
}
