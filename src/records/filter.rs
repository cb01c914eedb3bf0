use serde_json::Value;

use super::tree::{TreeRow, fold_tree};
use crate::domain::Record;

/// Text of a scalar cell; containers and nulls are not searchable.
pub(crate) fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Case-insensitive substring match over `columns` (every cell when empty).
pub fn record_matches(record: &Record, query: &str, columns: &[String]) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    let hit = |value: &Value| {
        cell_text(value)
            .map(|text| text.to_lowercase().contains(&needle))
            .unwrap_or(false)
    };
    if columns.is_empty() {
        record.values().any(hit)
    } else {
        columns
            .iter()
            .filter_map(|column| record.get(column))
            .any(hit)
    }
}

pub fn filter_records(records: &[Record], query: &str, columns: &[String]) -> Vec<Record> {
    records
        .iter()
        .filter(|record| record_matches(record, query, columns))
        .cloned()
        .collect()
}

/// Keeps matching rows together with every ancestor on their path.
pub fn filter_tree(rows: &[TreeRow], query: &str, columns: &[String]) -> Vec<TreeRow> {
    fold_tree(rows, |row, children| {
        (!children.is_empty() || record_matches(&row.record, query, columns)).then(|| TreeRow {
            record: row.record.clone(),
            children,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::tree::{TreeOptions, nest};
    use serde_json::json;

    fn records() -> Vec<Record> {
        json!([
            {"id": 1, "parentId": null, "name": "Finance"},
            {"id": 2, "parentId": 1, "name": "Payroll", "code": 77},
            {"id": 3, "parentId": null, "name": "Sales"}
        ])
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row.as_object().unwrap().clone())
        .collect()
    }

    #[test]
    fn filters_case_insensitively() {
        let hits = filter_records(&records(), "PAY", &[]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["id"], json!(2));
        assert_eq!(filter_records(&records(), "77", &[]).len(), 1);
        assert!(filter_records(&records(), "77", &["name".to_string()]).is_empty());
        assert_eq!(filter_records(&records(), "  ", &[]).len(), 3);
    }

    #[test]
    fn tree_filter_keeps_ancestors() {
        let tree = nest(&records(), &TreeOptions::default());
        let filtered = filter_tree(&tree, "payroll", &[]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].record["name"], json!("Finance"));
        assert_eq!(filtered[0].children.len(), 1);
    }

    #[test]
    fn tree_filter_walks_deep_chains() {
        let records: Vec<Record> = (0..20_000)
            .map(|i| {
                let parent = if i == 0 { Value::Null } else { json!(i - 1) };
                let name = if i == 19_999 { "needle" } else { "hay" };
                json!({"id": i, "parentId": parent, "name": name})
                    .as_object()
                    .unwrap()
                    .clone()
            })
            .collect();
        let tree = nest(&records, &TreeOptions::default());
        let filtered = filter_tree(&tree, "needle", &["name".to_string()]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(crate::records::flatten(&filtered).len(), 20_000);
        assert!(filter_tree(&tree, "missing", &[]).is_empty());
    }
}
