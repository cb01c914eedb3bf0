use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Record, TreeHints, record_key};

pub const CHILDREN_KEY: &str = "children";

/// How parent links are read from flat rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeOptions {
    pub id_field: String,
    pub parent_field: String,
    /// Children are ordered by this field when set, else by insertion order.
    pub order_field: Option<String>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            parent_field: "parentId".to_string(),
            order_field: None,
        }
    }
}

impl TreeOptions {
    pub fn with_order_field(mut self, field: impl Into<String>) -> Self {
        self.order_field = Some(field.into());
        self
    }

    pub fn with_parent_field(mut self, field: impl Into<String>) -> Self {
        self.parent_field = field.into();
        self
    }
}

impl From<&TreeHints> for TreeOptions {
    fn from(hints: &TreeHints) -> Self {
        Self {
            parent_field: hints.parent_field.clone(),
            order_field: hints.code_field.clone(),
            ..Self::default()
        }
    }
}

/// A record and its nested children.
///
/// Clone, equality, drop and the tree walks below keep an explicit stack, so
/// arbitrarily deep parent chains never exhaust the call stack.
#[derive(Debug)]
pub struct TreeRow {
    pub record: Record,
    pub children: Vec<TreeRow>,
}

impl TreeRow {
    pub fn leaf(record: Record) -> Self {
        Self {
            record,
            children: Vec::new(),
        }
    }

    /// The record with its nested `children` array.
    ///
    /// Building is iterative; dropping the returned value recurses inside
    /// `serde_json`, so very deep trees are better walked than converted.
    pub fn to_value(&self) -> Value {
        let mut built = fold_tree(std::slice::from_ref(self), |row, children| {
            let mut object = row.record.clone();
            object.insert(CHILDREN_KEY.to_string(), Value::Array(children));
            Some(Value::Object(object))
        });
        built.pop().unwrap_or(Value::Null)
    }
}

impl Clone for TreeRow {
    fn clone(&self) -> Self {
        let mut built = fold_tree(std::slice::from_ref(self), |row, children| {
            Some(TreeRow {
                record: row.record.clone(),
                children,
            })
        });
        built.pop().unwrap_or_else(|| TreeRow::leaf(self.record.clone()))
    }
}

impl PartialEq for TreeRow {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if a.record != b.record || a.children.len() != b.children.len() {
                return false;
            }
            pending.extend(a.children.iter().zip(&b.children));
        }
        true
    }
}

impl Drop for TreeRow {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut row) = pending.pop() {
            pending.append(&mut row.children);
        }
    }
}

struct FoldFrame<'a, T> {
    row: &'a TreeRow,
    done: Vec<T>,
    next: std::slice::Iter<'a, TreeRow>,
}

/// Post-order fold over `rows`: `visit` receives a row with the results of
/// its children and may drop the row by returning `None`.
pub(crate) fn fold_tree<T>(
    rows: &[TreeRow],
    mut visit: impl FnMut(&TreeRow, Vec<T>) -> Option<T>,
) -> Vec<T> {
    let mut out = Vec::new();
    for root in rows {
        let mut stack = vec![FoldFrame {
            row: root,
            done: Vec::new(),
            next: root.children.iter(),
        }];
        while let Some(top) = stack.last_mut() {
            if let Some(child) = top.next.next() {
                stack.push(FoldFrame {
                    row: child,
                    done: Vec::new(),
                    next: child.children.iter(),
                });
                continue;
            }
            let Some(frame) = stack.pop() else {
                break;
            };
            let Some(result) = visit(frame.row, frame.done) else {
                continue;
            };
            match stack.last_mut() {
                Some(parent) => parent.done.push(result),
                None => out.push(result),
            }
        }
    }
    out
}

/// One row of the materialized (flat) order used for navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    pub key: Option<String>,
    pub depth: usize,
    pub has_children: bool,
    pub record: Record,
}

struct Frame {
    index: usize,
    children: Vec<TreeRow>,
    pending: std::vec::IntoIter<usize>,
}

/// Rebuild the nested tree from parent-id links.
///
/// Rows whose parent is missing from the set become roots. Rows that can
/// never be reached from a root (parent cycles) are promoted to roots in
/// insertion order; a visited set stops descent into ids already emitted.
pub fn nest(records: &[Record], options: &TreeOptions) -> Vec<TreeRow> {
    let keys: Vec<Option<String>> = records
        .iter()
        .map(|record| record_key(record, &options.id_field))
        .collect();

    let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    for (index, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            index_of.entry(key.as_str()).or_insert(index);
        }
    }

    let mut roots = Vec::new();
    let mut buckets: HashMap<usize, Vec<usize>> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        let parent = record_key(record, &options.parent_field)
            .and_then(|parent| index_of.get(parent.as_str()).copied())
            .filter(|parent| *parent != index);
        match parent {
            Some(parent) => buckets.entry(parent).or_default().push(index),
            None => roots.push(index),
        }
    }

    if let Some(field) = options.order_field.as_deref() {
        let by_code = |a: &usize, b: &usize| compare_values(records[*a].get(field), records[*b].get(field));
        roots.sort_by(by_code);
        for bucket in buckets.values_mut() {
            bucket.sort_by(by_code);
        }
    }

    let mut visited = vec![false; records.len()];
    let mut out = Vec::new();
    let promoted: Vec<usize> = (0..records.len()).collect();
    for root in roots.into_iter().chain(promoted) {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        let mut stack = vec![Frame {
            index: root,
            children: Vec::new(),
            pending: buckets.get(&root).cloned().unwrap_or_default().into_iter(),
        }];
        while let Some(top) = stack.last_mut() {
            if let Some(child) = top.pending.next() {
                if !visited[child] {
                    visited[child] = true;
                    stack.push(Frame {
                        index: child,
                        children: Vec::new(),
                        pending: buckets.get(&child).cloned().unwrap_or_default().into_iter(),
                    });
                }
                continue;
            }
            let Some(frame) = stack.pop() else {
                break;
            };
            let row = TreeRow {
                record: records[frame.index].clone(),
                children: frame.children,
            };
            match stack.last_mut() {
                Some(parent) => parent.children.push(row),
                None => out.push(row),
            }
        }
    }
    out
}

/// Preorder walk of a tree back to flat records.
pub fn flatten(rows: &[TreeRow]) -> Vec<Record> {
    let mut out = Vec::new();
    let mut stack: Vec<&TreeRow> = rows.iter().rev().collect();
    while let Some(row) = stack.pop() {
        out.push(row.record.clone());
        stack.extend(row.children.iter().rev());
    }
    out
}

/// Flat navigation order: preorder, skipping the children of collapsed rows.
pub fn visible_rows(rows: &[TreeRow], collapsed: &HashSet<String>, id_field: &str) -> Vec<FlatRow> {
    let mut out = Vec::new();
    let mut stack: Vec<(&TreeRow, usize)> = rows.iter().rev().map(|row| (row, 0)).collect();
    while let Some((row, depth)) = stack.pop() {
        let key = record_key(&row.record, id_field);
        let expanded = key.as_ref().is_none_or(|key| !collapsed.contains(key));
        out.push(FlatRow {
            key,
            depth,
            has_children: !row.children.is_empty(),
            record: row.record.clone(),
        });
        if expanded {
            stack.extend(row.children.iter().rev().map(|child| (child, depth + 1)));
        }
    }
    out
}

/// Paged rows materialize as-is at depth 0.
pub fn flat_rows(records: &[Record], id_field: &str) -> Vec<FlatRow> {
    records
        .iter()
        .map(|record| FlatRow {
            key: record_key(record, id_field),
            depth: 0,
            has_children: false,
            record: record.clone(),
        })
        .collect()
}

/// Numbers before strings, missing values last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            Some(Value::Number(_)) => 0,
            Some(Value::String(_)) => 1,
            Some(Value::Bool(_)) => 2,
            _ => 3,
        }
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(raw: Value) -> Vec<Record> {
        raw.as_array()
            .unwrap()
            .iter()
            .map(|row| row.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn nests_children_under_their_parent() {
        let records = rows(json!([
            {"id": 1, "parentId": null},
            {"id": 2, "parentId": 1},
            {"id": 3, "parentId": null}
        ]));
        let tree = nest(&records, &TreeOptions::default());
        let rendered: Vec<Value> = tree.iter().map(TreeRow::to_value).collect();
        assert_eq!(
            Value::Array(rendered),
            json!([
                {"id": 1, "parentId": null, "children": [{"id": 2, "parentId": 1, "children": []}]},
                {"id": 3, "parentId": null, "children": []}
            ])
        );
    }

    #[test]
    fn rebuilding_twice_is_idempotent() {
        let records = rows(json!([
            {"id": "a", "parentId": null, "code": 2},
            {"id": "b", "parentId": "a", "code": 9},
            {"id": "c", "parentId": "a", "code": 1},
            {"id": "d", "parentId": "c", "code": 5},
            {"id": "e", "parentId": null, "code": 1}
        ]));
        for options in [TreeOptions::default(), TreeOptions::default().with_order_field("code")] {
            let once = nest(&records, &options);
            let twice = nest(&flatten(&once), &options);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn orders_siblings_by_code_field() {
        let records = rows(json!([
            {"id": 1, "parentId": null, "code": "B"},
            {"id": 2, "parentId": null, "code": "A"},
            {"id": 3, "parentId": 2, "code": 20},
            {"id": 4, "parentId": 2, "code": 10}
        ]));
        let tree = nest(&records, &TreeOptions::default().with_order_field("code"));
        assert_eq!(tree[0].record["id"], json!(2));
        assert_eq!(tree[0].children[0].record["id"], json!(4));
        assert_eq!(tree[1].record["id"], json!(1));
    }

    #[test]
    fn cycles_never_loop_and_keep_every_row() {
        let records = rows(json!([
            {"id": 1, "parentId": 2},
            {"id": 2, "parentId": 1},
            {"id": 3, "parentId": 3},
            {"id": 4, "parentId": 99}
        ]));
        let tree = nest(&records, &TreeOptions::default());
        assert_eq!(flatten(&tree).len(), 4);
        let root_ids: Vec<_> = tree.iter().map(|row| row.record["id"].clone()).collect();
        assert_eq!(root_ids, vec![json!(3), json!(4), json!(1)]);
        assert_eq!(tree[2].children[0].record["id"], json!(2));
        assert!(tree[2].children[0].children.is_empty());
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let records: Vec<Record> = (0..20_000)
            .map(|i| {
                let parent = if i == 0 { Value::Null } else { json!(i - 1) };
                json!({"id": i, "parentId": parent}).as_object().unwrap().clone()
            })
            .collect();
        let tree = nest(&records, &TreeOptions::default());
        assert_eq!(tree.len(), 1);
        assert_eq!(flatten(&tree).len(), 20_000);
        let copy = tree.clone();
        assert_eq!(copy, tree);
    }

    #[test]
    fn deep_rows_render_with_nested_children() {
        let records: Vec<Record> = (0..500)
            .map(|i| {
                let parent = if i == 0 { Value::Null } else { json!(i - 1) };
                json!({"id": i, "parentId": parent}).as_object().unwrap().clone()
            })
            .collect();
        let tree = nest(&records, &TreeOptions::default());
        let value = tree[0].to_value();
        let mut depth = 0;
        let mut cursor = &value;
        while let Some(child) = cursor[CHILDREN_KEY].get(0) {
            depth += 1;
            cursor = child;
        }
        assert_eq!(depth, 499);
        assert_eq!(cursor["id"], json!(499));
        assert_eq!(cursor[CHILDREN_KEY], json!([]));
    }

    #[test]
    fn collapsed_rows_hide_their_descendants() {
        let records = rows(json!([
            {"id": 1, "parentId": null},
            {"id": 2, "parentId": 1},
            {"id": 3, "parentId": 2},
            {"id": 4, "parentId": null}
        ]));
        let tree = nest(&records, &TreeOptions::default());
        let all = visible_rows(&tree, &HashSet::new(), "id");
        let depths: Vec<_> = all.iter().map(|row| row.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 0]);

        let collapsed: HashSet<String> = ["1".to_string()].into_iter().collect();
        let visible = visible_rows(&tree, &collapsed, "id");
        let keys: Vec<_> = visible.iter().filter_map(|row| row.key.clone()).collect();
        assert_eq!(keys, vec!["1", "4"]);
        assert!(visible[0].has_children);
    }
}
