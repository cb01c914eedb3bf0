use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde_json::Value;

use super::{
    node::{
        ButtonNode, Conditions, DataSourceDescriptor, FieldNode, FieldType, GroupNode, LayoutMode,
        Node, NodeCommon, RemoteSource, Rules, SelectNode, TabPane, TabsNode,
    },
    window::{FieldConfig, WindowConfig},
};

pub const SUBMIT_ACTION: &str = "submit";
pub const CANCEL_ACTION: &str = "cancel";

/// Parse one raw schema node.
pub fn parse_node(value: &Value) -> Result<Node> {
    if !value.is_object() {
        bail!("schema node must be a JSON object");
    }
    serde_json::from_value(value.clone()).context("failed to parse schema node")
}

/// Parse the first element of a config endpoint response.
pub fn parse_window_config(value: &Value) -> Result<WindowConfig> {
    let first = match value {
        Value::Array(items) => items.first().context("config response is empty")?,
        other => other,
    };
    serde_json::from_value(first.clone()).context("failed to parse window config")
}

/// Map one tab of a window config to its schema tree.
///
/// The master tab additionally gets a hidden `id_field` leaf when no field
/// descriptor declares the key, one detail pane per child tab and the
/// dialog's submit/cancel buttons.
pub fn schema_for_tab(config: &WindowConfig, tab_index: usize, id_field: &str) -> Result<Node> {
    let tab = config
        .tabs
        .get(tab_index)
        .with_context(|| format!("window '{}' has no tab {tab_index}", config.id))?;
    if let Some(layout) = &tab.layout {
        return Ok(layout.clone());
    }

    let mut group = fields_group(config.fields_of(tab_index));
    group.columns = Some(2);

    if tab_index == 0 {
        if !config.fields_of(0).iter().any(|field| field.name == id_field) {
            group.children.insert(0, Node::Field(key_field(id_field)));
        }
        let panes: Vec<TabPane> = config
            .detail_tabs()
            .map(|(index, detail)| TabPane {
                key: detail_key(index, detail.table.as_deref()),
                label: Some(detail.title.clone()),
                children: fields_group(config.fields_of(index)).children,
                detail: true,
            })
            .collect();
        if !panes.is_empty() {
            group.children.push(Node::Tabs(TabsNode {
                common: full_width(),
                tabs: panes,
            }));
        }
        group.children.push(action_bar());
    }

    Ok(Node::Group(group))
}

/// Confirmation schema of the delete dialog: only the record key.
pub fn delete_schema(id_field: &str) -> Node {
    let mut key = FieldNode::new(id_field, FieldType::Input).with_label(id_field);
    key.common.conditions.disabled = Some(super::Condition::Literal(true));
    Node::Group(GroupNode::new(vec![Node::Field(key), action_bar()]))
}

fn key_field(id_field: &str) -> FieldNode {
    let mut key = FieldNode::new(id_field, FieldType::Input);
    key.common.conditions.visible = Some(super::Condition::Literal(false));
    key
}

/// Key of a detail pane; the table name when the tab has one.
pub fn detail_key(tab_index: usize, table: Option<&str>) -> String {
    table
        .map(str::to_string)
        .unwrap_or_else(|| format!("tab{tab_index}"))
}

fn fields_group(fields: &[FieldConfig]) -> GroupNode {
    let mut sources: IndexMap<String, DataSourceDescriptor> = IndexMap::new();
    let children = fields
        .iter()
        .map(|field| {
            if let Some(url) = &field.reference {
                sources.insert(
                    field.name.clone(),
                    DataSourceDescriptor::Remote(RemoteSource {
                        url: url.clone(),
                        map_key: field.map_key.clone(),
                    }),
                );
            }
            field_node(field)
        })
        .collect();
    GroupNode {
        children,
        data_source: sources,
        ..GroupNode::default()
    }
}

fn field_node(field: &FieldConfig) -> Node {
    let mut deps = field.deps.clone();
    for linked in field.map_key.values() {
        if !deps.contains(linked) {
            deps.push(linked.clone());
        }
    }
    let common = NodeCommon {
        span: field.span,
        deps,
        conditions: Conditions {
            visible: if field.hidden {
                Some(super::Condition::Literal(false))
            } else {
                field.visible.clone()
            },
            disabled: field.disabled.clone(),
        },
        width: None,
    };
    let rules = Rules {
        required: field.required,
        email: field.email,
        min: field.min,
        max: field.max,
    };

    match field.kind.to_ascii_lowercase().as_str() {
        kind @ ("select" | "multiselect") => {
            let node = SelectNode {
                common,
                name: field.name.clone(),
                label: field.label.clone(),
                rules,
                key_source: field.reference.as_ref().map(|_| field.name.clone()),
                options: field.options.clone(),
            };
            if kind == "select" {
                Node::Select(node)
            } else {
                Node::Multiselect(node)
            }
        }
        kind @ ("number" | "color" | "rating") => {
            let node = FieldNode {
                common,
                name: field.name.clone(),
                label: field.label.clone(),
                rules,
                field_type: FieldType::Input,
            };
            match kind {
                "number" => Node::Number(node),
                "color" => Node::Color(node),
                _ => Node::Rating(node),
            }
        }
        _ => Node::Field(FieldNode {
            common,
            name: field.name.clone(),
            label: field.label.clone(),
            rules,
            field_type: FieldType::from(field.kind.clone()),
        }),
    }
}

fn action_bar() -> Node {
    Node::Group(GroupNode {
        common: full_width(),
        layout: LayoutMode::Flex,
        children: vec![
            button(SUBMIT_ACTION, "common.save"),
            button(CANCEL_ACTION, "common.cancel"),
        ],
        ..GroupNode::default()
    })
}

fn button(action: &str, label: &str) -> Node {
    Node::Button(ButtonNode {
        common: NodeCommon::default(),
        action: action.to_string(),
        label: label.to_string(),
    })
}

fn full_width() -> NodeCommon {
    NodeCommon {
        span: Some(2),
        ..NodeCommon::default()
    }
}
