use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};
use serde_json::{Map, Value};

/// An open key-value row. Every persisted record carries an `id`.
pub type Record = Map<String, Value>;

/// Host-supplied condition callback, invoked with `{dep: value}`.
pub type ConditionFn = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// One declarative UI element.
///
/// Renderer, validator and default synthesis all match on this exhaustively,
/// so a new node kind has to be handled everywhere before the crate builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Field(FieldNode),
    Select(SelectNode),
    Multiselect(SelectNode),
    Number(FieldNode),
    Color(FieldNode),
    Rating(FieldNode),
    Button(ButtonNode),
    Text(TextNode),
    Alert(AlertNode),
    Group(GroupNode),
    Fieldset(FieldsetNode),
    Tabs(TabsNode),
    Line(NodeCommon),
    Empty(NodeCommon),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCommon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<Condition>,
}

impl Conditions {
    pub fn is_empty(&self) -> bool {
        self.visible.is_none() && self.disabled.is_none()
    }
}

/// A visibility or disabled rule.
#[derive(Clone)]
pub enum Condition {
    Literal(bool),
    Expression(String),
    Function(ConditionFn),
}

impl Condition {
    pub fn function(f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        Condition::Function(Arc::new(f))
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Condition::Expression(source) => f.debug_tuple("Expression").field(source).finish(),
            Condition::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Condition::Literal(a), Condition::Literal(b)) => a == b,
            (Condition::Expression(a), Condition::Expression(b)) => a == b,
            (Condition::Function(a), Condition::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Condition::Literal(value) => serializer.serialize_bool(*value),
            Condition::Expression(source) => serializer.serialize_str(source),
            Condition::Function(_) => Err(ser::Error::custom(
                "function conditions cannot be serialized",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Bool(value) => Ok(Condition::Literal(value)),
            Value::String(source) => Ok(Condition::Expression(source)),
            other => Err(de::Error::custom(format!(
                "condition must be a boolean or an expression string, found {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rules {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub email: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl Rules {
    pub fn is_empty(&self) -> bool {
        !self.required && !self.email && self.min.is_none() && self.max.is_none()
    }
}

/// Editor flavour of a `field` node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    #[default]
    Input,
    Textarea,
    Password,
    Date,
    Checkbox,
    Radio,
    Other(String),
}

impl From<String> for FieldType {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "input" | "text" => FieldType::Input,
            "textarea" => FieldType::Textarea,
            "password" => FieldType::Password,
            "date" => FieldType::Date,
            "checkbox" => FieldType::Checkbox,
            "radio" => FieldType::Radio,
            _ => FieldType::Other(raw),
        }
    }
}

impl From<FieldType> for String {
    fn from(kind: FieldType) -> Self {
        match kind {
            FieldType::Input => "input".to_string(),
            FieldType::Textarea => "textarea".to_string(),
            FieldType::Password => "password".to_string(),
            FieldType::Date => "date".to_string(),
            FieldType::Checkbox => "checkbox".to_string(),
            FieldType::Radio => "radio".to_string(),
            FieldType::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Rules::is_empty")]
    pub rules: Rules,
    #[serde(default)]
    pub field_type: FieldType,
}

impl FieldNode {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            common: NodeCommon::default(),
            name: name.into(),
            label: None,
            rules: Rules::default(),
            field_type,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_common(mut self, common: NodeCommon) -> Self {
        self.common = common;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Rules::is_empty")]
    pub rules: Rules,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
}

impl SelectNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            common: NodeCommon::default(),
            name: name.into(),
            label: None,
            rules: Rules::default(),
            key_source: None,
            options: None,
        }
    }

    pub fn with_key_source(mut self, source: impl Into<String>) -> Self {
        self.key_source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    pub action: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_dismiss_action")]
    pub action: String,
}

fn default_dismiss_action() -> String {
    "dismiss".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Grid,
    Flex,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub layout: LayoutMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub data_source: IndexMap<String, DataSourceDescriptor>,
}

impl GroupNode {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            children,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldsetNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub group: GroupNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabsNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    #[serde(default)]
    pub tabs: Vec<TabPane>,
}

/// One tab of a `tabs` node. Detail panes list the columns of a child grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabPane {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub detail: bool,
}

/// A named option list: inline rows or a remote endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataSourceDescriptor {
    Static(Vec<Value>),
    Remote(RemoteSource),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSource {
    pub url: String,
    /// Placeholder token in `url` -> field whose live value replaces it.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub map_key: IndexMap<String, String>,
}

impl Node {
    pub fn common(&self) -> &NodeCommon {
        match self {
            Node::Field(node) | Node::Number(node) | Node::Color(node) | Node::Rating(node) => {
                &node.common
            }
            Node::Select(node) | Node::Multiselect(node) => &node.common,
            Node::Button(node) => &node.common,
            Node::Text(node) => &node.common,
            Node::Alert(node) => &node.common,
            Node::Group(node) => &node.common,
            Node::Fieldset(node) => &node.common,
            Node::Tabs(node) => &node.common,
            Node::Line(common) | Node::Empty(common) => common,
        }
    }

    /// Value-map key of a leaf; `None` for containers and decorations.
    pub fn name(&self) -> Option<&str> {
        match self {
            Node::Field(node) | Node::Number(node) | Node::Color(node) | Node::Rating(node) => {
                Some(&node.name)
            }
            Node::Select(node) | Node::Multiselect(node) => Some(&node.name),
            Node::Button(_)
            | Node::Text(_)
            | Node::Alert(_)
            | Node::Group(_)
            | Node::Fieldset(_)
            | Node::Tabs(_)
            | Node::Line(_)
            | Node::Empty(_) => None,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Node::Field(node) | Node::Number(node) | Node::Color(node) | Node::Rating(node) => {
                node.label.as_deref()
            }
            Node::Select(node) | Node::Multiselect(node) => node.label.as_deref(),
            Node::Button(node) => Some(&node.label),
            Node::Fieldset(node) => node.title.as_deref(),
            Node::Text(_)
            | Node::Alert(_)
            | Node::Group(_)
            | Node::Tabs(_)
            | Node::Line(_)
            | Node::Empty(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Field(_) => "field",
            Node::Select(_) => "select",
            Node::Multiselect(_) => "multiselect",
            Node::Number(_) => "number",
            Node::Color(_) => "color",
            Node::Rating(_) => "rating",
            Node::Button(_) => "button",
            Node::Text(_) => "text",
            Node::Alert(_) => "alert",
            Node::Group(_) => "group",
            Node::Fieldset(_) => "fieldset",
            Node::Tabs(_) => "tabs",
            Node::Line(_) => "line",
            Node::Empty(_) => "empty",
        }
    }

    /// Children that belong to the same value map. Detail tab panes are
    /// excluded: their children describe grid columns of child records.
    pub fn form_children(&self) -> Vec<&Node> {
        match self {
            Node::Group(group) => group.children.iter().collect(),
            Node::Fieldset(fieldset) => fieldset.group.children.iter().collect(),
            Node::Tabs(tabs) => tabs
                .tabs
                .iter()
                .filter(|pane| !pane.detail)
                .flat_map(|pane| pane.children.iter())
                .collect(),
            Node::Field(_)
            | Node::Select(_)
            | Node::Multiselect(_)
            | Node::Number(_)
            | Node::Color(_)
            | Node::Rating(_)
            | Node::Button(_)
            | Node::Text(_)
            | Node::Alert(_)
            | Node::Line(_)
            | Node::Empty(_) => Vec::new(),
        }
    }

    /// All data source descriptors declared by groups in this subtree.
    /// A name declared twice resolves to the innermost declaration.
    pub fn data_sources(&self) -> IndexMap<String, DataSourceDescriptor> {
        let mut out = IndexMap::new();
        collect_sources(self, &mut out);
        out
    }
}

fn collect_sources(node: &Node, out: &mut IndexMap<String, DataSourceDescriptor>) {
    let own = match node {
        Node::Group(group) => Some(&group.data_source),
        Node::Fieldset(fieldset) => Some(&fieldset.group.data_source),
        _ => None,
    };
    if let Some(sources) = own {
        for (name, descriptor) in sources {
            out.insert(name.clone(), descriptor.clone());
        }
    }
    for child in node.form_children() {
        collect_sources(child, out);
    }
}

impl From<GroupNode> for Node {
    fn from(group: GroupNode) -> Self {
        Node::Group(group)
    }
}

impl From<FieldNode> for Node {
    fn from(field: FieldNode) -> Self {
        Node::Field(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_nodes_with_common_attributes() {
        let raw = json!({
            "type": "group",
            "columns": 2,
            "dataSource": {
                "orgUnit": {"url": "/x?u=#U#", "mapKey": {"#U#": "username"}},
                "colors": [{"id": 1, "name": "red"}]
            },
            "children": [
                {"type": "field", "name": "email", "fieldType": "input", "rules": {"required": true, "email": true}},
                {"type": "select", "name": "unit", "keySource": "orgUnit", "deps": ["username"],
                 "conditions": {"visible": "username != ''", "disabled": false}},
                {"type": "line"}
            ]
        });
        let node: Node = serde_json::from_value(raw).expect("valid schema node");
        let Node::Group(group) = &node else {
            panic!("expected group");
        };
        assert_eq!(group.columns, Some(2));
        assert_eq!(group.children.len(), 3);
        assert!(matches!(
            group.data_source.get("orgUnit"),
            Some(DataSourceDescriptor::Remote(_))
        ));
        assert!(matches!(
            group.data_source.get("colors"),
            Some(DataSourceDescriptor::Static(rows)) if rows.len() == 1
        ));
        let select = &group.children[1];
        assert_eq!(select.name(), Some("unit"));
        assert_eq!(select.common().deps, vec!["username".to_string()]);
        assert_eq!(
            select.common().conditions.visible,
            Some(Condition::Expression("username != ''".to_string()))
        );
        assert_eq!(
            select.common().conditions.disabled,
            Some(Condition::Literal(false))
        );
    }

    #[test]
    fn unknown_field_types_are_preserved() {
        let raw = json!({"type": "field", "name": "when", "fieldType": "datetime-local"});
        let node: Node = serde_json::from_value(raw).unwrap();
        let Node::Field(field) = node else {
            panic!("expected field");
        };
        assert_eq!(field.field_type, FieldType::Other("datetime-local".to_string()));
    }

    #[test]
    fn detail_panes_are_not_form_children() {
        let raw = json!({
            "type": "tabs",
            "tabs": [
                {"key": "main", "children": [{"type": "field", "name": "a"}]},
                {"key": "lines", "detail": true, "children": [{"type": "field", "name": "qty"}]}
            ]
        });
        let node: Node = serde_json::from_value(raw).unwrap();
        let names: Vec<_> = node.form_children().iter().filter_map(|n| n.name()).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn function_conditions_refuse_serialization() {
        let mut common = NodeCommon::default();
        common.conditions.visible = Some(Condition::function(|_| true));
        let node = Node::Line(common);
        assert!(serde_json::to_value(&node).is_err());
    }
}
