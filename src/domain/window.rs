use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::node::{Condition, Node, Record};

/// Server-delivered description of one business-entity screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowConfig {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub tabs: Vec<TabConfig>,
    /// `fields[i]` describes the record shape of `tabs[i]`.
    #[serde(default)]
    pub fields: Vec<Vec<FieldConfig>>,
}

impl WindowConfig {
    pub fn master(&self) -> Option<&TabConfig> {
        self.tabs.first()
    }

    /// Detail tabs with their index into `tabs`/`fields`.
    pub fn detail_tabs(&self) -> impl Iterator<Item = (usize, &TabConfig)> {
        self.tabs.iter().enumerate().skip(1)
    }

    pub fn fields_of(&self, tab_index: usize) -> &[FieldConfig] {
        self.fields
            .get(tab_index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn permission(&self) -> Permission {
        Permission::from_config(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabConfig {
    #[serde(default)]
    pub title: String,
    /// Table name used by the detail endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_proc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_proc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_proc: Option<Value>,
    /// Explicit layout replacing the one generated from `fields`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<TreeHints>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeHints {
    #[serde(default = "default_parent_field")]
    pub parent_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_field: Option<String>,
}

fn default_parent_field() -> String {
    "parentId".to_string()
}

/// Field descriptor of one tab, as delivered by the config endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "default_field_kind", rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
    /// Option endpoint template for select fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub map_key: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<Condition>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<u32>,
}

fn default_field_kind() -> String {
    "input".to_string()
}

/// Operations granted by the master tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub new: bool,
    pub edit: bool,
    pub delete: bool,
}

impl Permission {
    /// Only the presence of a stored-operation identifier matters.
    pub fn from_config(config: &WindowConfig) -> Self {
        let Some(master) = config.master() else {
            return Self::default();
        };
        Self {
            new: master.insert_proc.is_some(),
            edit: master.update_proc.is_some(),
            delete: master.delete_proc.is_some(),
        }
    }
}

/// Save semantics of a dialog, sent as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EditMode {
    New = 1,
    Edit = 2,
    Delete = 3,
}

impl From<EditMode> for u8 {
    fn from(mode: EditMode) -> Self {
        mode as u8
    }
}

impl TryFrom<u8> for EditMode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(EditMode::New),
            2 => Ok(EditMode::Edit),
            3 => Ok(EditMode::Delete),
            other => Err(format!("unknown edit mode {other}")),
        }
    }
}

/// Normalizes an id value to the string key used for lookups.
pub fn row_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn record_key(record: &Record, field: &str) -> Option<String> {
    record.get(field).and_then(row_key)
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    row_key(&value).ok_or_else(|| serde::de::Error::custom(format!("invalid window id {value}")))
}
