use std::sync::Arc;

use serde_json::Value;

use crate::domain::{FieldType, LayoutMode, Record, Severity};

pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A named input with everything needed to draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafView {
    pub name: String,
    pub kind: &'static str,
    pub field_type: Option<FieldType>,
    pub label: String,
    pub value: Value,
    pub disabled: bool,
    pub required: bool,
    pub options: Vec<Value>,
    pub error: Option<String>,
    pub span: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionView {
    pub action: String,
    pub label: String,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertView {
    pub message: String,
    pub severity: Severity,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerView {
    /// `group`, `fieldset`, `tabs` or `tab`.
    pub kind: &'static str,
    pub title: Option<String>,
    pub layout: LayoutMode,
    pub columns: Option<u32>,
    pub disabled: bool,
    pub children: Vec<ViewNode>,
}

/// Child records of one detail tab.
#[derive(Debug, Clone, PartialEq)]
pub struct GridView {
    pub key: String,
    pub title: Option<String>,
    /// `(field name, translated header)` pairs.
    pub columns: Vec<(String, String)>,
    pub rows: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewNode {
    Leaf(LeafView),
    Action(ActionView),
    Alert(AlertView),
    Container(ContainerView),
    Grid(GridView),
    Text(String),
    Line,
    Empty,
}

impl ViewNode {
    pub fn children(&self) -> &[ViewNode] {
        match self {
            ViewNode::Container(container) => &container.children,
            _ => &[],
        }
    }

    /// Depth-first search for a leaf.
    pub fn find_leaf(&self, name: &str) -> Option<&LeafView> {
        match self {
            ViewNode::Leaf(leaf) if leaf.name == name => Some(leaf),
            _ => self.children().iter().find_map(|child| child.find_leaf(name)),
        }
    }

    pub fn find_action(&self, action: &str) -> Option<&ActionView> {
        match self {
            ViewNode::Action(view) if view.action == action => Some(view),
            _ => self
                .children()
                .iter()
                .find_map(|child| child.find_action(action)),
        }
    }
}

/// Callbacks handed to the editor of one leaf.
#[derive(Clone)]
pub struct LeafHandle {
    pub on_change: Callback<Value>,
    pub on_blur: Callback<()>,
}

impl LeafHandle {
    pub fn change(&self, value: Value) {
        (self.on_change)(value);
    }

    pub fn blur(&self) {
        (self.on_blur)(());
    }
}

/// The host side of `FormRenderer::mount`. Containers are announced before
/// their children; the default implementations ignore what a host does not
/// draw.
pub trait Editor {
    fn leaf(&mut self, view: &LeafView, handle: LeafHandle);

    fn action(&mut self, view: &ActionView, on_activate: Callback<Option<Value>>);

    fn alert(&mut self, _view: &AlertView, _on_dismiss: Callback<()>) {}

    fn container(&mut self, _view: &ContainerView) {}

    fn grid(&mut self, _view: &GridView) {}
}
