use serde_json::Value;

use super::visit_leaves;
use crate::domain::{FieldType, Node, Record};

/// Initial value of one leaf; `None` for nodes without a value slot.
pub fn default_for(node: &Node) -> Option<Value> {
    let value = match node {
        Node::Field(field) => match field.field_type {
            FieldType::Input | FieldType::Textarea | FieldType::Password | FieldType::Radio => {
                Value::String(String::new())
            }
            FieldType::Checkbox => Value::Bool(false),
            FieldType::Date | FieldType::Other(_) => Value::Null,
        },
        Node::Select(_)
        | Node::Multiselect(_)
        | Node::Number(_)
        | Node::Color(_)
        | Node::Rating(_) => Value::Null,
        Node::Button(_)
        | Node::Text(_)
        | Node::Alert(_)
        | Node::Group(_)
        | Node::Fieldset(_)
        | Node::Tabs(_)
        | Node::Line(_)
        | Node::Empty(_) => return None,
    };
    Some(value)
}

/// The value map of a pristine form: one entry per leaf field name.
/// A name declared twice keeps its first default.
pub fn synthesize_defaults(node: &Node) -> Record {
    let mut values = Record::new();
    visit_leaves(node, &mut |leaf| {
        if let (Some(name), Some(value)) = (leaf.name(), default_for(leaf)) {
            values.entry(name.to_string()).or_insert(value);
        }
    });
    values
}
