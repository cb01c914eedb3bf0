//! Synthesis of validators and default values from a schema tree.

mod defaults;
mod validation;

pub use defaults::{default_for, synthesize_defaults};
pub use validation::{FieldValidator, FormValidator, RuleKind, synthesize_validator};

use crate::domain::Node;

/// Visits every node that contributes to the form value map, depth first,
/// in declaration order. Containers are visited before their children.
pub fn visit<'a>(node: &'a Node, visitor: &mut dyn FnMut(&'a Node)) {
    visitor(node);
    for child in node.form_children() {
        visit(child, visitor);
    }
}

/// Like [`visit`], restricted to named leaves.
pub fn visit_leaves<'a>(node: &'a Node, visitor: &mut dyn FnMut(&'a Node)) {
    visit(node, &mut |candidate| {
        if candidate.name().is_some() {
            visitor(candidate);
        }
    });
}

/// Named leaves in declaration order.
pub fn leaf_names(node: &Node) -> Vec<String> {
    let mut names = Vec::new();
    visit_leaves(node, &mut |leaf| {
        if let Some(name) = leaf.name() {
            if !names.iter().any(|known| known == name) {
                names.push(name.to_string());
            }
        }
    });
    names
}

/// Nodes whose `deps` list names `field`.
pub fn dependents<'a>(node: &'a Node, field: &str) -> Vec<&'a Node> {
    let mut out = Vec::new();
    visit(node, &mut |candidate| {
        if candidate.common().deps.iter().any(|dep| dep == field) {
            out.push(candidate);
        }
    });
    out
}
