use serde_json::Value;

use super::expr::{Expr, Layered};
use crate::domain::{Condition, ConditionFn, Node, Record};

/// Resolved visibility and editability of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeState {
    pub visible: bool,
    pub disabled: bool,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            visible: true,
            disabled: false,
        }
    }
}

#[derive(Clone)]
enum Compiled {
    Unset,
    Literal(bool),
    Expression(Expr),
    Function(ConditionFn),
}

impl std::fmt::Debug for Compiled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compiled::Unset => f.write_str("Unset"),
            Compiled::Literal(value) => write!(f, "Literal({value})"),
            Compiled::Expression(expr) => write!(f, "Expression({:?})", expr.source()),
            Compiled::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl Compiled {
    fn compile(condition: Option<&Condition>, what: &str) -> Self {
        match condition {
            None => Compiled::Unset,
            Some(Condition::Literal(value)) => Compiled::Literal(*value),
            Some(Condition::Function(f)) => Compiled::Function(f.clone()),
            Some(Condition::Expression(source)) => match Expr::parse(source) {
                Ok(expr) => Compiled::Expression(expr),
                Err(err) => {
                    log::debug!("{what} condition '{source}' does not compile: {err}");
                    Compiled::Unset
                }
            },
        }
    }

    fn evaluate(&self, deps: &Record, context: &Record, fallback: bool) -> bool {
        match self {
            Compiled::Unset => fallback,
            Compiled::Literal(value) => *value,
            Compiled::Function(f) => f(deps),
            Compiled::Expression(expr) => {
                let scope = Layered {
                    first: deps,
                    second: context,
                };
                expr.test(&scope).unwrap_or_else(|err| {
                    log::debug!("condition '{}' fell back: {err}", expr.source());
                    fallback
                })
            }
        }
    }
}

/// The `visible`/`disabled` conditions of a node, compiled once.
///
/// Evaluation is pure: the same inputs always yield the same state and
/// neither input is touched.
#[derive(Debug, Clone)]
pub struct CompiledConditions {
    deps: Vec<String>,
    visible: Compiled,
    disabled: Compiled,
}

impl Default for CompiledConditions {
    fn default() -> Self {
        Self {
            deps: Vec::new(),
            visible: Compiled::Unset,
            disabled: Compiled::Unset,
        }
    }
}

impl CompiledConditions {
    pub fn compile(node: &Node) -> Self {
        let common = node.common();
        Self {
            deps: common.deps.clone(),
            visible: Compiled::compile(common.conditions.visible.as_ref(), "visible"),
            disabled: Compiled::compile(common.conditions.disabled.as_ref(), "disabled"),
        }
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn evaluate(&self, deps: &Record, context: &Record) -> NodeState {
        let defaults = NodeState::default();
        NodeState {
            visible: self.visible.evaluate(deps, context, defaults.visible),
            disabled: self.disabled.evaluate(deps, context, defaults.disabled),
        }
    }

    /// Projects the declared dependencies out of the form values.
    /// A dependency without a value is passed as `null`.
    pub fn dep_values(&self, values: &Record) -> Record {
        self.deps
            .iter()
            .map(|dep| (dep.clone(), values.get(dep).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    /// `evaluate` against the current form values.
    pub fn state_for(&self, values: &Record, context: &Record) -> NodeState {
        self.evaluate(&self.dep_values(values), context)
    }
}
