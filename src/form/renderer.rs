use std::{collections::BTreeSet, sync::Arc};

use indexmap::IndexMap;
use serde_json::Value;

use super::{
    actions::{Dispatch, EventQueue, FormEvent, Reaction},
    condition::{CompiledConditions, NodeState},
    state::{FormState, Phase},
    view::{
        ActionView, AlertView, Callback, ContainerView, Editor, GridView, LeafHandle, LeafView,
        ViewNode,
    },
};
use crate::{
    domain::{FieldType, LayoutMode, Node, Record, SUBMIT_ACTION, SelectNode},
    i18n::{self, Translator},
    schema::{FormValidator, synthesize_defaults, synthesize_validator},
};

/// Conditions of a node and of its form children, in `form_children` order.
#[derive(Debug, Clone)]
struct CompiledNode {
    conditions: CompiledConditions,
    children: Vec<CompiledNode>,
}

impl CompiledNode {
    fn compile(node: &Node) -> Self {
        Self {
            conditions: CompiledConditions::compile(node),
            children: node
                .form_children()
                .into_iter()
                .map(CompiledNode::compile)
                .collect(),
        }
    }
}

/// Drives one schema instance: renders views, owns the value map and runs
/// the submit lifecycle.
pub struct FormRenderer {
    schema: Node,
    compiled: CompiledNode,
    validator: FormValidator,
    translator: Arc<dyn Translator>,
    state: FormState,
    context: Record,
    options: IndexMap<String, Vec<Value>>,
    details: IndexMap<String, Vec<Record>>,
    events: EventQueue,
}

impl std::fmt::Debug for FormRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormRenderer")
            .field("state", &self.state)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

struct Inherited {
    disabled: bool,
}

impl FormRenderer {
    /// `values` are laid over the synthesized defaults, so every declared
    /// field has an entry.
    pub fn new(
        schema: Node,
        translator: Arc<dyn Translator>,
        values: Record,
        context: Record,
    ) -> Self {
        let validator = synthesize_validator(&schema, translator.as_ref());
        let compiled = CompiledNode::compile(&schema);
        let mut initial = synthesize_defaults(&schema);
        initial.extend(values);
        Self {
            schema,
            compiled,
            validator,
            translator,
            state: FormState::new(initial),
            context,
            options: IndexMap::new(),
            details: IndexMap::new(),
            events: EventQueue::default(),
        }
    }

    pub fn schema(&self) -> &Node {
        &self.schema
    }

    pub fn validator(&self) -> &FormValidator {
        &self.validator
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn values(&self) -> &Record {
        self.state.values()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn context(&self) -> &Record {
        &self.context
    }

    pub fn set_context(&mut self, context: Record) {
        self.context = context;
    }

    pub fn set_options(&mut self, source: impl Into<String>, rows: Vec<Value>) {
        self.options.insert(source.into(), rows);
    }

    pub fn set_all_options(&mut self, sources: IndexMap<String, Vec<Value>>) {
        self.options.extend(sources);
    }

    pub fn set_details(&mut self, key: impl Into<String>, rows: Vec<Record>) {
        self.details.insert(key.into(), rows);
    }

    pub fn details(&self) -> &IndexMap<String, Vec<Record>> {
        &self.details
    }

    /// Visibility and editability of the first node named `field`.
    pub fn node_state(&self, field: &str) -> Option<NodeState> {
        find_state(&self.schema, &self.compiled, field, self.state.values(), &self.context)
    }

    /// Data sources declared by groups that are currently visible. Sources
    /// inside a hidden subtree are not listed.
    pub fn active_sources(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        collect_active_sources(
            &self.schema,
            &self.compiled,
            self.state.values(),
            &self.context,
            &mut out,
        );
        out
    }

    pub fn render(&self) -> Vec<ViewNode> {
        let inherited = Inherited {
            disabled: self.state.phase() != Phase::Idle,
        };
        self.render_node(&self.schema, &self.compiled, &inherited)
            .into_iter()
            .collect()
    }

    fn render_node(
        &self,
        node: &Node,
        compiled: &CompiledNode,
        inherited: &Inherited,
    ) -> Option<ViewNode> {
        let own = compiled
            .conditions
            .state_for(self.state.values(), &self.context);
        if !own.visible {
            return None;
        }
        let disabled = own.disabled || inherited.disabled;
        let view = match node {
            Node::Field(field)
            | Node::Number(field)
            | Node::Color(field)
            | Node::Rating(field) => {
                let field_type = match node {
                    Node::Field(_) => Some(field.field_type.clone()),
                    _ => None,
                };
                ViewNode::Leaf(self.leaf(
                    node,
                    &field.name,
                    field.label.as_deref(),
                    field_type,
                    Vec::new(),
                    disabled,
                    field.common.span,
                ))
            }
            Node::Select(select) | Node::Multiselect(select) => {
                ViewNode::Leaf(self.leaf(
                    node,
                    &select.name,
                    select.label.as_deref(),
                    None,
                    self.options_for(select),
                    disabled,
                    select.common.span,
                ))
            }
            Node::Button(button) => ViewNode::Action(ActionView {
                action: button.action.clone(),
                label: i18n::text(self.translator.as_ref(), &button.label),
                disabled,
            }),
            Node::Text(text) => ViewNode::Text(i18n::text(self.translator.as_ref(), &text.text)),
            Node::Alert(alert) => ViewNode::Alert(AlertView {
                message: i18n::text(self.translator.as_ref(), &alert.message),
                severity: alert.severity,
                action: alert.action.clone(),
            }),
            Node::Group(group) => ViewNode::Container(ContainerView {
                kind: "group",
                title: None,
                layout: group.layout,
                columns: group.columns,
                disabled,
                children: self.render_children(&group.children, &compiled.children, disabled),
            }),
            Node::Fieldset(fieldset) => ViewNode::Container(ContainerView {
                kind: "fieldset",
                title: fieldset
                    .title
                    .as_deref()
                    .map(|title| i18n::text(self.translator.as_ref(), title)),
                layout: fieldset.group.layout,
                columns: fieldset.group.columns,
                disabled,
                children: self.render_children(
                    &fieldset.group.children,
                    &compiled.children,
                    disabled,
                ),
            }),
            Node::Tabs(tabs) => {
                let mut offset = 0;
                let mut panes = Vec::with_capacity(tabs.tabs.len());
                for pane in &tabs.tabs {
                    let title = pane
                        .label
                        .as_deref()
                        .map(|label| i18n::text(self.translator.as_ref(), label));
                    if pane.detail {
                        panes.push(ViewNode::Grid(GridView {
                            key: pane.key.clone(),
                            title,
                            columns: pane
                                .children
                                .iter()
                                .filter_map(|column| {
                                    let name = column.name()?;
                                    let header = column.label().unwrap_or(name);
                                    Some((
                                        name.to_string(),
                                        i18n::text(self.translator.as_ref(), header),
                                    ))
                                })
                                .collect(),
                            rows: self.details.get(&pane.key).cloned().unwrap_or_default(),
                        }));
                        continue;
                    }
                    let end = offset + pane.children.len();
                    let slice = compiled.children.get(offset..end).unwrap_or(&[]);
                    offset = end;
                    panes.push(ViewNode::Container(ContainerView {
                        kind: "tab",
                        title,
                        layout: LayoutMode::Grid,
                        columns: None,
                        disabled,
                        children: self.render_children(&pane.children, slice, disabled),
                    }));
                }
                ViewNode::Container(ContainerView {
                    kind: "tabs",
                    title: None,
                    layout: LayoutMode::Grid,
                    columns: None,
                    disabled,
                    children: panes,
                })
            }
            Node::Line(_) => ViewNode::Line,
            Node::Empty(_) => ViewNode::Empty,
        };
        Some(view)
    }

    fn render_children(
        &self,
        children: &[Node],
        compiled: &[CompiledNode],
        disabled: bool,
    ) -> Vec<ViewNode> {
        let inherited = Inherited { disabled };
        children
            .iter()
            .zip(compiled)
            .filter_map(|(child, compiled)| self.render_node(child, compiled, &inherited))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn leaf(
        &self,
        node: &Node,
        name: &str,
        label: Option<&str>,
        field_type: Option<FieldType>,
        options: Vec<Value>,
        disabled: bool,
        span: Option<u32>,
    ) -> LeafView {
        LeafView {
            name: name.to_string(),
            kind: node.kind(),
            field_type,
            label: i18n::text(self.translator.as_ref(), label.unwrap_or(name)),
            value: self.state.value(name).cloned().unwrap_or(Value::Null),
            disabled,
            required: self
                .validator
                .field(name)
                .is_some_and(|field| field.is_required()),
            options,
            error: self.state.error(name).map(str::to_string),
            span,
        }
    }

    fn options_for(&self, select: &SelectNode) -> Vec<Value> {
        match &select.key_source {
            Some(source) => self.options.get(source).cloned().unwrap_or_default(),
            None => select.options.clone().unwrap_or_default(),
        }
    }

    /// Renders and hands every visible leaf and action to `editor`. The
    /// handles only enqueue events; nothing changes until [`Self::pump`].
    pub fn mount(&self, editor: &mut dyn Editor) {
        for view in self.render() {
            self.mount_view(&view, editor);
        }
    }

    fn mount_view(&self, view: &ViewNode, editor: &mut dyn Editor) {
        match view {
            ViewNode::Leaf(leaf) => {
                let changes = self.events.clone();
                let blurs = self.events.clone();
                let field = leaf.name.clone();
                let blurred = leaf.name.clone();
                let handle = LeafHandle {
                    on_change: Arc::new(move |value| {
                        changes.push(FormEvent::Changed {
                            field: field.clone(),
                            value,
                        })
                    }),
                    on_blur: Arc::new(move |()| {
                        blurs.push(FormEvent::Blurred {
                            field: blurred.clone(),
                        })
                    }),
                };
                editor.leaf(leaf, handle);
            }
            ViewNode::Action(action) => {
                editor.action(action, self.activator(action.action.clone()));
            }
            ViewNode::Alert(alert) => {
                let activate = self.activator(alert.action.clone());
                let on_dismiss: Callback<()> = Arc::new(move |()| activate(None));
                editor.alert(alert, on_dismiss);
            }
            ViewNode::Container(container) => {
                editor.container(container);
                for child in &container.children {
                    self.mount_view(child, editor);
                }
            }
            ViewNode::Grid(grid) => editor.grid(grid),
            ViewNode::Text(_) | ViewNode::Line | ViewNode::Empty => {}
        }
    }

    fn activator(&self, action: String) -> Callback<Option<Value>> {
        let events = self.events.clone();
        Arc::new(move |payload| {
            events.push(FormEvent::Activated {
                action: action.clone(),
                payload,
            })
        })
    }

    pub fn enqueue(&self, event: FormEvent) {
        self.events.push(event);
    }

    pub fn has_pending(&self) -> bool {
        !self.events.is_empty()
    }

    /// Drains queued events in arrival order.
    pub fn pump(&mut self) -> Vec<Reaction> {
        self.events
            .drain()
            .into_iter()
            .flat_map(|event| self.handle(event))
            .collect()
    }

    pub fn handle(&mut self, event: FormEvent) -> Vec<Reaction> {
        match event {
            FormEvent::Changed { field, value } => self.change(field, value),
            FormEvent::Blurred { field } => {
                self.state.touch(&field);
                vec![self.revalidate(field)]
            }
            FormEvent::Activated { action, payload } => {
                self.activate(action, payload).into_iter().collect()
            }
        }
    }

    fn change(&mut self, field: String, value: Value) -> Vec<Reaction> {
        if self.state.phase() != Phase::Idle {
            log::debug!("ignoring change of '{field}' while {:?}", self.state.phase());
            return Vec::new();
        }
        if !self.state.set_value(&field, value.clone()) {
            return Vec::new();
        }
        let mut reactions = vec![Reaction::ValueChanged {
            field: field.clone(),
            value,
        }];
        if self.state.is_touched(&field) || self.state.error(&field).is_some() {
            reactions.push(self.revalidate(field));
        }
        reactions
    }

    fn revalidate(&mut self, field: String) -> Reaction {
        let error = self.validator.validate_field(&field, self.state.values());
        self.state.set_error(&field, error.clone());
        Reaction::FieldValidated { field, error }
    }

    fn activate(&mut self, action: String, payload: Option<Value>) -> Option<Reaction> {
        if self.state.phase() != Phase::Idle {
            log::debug!("ignoring '{action}' while {:?}", self.state.phase());
            return None;
        }
        if action != SUBMIT_ACTION {
            return Some(Reaction::Dispatch(Dispatch {
                action,
                payload: payload.unwrap_or(Value::Null),
            }));
        }
        self.submit()
    }

    /// `Idle -> Validating -> Submitting`, or back to `Idle` with errors.
    pub fn submit(&mut self) -> Option<Reaction> {
        if !self.state.begin_validation() {
            return None;
        }
        match self.validator.validate(self.state.values()) {
            Err(errors) => {
                log::debug!("submit refused: {errors}");
                self.state.validation_failed(errors.clone());
                Some(Reaction::Invalid(errors))
            }
            Ok(()) => {
                self.state.validation_passed();
                Some(Reaction::Dispatch(Dispatch {
                    action: SUBMIT_ACTION.to_string(),
                    payload: Value::Object(self.state.values().clone()),
                }))
            }
        }
    }

    /// `Submitting -> Closed` on success, `Submitting -> Idle` with the
    /// message on failure.
    pub fn finish_submit(&mut self, outcome: Result<(), String>) -> bool {
        self.state.finish_submit(outcome)
    }
}

fn find_state(
    node: &Node,
    compiled: &CompiledNode,
    field: &str,
    values: &Record,
    context: &Record,
) -> Option<NodeState> {
    if node.name() == Some(field) {
        return Some(compiled.conditions.state_for(values, context));
    }
    node.form_children()
        .into_iter()
        .zip(&compiled.children)
        .find_map(|(child, compiled)| find_state(child, compiled, field, values, context))
}

fn collect_active_sources(
    node: &Node,
    compiled: &CompiledNode,
    values: &Record,
    context: &Record,
    out: &mut BTreeSet<String>,
) {
    if !compiled.conditions.state_for(values, context).visible {
        return;
    }
    let declared = match node {
        Node::Group(group) => Some(&group.data_source),
        Node::Fieldset(fieldset) => Some(&fieldset.group.data_source),
        _ => None,
    };
    if let Some(sources) = declared {
        out.extend(sources.keys().cloned());
    }
    for (child, compiled) in node.form_children().into_iter().zip(&compiled.children) {
        collect_active_sources(child, compiled, values, context, out);
    }
}
