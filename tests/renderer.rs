mod common;

use std::sync::Arc;

use metawindow::{
    domain::{Node, parse_node},
    form::{
        ActionView, Callback, Editor, FormEvent, FormRenderer, LeafHandle, LeafView, Phase,
        Reaction, ViewNode,
    },
    i18n::{MapTranslator, NoTranslation},
};
use serde_json::{Value, json};

use common::record;

fn signup_form() -> Node {
    parse_node(&json!({
        "type": "group",
        "columns": 2,
        "children": [
            {"type": "field", "name": "name", "label": "Name", "rules": {"required": true}},
            {"type": "field", "name": "company", "label": "Company",
             "deps": ["kind"], "conditions": {"visible": "kind == 'business'"}},
            {"type": "select", "name": "kind", "label": "Kind", "keySource": "kinds",
             "options": [{"value": "private"}]},
            {"type": "button", "action": "submit", "label": "common.save"},
            {"type": "button", "action": "export", "label": "Export"}
        ]
    }))
    .unwrap()
}

#[derive(Default)]
struct Recorder {
    leaves: Vec<(LeafView, LeafHandle)>,
    actions: Vec<(ActionView, Callback<Option<Value>>)>,
}

impl Recorder {
    fn handle(&self, name: &str) -> &LeafHandle {
        &self
            .leaves
            .iter()
            .find(|(view, _)| view.name == name)
            .expect("leaf mounted")
            .1
    }

    fn activate(&self, action: &str, payload: Option<Value>) {
        let (_, on_activate) = self
            .actions
            .iter()
            .find(|(view, _)| view.action == action)
            .expect("action mounted");
        on_activate(payload);
    }
}

impl Editor for Recorder {
    fn leaf(&mut self, view: &LeafView, handle: LeafHandle) {
        self.leaves.push((view.clone(), handle));
    }

    fn action(&mut self, view: &ActionView, on_activate: Callback<Option<Value>>) {
        self.actions.push((view.clone(), on_activate));
    }
}

fn renderer(values: Value) -> FormRenderer {
    FormRenderer::new(
        signup_form(),
        Arc::new(NoTranslation),
        record(values),
        Default::default(),
    )
}

#[test]
fn hidden_nodes_are_not_rendered_or_mounted() {
    let renderer = renderer(json!({"kind": "private"}));
    let views = renderer.render();
    let root = &views[0];
    assert!(root.find_leaf("name").is_some());
    assert!(root.find_leaf("company").is_none());

    let mut recorder = Recorder::default();
    renderer.mount(&mut recorder);
    let names: Vec<&str> = recorder.leaves.iter().map(|(view, _)| view.name.as_str()).collect();
    assert_eq!(names, vec!["name", "kind"]);
}

#[test]
fn conditions_follow_dependency_values() {
    let mut renderer = renderer(json!({"kind": "private"}));
    renderer.handle(FormEvent::Changed {
        field: "kind".into(),
        value: json!("business"),
    });
    let views = renderer.render();
    assert!(views[0].find_leaf("company").is_some());
    assert!(renderer.node_state("company").unwrap().visible);
}

#[test]
fn inline_options_fill_selects_until_a_source_resolves() {
    let mut renderer = renderer(json!({}));
    let views = renderer.render();
    assert_eq!(views[0].find_leaf("kind").unwrap().options, vec![json!({"value": "private"})]);

    renderer.set_options("kinds", vec![json!({"value": "business"})]);
    let views = renderer.render();
    assert_eq!(views[0].find_leaf("kind").unwrap().options, vec![json!({"value": "business"})]);
}

#[test]
fn handles_queue_events_until_pumped() {
    let mut renderer = renderer(json!({}));
    let mut recorder = Recorder::default();
    renderer.mount(&mut recorder);

    recorder.handle("name").change(json!("Ada"));
    assert_eq!(renderer.values()["name"], json!(""));
    assert!(renderer.has_pending());

    let reactions = renderer.pump();
    assert_eq!(
        reactions,
        vec![Reaction::ValueChanged {
            field: "name".into(),
            value: json!("Ada"),
        }]
    );
    assert_eq!(renderer.values()["name"], json!("Ada"));
}

#[test]
fn blur_reports_field_errors() {
    let mut renderer = renderer(json!({}));
    let mut recorder = Recorder::default();
    renderer.mount(&mut recorder);

    recorder.handle("name").blur();
    let reactions = renderer.pump();
    match &reactions[..] {
        [Reaction::FieldValidated { field, error: Some(message) }] => {
            assert_eq!(field, "name");
            assert_eq!(message, "Name is required");
        }
        other => panic!("unexpected reactions {other:?}"),
    }

    // touched fields revalidate on change
    recorder.handle("name").change(json!("Ada"));
    let reactions = renderer.pump();
    assert!(reactions.contains(&Reaction::FieldValidated {
        field: "name".into(),
        error: None,
    }));
}

#[test]
fn every_activation_becomes_one_dispatch() {
    let mut renderer = renderer(json!({"name": "Ada"}));
    let mut recorder = Recorder::default();
    renderer.mount(&mut recorder);

    recorder.activate("export", None);
    recorder.activate("submit", None);
    let reactions = renderer.pump();
    let dispatched: Vec<&str> = reactions
        .iter()
        .filter_map(Reaction::as_dispatch)
        .map(|dispatch| dispatch.action.as_str())
        .collect();
    assert_eq!(dispatched, vec!["export", "submit"]);
    assert_eq!(renderer.phase(), Phase::Submitting);
}

#[test]
fn actions_are_disabled_while_submitting() {
    let mut renderer = renderer(json!({"name": "Ada"}));
    assert!(matches!(renderer.submit(), Some(Reaction::Dispatch(_))));

    let views = renderer.render();
    assert!(views[0].find_action("submit").unwrap().disabled);
    assert!(views[0].find_leaf("name").unwrap().disabled);
    assert!(renderer.handle(FormEvent::Changed {
        field: "name".into(),
        value: json!("Bob"),
    })
    .is_empty());

    assert!(renderer.finish_submit(Err("duplicate".into())));
    assert_eq!(renderer.phase(), Phase::Idle);
    assert_eq!(renderer.state().submit_error(), Some("duplicate"));
    let views = renderer.render();
    assert!(!views[0].find_action("submit").unwrap().disabled);
}

#[test]
fn failed_submit_touches_every_field() {
    let mut renderer = renderer(json!({}));
    match renderer.submit() {
        Some(Reaction::Invalid(errors)) => assert_eq!(errors.len(), 1),
        other => panic!("expected invalid submit, got {other:?}"),
    }
    assert_eq!(renderer.phase(), Phase::Idle);
    assert!(renderer.state().is_touched("name"));
    let views = renderer.render();
    assert_eq!(
        views[0].find_leaf("name").unwrap().error.as_deref(),
        Some("Name is required")
    );
}

#[test]
fn labels_are_translated() {
    let translator = MapTranslator::new()
        .with("Name", "Nom")
        .with("common.save", "Enregistrer");
    let renderer = FormRenderer::new(
        signup_form(),
        Arc::new(translator),
        record(json!({})),
        Default::default(),
    );
    let views = renderer.render();
    assert_eq!(views[0].find_leaf("name").unwrap().label, "Nom");
    assert_eq!(views[0].find_action("submit").unwrap().label, "Enregistrer");
    assert!(matches!(views[0], ViewNode::Container(_)));
}
