use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use jsonschema::{Validator, validator_for};
use schemars::schema::{
    InstanceType, Metadata, ObjectValidation, RootSchema, Schema, SchemaObject, SingleOrVec,
    StringValidation, SubschemaValidation,
};
use serde_json::{Value, json};

use super::visit_leaves;
use crate::{
    domain::{FieldNode, FieldType, Node, Record, Rules, SelectNode},
    error::FieldErrors,
    i18n::{self, Translator},
};

const JSON_SCHEMA_DRAFT: &str = "http://json-schema.org/draft-07/schema#";
const EMAIL_PATTERN: &str = r"^$|^[^\s@]+@[^\s@]+\.[^\s@]+$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Type,
    Required,
    Email,
    Min,
    Max,
}

#[derive(Clone)]
struct RuleCheck {
    kind: RuleKind,
    schema: SchemaObject,
    validator: Arc<Validator>,
    message: String,
}

impl fmt::Debug for RuleCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleCheck")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

/// Checks of one field, applied in declaration order.
#[derive(Debug, Clone)]
pub struct FieldValidator {
    label: String,
    empty_as_null: bool,
    /// Message for an absent value when the field is required.
    missing: Option<String>,
    checks: Vec<RuleCheck>,
}

impl FieldValidator {
    fn passthrough(label: String) -> Self {
        Self {
            label,
            empty_as_null: false,
            missing: None,
            checks: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_required(&self) -> bool {
        self.missing.is_some()
    }

    /// First failing rule's message.
    pub fn check(&self, value: Option<&Value>) -> Option<String> {
        let Some(value) = value else {
            return self.missing.clone();
        };
        let normalized;
        let value = if self.empty_as_null && value.as_str() == Some("") {
            normalized = Value::Null;
            &normalized
        } else {
            value
        };
        self.checks
            .iter()
            .find(|check| !check.validator.is_valid(value))
            .map(|check| check.message.clone())
    }

    fn export(&self) -> Schema {
        let mut schema = SchemaObject {
            metadata: Some(Box::new(Metadata {
                title: Some(self.label.clone()),
                ..Metadata::default()
            })),
            ..SchemaObject::default()
        };
        if !self.checks.is_empty() {
            schema.subschemas = Some(Box::new(SubschemaValidation {
                all_of: Some(
                    self.checks
                        .iter()
                        .map(|check| Schema::Object(check.schema.clone()))
                        .collect(),
                ),
                ..SubschemaValidation::default()
            }));
        }
        Schema::Object(schema)
    }
}

/// Structural validator keyed by every leaf field name of a schema.
#[derive(Debug, Clone, Default)]
pub struct FormValidator {
    fields: IndexMap<String, FieldValidator>,
}

impl FormValidator {
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&FieldValidator> {
        self.fields.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn validate(&self, values: &Record) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        for (name, field) in &self.fields {
            if let Some(message) = field.check(values.get(name)) {
                errors.push(name.clone(), message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Message for one field; `None` when it passes or is unknown.
    pub fn validate_field(&self, name: &str, values: &Record) -> Option<String> {
        self.fields
            .get(name)
            .and_then(|field| field.check(values.get(name)))
    }

    /// The whole form as one JSON Schema document.
    pub fn to_json_schema(&self) -> Value {
        let mut object = ObjectValidation::default();
        for (name, field) in &self.fields {
            object.properties.insert(name.clone(), field.export());
            if field.is_required() {
                object.required.insert(name.clone());
            }
        }
        let root = RootSchema {
            meta_schema: Some(JSON_SCHEMA_DRAFT.to_string()),
            schema: SchemaObject {
                instance_type: Some(InstanceType::Object.into()),
                object: Some(Box::new(object)),
                ..SchemaObject::default()
            },
            definitions: Default::default(),
        };
        serde_json::to_value(&root).unwrap_or_else(|err| {
            log::warn!("failed to serialize synthesized schema: {err}");
            json!({})
        })
    }
}

/// Fold a schema tree into its validator. Never fails: unknown field types
/// accept anything and rules that cannot be compiled are dropped.
pub fn synthesize_validator(node: &Node, translator: &dyn Translator) -> FormValidator {
    let mut fields = IndexMap::new();
    visit_leaves(node, &mut |leaf| {
        if let Some((name, field)) = field_validator(leaf, translator) {
            fields.entry(name).or_insert(field);
        }
    });
    FormValidator { fields }
}

fn field_validator(node: &Node, translator: &dyn Translator) -> Option<(String, FieldValidator)> {
    let built = match node {
        Node::Field(field) => {
            let builder = RuleBuilder::new(translator, field_label(field), &field.rules);
            match &field.field_type {
                FieldType::Input | FieldType::Textarea => builder.text(true),
                FieldType::Password => builder.text(false),
                FieldType::Date => builder.date(),
                FieldType::Checkbox => builder.checkbox(),
                FieldType::Radio => builder.radio(),
                FieldType::Other(_) => builder.passthrough(),
            }
        }
        Node::Select(select) => {
            RuleBuilder::new(translator, select_label(select), &select.rules).select()
        }
        Node::Multiselect(select) => {
            RuleBuilder::new(translator, select_label(select), &select.rules).passthrough()
        }
        Node::Number(field) | Node::Color(field) | Node::Rating(field) => {
            RuleBuilder::new(translator, field_label(field), &field.rules).passthrough()
        }
        Node::Button(_)
        | Node::Text(_)
        | Node::Alert(_)
        | Node::Group(_)
        | Node::Fieldset(_)
        | Node::Tabs(_)
        | Node::Line(_)
        | Node::Empty(_) => return None,
    };
    node.name().map(|name| (name.to_string(), built))
}

fn field_label(field: &FieldNode) -> &str {
    field.label.as_deref().unwrap_or(&field.name)
}

fn select_label(select: &SelectNode) -> &str {
    select.label.as_deref().unwrap_or(&select.name)
}

struct RuleBuilder<'a> {
    translator: &'a dyn Translator,
    label: String,
    rules: &'a Rules,
    field: FieldValidator,
}

impl<'a> RuleBuilder<'a> {
    fn new(translator: &'a dyn Translator, label: &str, rules: &'a Rules) -> Self {
        let label = i18n::text(translator, label);
        Self {
            translator,
            field: FieldValidator::passthrough(label.clone()),
            label,
            rules,
        }
    }

    fn message(&self, key: &str, count: Option<u32>) -> String {
        let count = count.map(|c| c.to_string()).unwrap_or_default();
        i18n::message(
            self.translator,
            key,
            &[("label", self.label.as_str()), ("count", count.as_str())],
        )
    }

    fn push(&mut self, kind: RuleKind, schema: SchemaObject) {
        let key = match kind {
            RuleKind::Type => "validation.type",
            RuleKind::Required => "validation.required",
            RuleKind::Email => "validation.email",
            RuleKind::Min => "validation.min",
            RuleKind::Max => "validation.max",
        };
        let count = match kind {
            RuleKind::Min => self.rules.min,
            RuleKind::Max => self.rules.max,
            _ => None,
        };
        let raw = match serde_json::to_value(&schema) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("dropping {kind:?} rule of '{}': {err}", self.label);
                return;
            }
        };
        match validator_for(&raw) {
            Ok(validator) => {
                let message = self.message(key, count);
                self.field.checks.push(RuleCheck {
                    kind,
                    schema,
                    validator: Arc::new(validator),
                    message,
                });
            }
            Err(err) => log::warn!("dropping {kind:?} rule of '{}': {err}", self.label),
        }
    }

    fn require_presence(&mut self) {
        self.field.missing = Some(self.message("validation.required", None));
    }

    fn passthrough(self) -> FieldValidator {
        self.field
    }

    /// Numbers are accepted as text: server rows often carry numeric codes.
    fn text(mut self, email: bool) -> FieldValidator {
        self.push(
            RuleKind::Type,
            typed(&[InstanceType::String, InstanceType::Number, InstanceType::Null]),
        );
        if self.rules.required {
            self.require_presence();
            let mut filled = typed(&[InstanceType::String]);
            filled.string = Some(Box::new(StringValidation {
                min_length: Some(1),
                ..StringValidation::default()
            }));
            self.push(
                RuleKind::Required,
                any_of(vec![typed(&[InstanceType::Number]), filled]),
            );
        }
        if email && self.rules.email {
            self.push(
                RuleKind::Email,
                string_rule(StringValidation {
                    pattern: Some(EMAIL_PATTERN.to_string()),
                    ..StringValidation::default()
                }),
            );
        }
        if let Some(min) = self.rules.min {
            let bounded = string_rule(StringValidation {
                min_length: Some(min),
                ..StringValidation::default()
            });
            self.push(RuleKind::Min, any_of(vec![constant(json!("")), bounded]));
        }
        if let Some(max) = self.rules.max {
            self.push(
                RuleKind::Max,
                string_rule(StringValidation {
                    max_length: Some(max),
                    ..StringValidation::default()
                }),
            );
        }
        self.field
    }

    fn date(mut self) -> FieldValidator {
        self.field.empty_as_null = true;
        self.push(
            RuleKind::Type,
            typed(&[InstanceType::String, InstanceType::Null]),
        );
        if self.rules.required {
            self.require_presence();
            self.push(RuleKind::Required, typed(&[InstanceType::String]));
        }
        self.field
    }

    fn checkbox(mut self) -> FieldValidator {
        self.push(
            RuleKind::Type,
            typed(&[InstanceType::Boolean, InstanceType::Null]),
        );
        if self.rules.required {
            self.require_presence();
            self.push(RuleKind::Required, constant(json!(true)));
        }
        self.field
    }

    fn radio(mut self) -> FieldValidator {
        if self.rules.required {
            self.require_presence();
            self.push(RuleKind::Required, not(constant(json!(""))));
        }
        self.field
    }

    fn select(mut self) -> FieldValidator {
        self.push(
            RuleKind::Type,
            typed(&[
                InstanceType::String,
                InstanceType::Number,
                InstanceType::Null,
            ]),
        );
        if self.rules.required {
            self.require_presence();
            self.push(
                RuleKind::Required,
                not(SchemaObject {
                    enum_values: Some(vec![json!(""), Value::Null]),
                    ..SchemaObject::default()
                }),
            );
        }
        self.field
    }
}

fn typed(types: &[InstanceType]) -> SchemaObject {
    let instance_type: SingleOrVec<InstanceType> = match types {
        [single] => (*single).into(),
        many => many.to_vec().into(),
    };
    SchemaObject {
        instance_type: Some(instance_type),
        ..SchemaObject::default()
    }
}

fn string_rule(string: StringValidation) -> SchemaObject {
    SchemaObject {
        string: Some(Box::new(string)),
        ..SchemaObject::default()
    }
}

fn constant(value: Value) -> SchemaObject {
    SchemaObject {
        const_value: Some(value),
        ..SchemaObject::default()
    }
}

fn not(inner: SchemaObject) -> SchemaObject {
    SchemaObject {
        subschemas: Some(Box::new(SubschemaValidation {
            not: Some(Box::new(Schema::Object(inner))),
            ..SubschemaValidation::default()
        })),
        ..SchemaObject::default()
    }
}

fn any_of(options: Vec<SchemaObject>) -> SchemaObject {
    SchemaObject {
        subschemas: Some(Box::new(SubschemaValidation {
            any_of: Some(options.into_iter().map(Schema::Object).collect()),
            ..SubschemaValidation::default()
        })),
        ..SchemaObject::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{GroupNode, NodeCommon},
        i18n::{MapTranslator, NoTranslation},
        schema::synthesize_defaults,
    };
    use serde_json::json;

    fn schema(raw: Value) -> Node {
        serde_json::from_value(raw).expect("valid schema")
    }

    fn record(raw: Value) -> Record {
        raw.as_object().cloned().unwrap()
    }

    fn every_type(required: bool) -> Node {
        let rules = json!({"required": required});
        schema(json!({
            "type": "group",
            "children": [
                {"type": "field", "name": "title", "fieldType": "input", "rules": rules},
                {"type": "field", "name": "notes", "fieldType": "textarea", "rules": rules},
                {"type": "field", "name": "secret", "fieldType": "password", "rules": rules},
                {"type": "field", "name": "due", "fieldType": "date", "rules": rules},
                {"type": "field", "name": "agree", "fieldType": "checkbox", "rules": rules},
                {"type": "field", "name": "size", "fieldType": "radio", "rules": rules},
                {"type": "field", "name": "odd", "fieldType": "slider", "rules": rules},
                {"type": "select", "name": "unit", "rules": rules},
                {"type": "multiselect", "name": "tags", "rules": rules},
                {"type": "number", "name": "qty", "rules": rules},
                {"type": "button", "action": "submit"}
            ]
        }))
    }

    #[test]
    fn required_email_rejects_empty_and_accepts_address() {
        let node = schema(json!({
            "type": "group",
            "children": [{"type": "field", "name": "email", "label": "Email",
                          "rules": {"required": true, "email": true}}]
        }));
        let validator = synthesize_validator(&node, &NoTranslation);
        let errors = validator
            .validate(&record(json!({"email": ""})))
            .expect_err("empty email must fail");
        assert!(!errors.get("email").unwrap().is_empty());
        assert!(validator.validate(&record(json!({"email": "a@b.com"}))).is_ok());
        assert!(validator.validate(&record(json!({"email": "nope"}))).is_err());
    }

    #[test]
    fn defaults_pass_unless_required() {
        let optional = every_type(false);
        let validator = synthesize_validator(&optional, &NoTranslation);
        assert!(validator.validate(&synthesize_defaults(&optional)).is_ok());

        let required = every_type(true);
        let validator = synthesize_validator(&required, &NoTranslation);
        let errors = validator
            .validate(&synthesize_defaults(&required))
            .unwrap_err();
        let failing: Vec<_> = errors.iter().map(|(name, _)| name).collect();
        assert_eq!(
            failing,
            vec!["title", "notes", "secret", "due", "agree", "size", "unit"]
        );
    }

    #[test]
    fn keys_every_leaf_field() {
        let validator = synthesize_validator(&every_type(false), &NoTranslation);
        assert_eq!(validator.field_names().count(), 10);
    }

    #[test]
    fn date_normalizes_empty_string_to_null() {
        let node = schema(json!({"type": "field", "name": "due", "fieldType": "date",
                                 "rules": {"required": true}}));
        let validator = synthesize_validator(&node, &NoTranslation);
        assert!(validator.validate_field("due", &record(json!({"due": ""}))).is_some());
        assert!(validator.validate_field("due", &record(json!({"due": "2024-01-31"}))).is_none());
    }

    #[test]
    fn text_accepts_numeric_codes() {
        let node = schema(json!({"type": "field", "name": "id", "rules": {"required": true}}));
        let validator = synthesize_validator(&node, &NoTranslation);
        assert!(validator.validate_field("id", &record(json!({"id": 17}))).is_none());
        assert!(validator.validate_field("id", &record(json!({"id": true}))).is_some());
    }

    #[test]
    fn select_requires_a_real_choice() {
        let node = schema(json!({"type": "select", "name": "unit", "rules": {"required": true}}));
        let validator = synthesize_validator(&node, &NoTranslation);
        assert!(validator.validate_field("unit", &record(json!({"unit": null}))).is_some());
        assert!(validator.validate_field("unit", &record(json!({"unit": ""}))).is_some());
        assert!(validator.validate_field("unit", &record(json!({"unit": 0}))).is_none());
        assert!(validator.validate_field("unit", &record(json!({"unit": "x"}))).is_none());
        assert!(validator.validate_field("unit", &record(json!({"unit": [1]}))).is_some());
    }

    #[test]
    fn radio_rejects_missing_and_empty_only() {
        let node = schema(json!({"type": "field", "name": "size", "fieldType": "radio",
                                 "rules": {"required": true}}));
        let validator = synthesize_validator(&node, &NoTranslation);
        assert!(validator.validate_field("size", &record(json!({}))).is_some());
        assert!(validator.validate_field("size", &record(json!({"size": ""}))).is_some());
        assert!(validator.validate_field("size", &record(json!({"size": "L"}))).is_none());
    }

    #[test]
    fn length_bounds_apply_to_non_empty_strings() {
        let node = schema(json!({"type": "field", "name": "code", "fieldType": "password",
                                 "rules": {"min": 3, "max": 5}}));
        let validator = synthesize_validator(&node, &NoTranslation);
        assert!(validator.validate_field("code", &record(json!({"code": ""}))).is_none());
        assert!(validator.validate_field("code", &record(json!({"code": "ab"}))).is_some());
        assert!(validator.validate_field("code", &record(json!({"code": "abcd"}))).is_none());
        let message = validator
            .validate_field("code", &record(json!({"code": "abcdef"})))
            .unwrap();
        assert_eq!(message, "code must be at most 5 characters");
    }

    #[test]
    fn messages_are_localized() {
        let translator = MapTranslator::new()
            .with("user.email", "E-Mail")
            .with("validation.required", "{label} fehlt");
        let field = FieldNode::new("email", FieldType::Input)
            .with_label("user.email")
            .with_rules(Rules {
                required: true,
                ..Rules::default()
            });
        let node = Node::Group(GroupNode::new(vec![Node::Field(field)]));
        let validator = synthesize_validator(&node, &translator);
        assert_eq!(
            validator.validate_field("email", &record(json!({"email": ""}))),
            Some("E-Mail fehlt".to_string())
        );
    }

    #[test]
    fn exports_one_json_schema_document() {
        let validator = synthesize_validator(&every_type(true), &NoTranslation);
        let exported = validator.to_json_schema();
        assert_eq!(exported["type"], json!("object"));
        assert_eq!(exported["properties"]["title"]["title"], json!("title"));
        assert!(exported["required"].as_array().unwrap().contains(&json!("unit")));
        let compiled = validator_for(&exported).expect("exported schema compiles");
        assert!(!compiled.is_valid(&json!({"title": ""})));
    }

    #[test]
    fn decorations_are_not_fields() {
        let node = Node::Line(NodeCommon::default());
        assert!(synthesize_validator(&node, &NoTranslation).is_empty());
    }
}
