use std::collections::BTreeSet;

use serde_json::Value;

use crate::{domain::Record, error::FieldErrors};

/// Submit lifecycle of a form.
///
/// `Idle -> Validating -> Submitting -> Closed`; a refused validation or a
/// failed submit returns to `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Validating,
    Submitting,
    Closed,
}

#[derive(Debug, Clone, Default)]
pub struct FormState {
    values: Record,
    touched: BTreeSet<String>,
    errors: FieldErrors,
    phase: Phase,
    submit_error: Option<String>,
}

impl FormState {
    pub fn new(values: Record) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    pub fn values(&self) -> &Record {
        &self.values
    }

    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Returns whether the stored value changed.
    pub fn set_value(&mut self, field: &str, value: Value) -> bool {
        if self.values.get(field) == Some(&value) {
            return false;
        }
        self.values.insert(field.to_string(), value);
        true
    }

    pub fn touch(&mut self, field: &str) {
        self.touched.insert(field.to_string());
    }

    pub fn is_touched(&self, field: &str) -> bool {
        self.touched.contains(field)
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(field)
    }

    pub fn set_error(&mut self, field: &str, message: Option<String>) {
        self.errors.set(field, message);
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Validating | Phase::Submitting)
    }

    pub fn submit_error(&self) -> Option<&str> {
        self.submit_error.as_deref()
    }

    pub fn begin_validation(&mut self) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.phase = Phase::Validating;
        self.submit_error = None;
        true
    }

    /// Refused submit: every field counts as touched so all messages show.
    pub fn validation_failed(&mut self, errors: FieldErrors) {
        self.touched.extend(self.values.keys().cloned());
        self.touched.extend(errors.iter().map(|(field, _)| field.to_string()));
        self.errors = errors;
        self.phase = Phase::Idle;
    }

    pub fn validation_passed(&mut self) {
        self.errors = FieldErrors::new();
        self.phase = Phase::Submitting;
    }

    /// Ends a submit. Only meaningful while `Submitting`.
    pub fn finish_submit(&mut self, outcome: Result<(), String>) -> bool {
        if self.phase != Phase::Submitting {
            return false;
        }
        match outcome {
            Ok(()) => self.phase = Phase::Closed,
            Err(message) => {
                self.submit_error = Some(message);
                self.phase = Phase::Idle;
            }
        }
        true
    }
}
