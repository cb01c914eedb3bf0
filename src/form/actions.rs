use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use serde_json::Value;

use crate::error::FieldErrors;

/// Input produced by mounted handles.
#[derive(Debug, Clone, PartialEq)]
pub enum FormEvent {
    Changed { field: String, value: Value },
    Blurred { field: String },
    Activated { action: String, payload: Option<Value> },
}

/// One activation, normalized for the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub action: String,
    pub payload: Value,
}

/// What the renderer did with a drained event.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    ValueChanged { field: String, value: Value },
    FieldValidated { field: String, error: Option<String> },
    /// A submit was refused; the form is back to idle.
    Invalid(FieldErrors),
    Dispatch(Dispatch),
}

impl Reaction {
    pub fn as_dispatch(&self) -> Option<&Dispatch> {
        match self {
            Reaction::Dispatch(dispatch) => Some(dispatch),
            _ => None,
        }
    }
}

/// Shared FIFO between mounted handles and the renderer.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<VecDeque<FormEvent>>>,
}

impl EventQueue {
    pub fn push(&self, event: FormEvent) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
    }

    pub fn drain(&self) -> Vec<FormEvent> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
