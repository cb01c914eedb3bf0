use indexmap::IndexMap;
use thiserror::Error;

/// Failures reported by the API client collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("request to '{link}' failed with status {status}: {message}")]
    Status {
        link: String,
        status: u16,
        message: String,
    },

    /// 401-class responses. Token handling belongs to the client itself.
    #[error("request to '{0}' is not authorized")]
    Unauthorized(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected response shape: {0}")]
    Decode(String),
}

/// Failures while compiling or evaluating a condition expression.
///
/// These never leave `form::condition`; the evaluator falls back to the
/// condition's default instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("unexpected token '{found}' at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("'{0}' is not defined")]
    UnknownIdentifier(String),

    #[error("cannot read '{member}' of {target}")]
    NullMember { member: String, target: &'static str },
}

/// Errors surfaced by the window controller and its metadata cache.
#[derive(Error, Debug, Clone)]
pub enum WindowError {
    #[error("failed to load configuration for window '{window_id}': {source}")]
    Config {
        window_id: String,
        #[source]
        source: ApiError,
    },

    #[error("window '{window_id}' has an invalid configuration: {message}")]
    InvalidConfig { window_id: String, message: String },

    #[error("window '{0}' has not been opened yet")]
    NotLoaded(String),

    #[error("failed to fetch rows: {0}")]
    Fetch(#[source] ApiError),

    #[error("save failed: {0}")]
    Save(String),

    #[error("no row is selected")]
    NoSelection,

    #[error("operation '{0}' is not permitted for this window")]
    Forbidden(&'static str),
}

/// Per-field validation messages in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors(IndexMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message unless the field already has one.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    /// Replaces or clears the message of one field.
    pub fn set(&mut self, field: &str, message: Option<String>) {
        match message {
            Some(message) => {
                self.0.insert(field.to_string(), message);
            }
            None => {
                self.0.shift_remove(field);
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_map(self) -> IndexMap<String, String> {
        self.0
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}
