//! Collaborator contracts the engine talks to: the HTTP-ish API client, the
//! binary file transport, a string cache store and the dialog host.

use std::{
    collections::HashMap,
    sync::{LazyLock, Mutex, PoisonError},
};

use async_trait::async_trait;
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{EditMode, Node, Record, Severity},
    error::ApiError,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl ApiRequest {
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Transport to the backend. Authentication, timeouts and retries are the
/// implementor's business.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn get(&self, request: ApiRequest) -> Result<Value, ApiError>;
    async fn post(&self, request: ApiRequest) -> Result<Value, ApiError>;
    async fn put(&self, request: ApiRequest) -> Result<Value, ApiError>;
    async fn delete(&self, request: ApiRequest) -> Result<Value, ApiError>;
}

/// Rows of a response: a bare array or a `{data: [...]}` envelope.
pub fn envelope_rows(response: Value) -> Result<Vec<Value>, ApiError> {
    match response {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            Some(Value::Null) => Ok(Vec::new()),
            Some(other) => Err(ApiError::Decode(format!(
                "expected 'data' to be an array, found {}",
                json_kind(&other)
            ))),
            None => Err(ApiError::Decode(
                "expected an array or an object with 'data'".to_string(),
            )),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(ApiError::Decode(format!(
            "expected rows, found {}",
            json_kind(&other)
        ))),
    }
}

/// Like [`envelope_rows`], keeping only object rows.
pub fn envelope_records(response: Value) -> Result<Vec<Record>, ApiError> {
    Ok(envelope_rows(response)?
        .into_iter()
        .filter_map(|row| match row {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect())
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFile {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
}

/// Binary variant of [`ApiClient`].
#[async_trait]
pub trait FileTransport: Send + Sync {
    async fn get(&self, request: ApiRequest) -> Result<RawFile, ApiError>;
    async fn post(&self, request: ApiRequest) -> Result<RawFile, ApiError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileDownload {
    pub uri: String,
    pub base64: Option<String>,
    pub file_name: Option<String>,
}

impl FileDownload {
    pub fn from_raw(raw: RawFile) -> Self {
        let file_name = raw
            .content_disposition
            .as_deref()
            .and_then(file_name_from_disposition);
        Self {
            uri: raw.uri,
            base64: raw.base64,
            file_name,
        }
    }
}

static EXTENDED_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\*\s*=\s*UTF-8''([^;\s]+)"#).expect("extended filename pattern")
});
static PLAIN_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).expect("filename pattern")
});

/// File name carried by a `Content-Disposition` header. The RFC 5987
/// `filename*=UTF-8''...` form wins over plain `filename=`.
pub fn file_name_from_disposition(header: &str) -> Option<String> {
    if let Some(encoded) = EXTENDED_FILENAME
        .captures(header)
        .and_then(|caps| caps.get(1))
    {
        let decoded = percent_decode_str(encoded.as_str())
            .decode_utf8_lossy()
            .into_owned();
        if !decoded.is_empty() {
            return Some(decoded);
        }
    }
    PLAIN_FILENAME
        .captures(header)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
}

/// Fetches a file and infers its name.
pub async fn download(
    transport: &dyn FileTransport,
    request: ApiRequest,
    post: bool,
) -> Result<FileDownload, ApiError> {
    let raw = if post {
        transport.post(request).await?
    } else {
        transport.get(request).await?
    };
    Ok(FileDownload::from_raw(raw))
}

/// String key-value persistence for cached metadata.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    New,
    Edit,
    Copy,
    Delete,
}

impl DialogKind {
    pub fn title_key(self) -> &'static str {
        match self {
            DialogKind::New => "dialog.new",
            DialogKind::Edit => "dialog.edit",
            DialogKind::Copy => "dialog.copy",
            DialogKind::Delete => "dialog.delete",
        }
    }

    /// Mode sent with the save request. A copy is saved as a new record.
    pub fn edit_mode(self) -> EditMode {
        match self {
            DialogKind::New | DialogKind::Copy => EditMode::New,
            DialogKind::Edit => EditMode::Edit,
            DialogKind::Delete => EditMode::Delete,
        }
    }
}

/// Everything a host needs to show a dialog.
#[derive(Debug, Clone)]
pub struct DialogRequest {
    pub kind: DialogKind,
    pub window_id: String,
    pub title: String,
    pub schema: Node,
    pub values: Record,
    /// Child rows per detail tab key.
    pub details: IndexMap<String, Vec<Record>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub severity: Severity,
    pub message: String,
}

impl Toast {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            message: message.into(),
        }
    }
}

/// The surface that shows dialogs and notifications.
pub trait DialogHost: Send + Sync {
    fn present(&self, request: &DialogRequest);
    fn close(&self, kind: DialogKind);
    fn toast(&self, toast: Toast);
}
