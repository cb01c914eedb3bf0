use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::records::TreeOptions;

/// Backend links used by the controller and the metadata cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub data: String,
    pub config: String,
    pub save: String,
    pub detail: String,
    pub cache_clear: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            data: "window/data".to_string(),
            config: "window/config".to_string(),
            save: "window/save".to_string(),
            detail: "window/detail".to_string(),
            cache_clear: "cache/clear".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerOptions {
    pub page_size: usize,
    /// Quiescence window before dependent option sources are re-fetched.
    pub debounce_ms: u64,
    /// Tree mode. `None` lists one page at a time.
    pub tree: Option<TreeOptions>,
    pub id_field: String,
    pub endpoints: Endpoints,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            page_size: 50,
            debounce_ms: 500,
            tree: None,
            id_field: "id".to_string(),
            endpoints: Endpoints::default(),
        }
    }
}

impl ControllerOptions {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_tree(mut self, tree: TreeOptions) -> Self {
        self.tree = Some(tree);
        self
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}
