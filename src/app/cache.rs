use std::sync::Arc;

use serde_json::{Value, json};

use super::{
    api::{ApiClient, ApiRequest, CacheStore},
    options::Endpoints,
};
use crate::{
    domain::{WindowConfig, parse_window_config},
    error::WindowError,
};

pub const CONFIG_PREFIX: &str = "config:";
/// Store entry listing every cached window id. Outside [`CONFIG_PREFIX`],
/// so no window id can name it.
pub const INDEX_KEY: &str = "config-index";

pub fn cache_key(window_id: &str) -> String {
    format!("{CONFIG_PREFIX}{window_id}")
}

/// Window configs, fetched once and kept in a [`CacheStore`].
#[derive(Clone)]
pub struct WindowMetadataCache {
    api: Arc<dyn ApiClient>,
    store: Arc<dyn CacheStore>,
    endpoints: Endpoints,
}

impl WindowMetadataCache {
    pub fn new(api: Arc<dyn ApiClient>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            api,
            store,
            endpoints: Endpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn cached(&self, window_id: &str) -> Option<WindowConfig> {
        let raw = self.store.get(&cache_key(window_id))?;
        let parsed = serde_json::from_str::<Value>(&raw)
            .map_err(anyhow::Error::from)
            .and_then(|value| parse_window_config(&value));
        match parsed {
            Ok(config) => Some(config),
            Err(err) => {
                log::warn!("cached config of window '{window_id}' is unreadable, refetching: {err:#}");
                None
            }
        }
    }

    pub async fn get(&self, window_id: &str) -> Result<WindowConfig, WindowError> {
        if let Some(config) = self.cached(window_id) {
            log::trace!("config cache hit for window '{window_id}'");
            return Ok(config);
        }

        let request = ApiRequest::new(self.endpoints.config.clone())
            .with_data(json!({ "window_id": window_id }));
        let response = self
            .api
            .get(request)
            .await
            .map_err(|source| WindowError::Config {
                window_id: window_id.to_string(),
                source,
            })?;
        let config =
            parse_window_config(&response).map_err(|err| WindowError::InvalidConfig {
                window_id: window_id.to_string(),
                message: format!("{err:#}"),
            })?;

        match serde_json::to_string(&config) {
            Ok(raw) => {
                self.store.set(&cache_key(window_id), raw);
                self.remember(window_id);
            }
            Err(err) => log::warn!("config of window '{window_id}' not cached: {err}"),
        }
        Ok(config)
    }

    fn index(&self) -> Vec<String> {
        self.store
            .get(INDEX_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn write_index(&self, ids: &[String]) {
        if ids.is_empty() {
            self.store.remove(INDEX_KEY);
            return;
        }
        match serde_json::to_string(ids) {
            Ok(raw) => self.store.set(INDEX_KEY, raw),
            Err(err) => log::warn!("config cache index not written: {err}"),
        }
    }

    fn remember(&self, window_id: &str) {
        let mut ids = self.index();
        if !ids.iter().any(|id| id == window_id) {
            ids.push(window_id.to_string());
            self.write_index(&ids);
        }
    }

    pub fn invalidate(&self, window_id: &str) {
        self.store.remove(&cache_key(window_id));
        let mut ids = self.index();
        ids.retain(|id| id != window_id);
        self.write_index(&ids);
    }

    /// Drops every cached config and asks the server to clear its caches.
    /// A failing server call is logged, not returned. Returns how many
    /// entries were dropped.
    pub async fn clear_all(&self) -> usize {
        let ids = self.index();
        for id in &ids {
            self.store.remove(&cache_key(id));
        }
        self.store.remove(INDEX_KEY);
        let request = ApiRequest::new(self.endpoints.cache_clear.clone());
        if let Err(err) = self.api.post(request).await {
            log::warn!("server cache clear failed: {err}");
        }
        log::debug!("cleared {} cached window configs", ids.len());
        ids.len()
    }
}
