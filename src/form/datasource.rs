use std::{
    collections::BTreeSet,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::future::join_all;
use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;

use crate::{
    app::{ApiClient, ApiRequest, envelope_rows},
    domain::{DataSourceDescriptor, Record, RemoteSource},
};

/// Characters left alone by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Placeholder replaced by the filter text in reference search templates.
pub const SEARCH_TOKEN: &str = "#S#";

pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Replaces every placeholder of `source` with the percent-encoded value of
/// the field it maps to.
pub fn substitute(source: &RemoteSource, values: &Record) -> String {
    source
        .map_key
        .iter()
        .fold(source.url.clone(), |url, (token, field)| {
            url.replace(token, &encode_component(&value_text(values.get(field))))
        })
}

#[derive(Debug)]
struct Slot {
    descriptor: DataSourceDescriptor,
    rows: Vec<Value>,
    /// Last ticket issued for this source.
    generation: u64,
}

#[derive(Debug, Default)]
struct ResolverState {
    slots: IndexMap<String, Slot>,
}

/// Resolves the named option lists of a form and keeps them current as the
/// fields they depend on change.
///
/// Each remote source carries a generation counter. Every request takes a
/// ticket; its response is applied only while that ticket is still the
/// latest one issued for the source.
#[derive(Clone)]
pub struct DataSourceResolver {
    api: Arc<dyn ApiClient>,
    debounce: Duration,
    state: Arc<Mutex<ResolverState>>,
}

impl std::fmt::Debug for DataSourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceResolver")
            .field("debounce", &self.debounce)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl DataSourceResolver {
    pub fn new(
        api: Arc<dyn ApiClient>,
        sources: IndexMap<String, DataSourceDescriptor>,
        debounce: Duration,
    ) -> Self {
        let slots = sources
            .into_iter()
            .map(|(name, descriptor)| {
                let rows = match &descriptor {
                    DataSourceDescriptor::Static(rows) => rows.clone(),
                    DataSourceDescriptor::Remote(_) => Vec::new(),
                };
                (
                    name,
                    Slot {
                        descriptor,
                        rows,
                        generation: 0,
                    },
                )
            })
            .collect();
        Self {
            api,
            debounce,
            state: Arc::new(Mutex::new(ResolverState { slots })),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ResolverState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn options(&self, name: &str) -> Vec<Value> {
        self.with_state(|state| {
            state
                .slots
                .get(name)
                .map(|slot| slot.rows.clone())
                .unwrap_or_default()
        })
    }

    /// Current rows of every source.
    pub fn snapshot(&self) -> IndexMap<String, Vec<Value>> {
        self.with_state(|state| {
            state
                .slots
                .iter()
                .map(|(name, slot)| (name.clone(), slot.rows.clone()))
                .collect()
        })
    }

    /// Fields whose value appears in some source URL.
    pub fn watched_fields(&self) -> BTreeSet<String> {
        self.with_state(|state| {
            state
                .slots
                .values()
                .filter_map(|slot| match &slot.descriptor {
                    DataSourceDescriptor::Remote(remote) => Some(remote.map_key.values()),
                    DataSourceDescriptor::Static(_) => None,
                })
                .flatten()
                .cloned()
                .collect()
        })
    }

    /// Issues a ticket for each remote source that passes `filter`.
    fn issue(
        &self,
        filter: impl Fn(&str, &RemoteSource) -> bool,
    ) -> Vec<(String, RemoteSource, u64)> {
        self.with_state(|state| {
            state
                .slots
                .iter_mut()
                .filter_map(|(name, slot)| match &slot.descriptor {
                    DataSourceDescriptor::Remote(remote) if filter(name, remote) => {
                        slot.generation += 1;
                        Some((name.clone(), remote.clone(), slot.generation))
                    }
                    _ => None,
                })
                .collect()
        })
    }

    fn is_current(&self, name: &str, ticket: u64) -> bool {
        self.with_state(|state| {
            state
                .slots
                .get(name)
                .is_some_and(|slot| slot.generation == ticket)
        })
    }

    /// Stores `rows` unless a newer ticket was issued meanwhile.
    fn apply(&self, name: &str, ticket: u64, rows: Vec<Value>) -> bool {
        self.with_state(|state| match state.slots.get_mut(name) {
            Some(slot) if slot.generation == ticket => {
                slot.rows = rows;
                true
            }
            _ => {
                log::debug!("discarding superseded response for source '{name}'");
                false
            }
        })
    }

    async fn fetch(&self, name: &str, url: String) -> Vec<Value> {
        let response = self.api.get(ApiRequest::new(url.clone())).await;
        match response.and_then(envelope_rows) {
            Ok(rows) => rows,
            Err(err) => {
                log::warn!("option source '{name}' ({url}) degraded to empty: {err}");
                Vec::new()
            }
        }
    }

    async fn run(&self, tickets: Vec<(String, RemoteSource, u64)>, values: &Record) -> Vec<String> {
        let requests = tickets.into_iter().map(|(name, remote, ticket)| async move {
            let url = substitute(&remote, values);
            let rows = self.fetch(&name, url).await;
            self.apply(&name, ticket, rows).then_some(name)
        });
        join_all(requests).await.into_iter().flatten().collect()
    }

    /// Fetches every remote source concurrently. A failing source resolves
    /// to an empty list.
    pub async fn resolve_all(&self, values: &Record) -> IndexMap<String, Vec<Value>> {
        let tickets = self.issue(|_, _| true);
        self.run(tickets, values).await;
        self.snapshot()
    }

    /// Fetches the named remote sources right away. Returns the names this
    /// call updated.
    pub async fn resolve_sources(&self, names: &BTreeSet<String>, values: &Record) -> Vec<String> {
        let tickets = self.issue(|name, _| names.contains(name));
        self.run(tickets, values).await
    }

    /// Re-fetches the sources whose URL depends on `field`, after the
    /// debounce window. A change superseded within the window sends nothing.
    /// Returns the names of sources this call updated.
    pub async fn field_changed(&self, field: &str, values: &Record) -> Vec<String> {
        let fields = BTreeSet::from([field.to_string()]);
        self.fields_changed(&fields, None, values).await
    }

    /// Like [`Self::field_changed`] for a batch of edited fields: every
    /// dependent source takes one ticket and the batch waits out a single
    /// debounce window. `within` restricts the candidate sources.
    pub async fn fields_changed(
        &self,
        fields: &BTreeSet<String>,
        within: Option<&BTreeSet<String>>,
        values: &Record,
    ) -> Vec<String> {
        let tickets = self.issue(|name, remote| {
            within.is_none_or(|names| names.contains(name))
                && remote.map_key.values().any(|field| fields.contains(field))
        });
        if tickets.is_empty() {
            return Vec::new();
        }
        tokio::time::sleep(self.debounce).await;
        let live: Vec<_> = tickets
            .into_iter()
            .filter(|(name, _, ticket)| {
                let current = self.is_current(name, *ticket);
                if !current {
                    log::debug!("source '{name}' was re-requested before its debounce ended");
                }
                current
            })
            .collect();
        self.run(live, values).await
    }
}

/// Debounced incremental search against a reference endpoint.
#[derive(Clone)]
pub struct ReferenceSearch {
    api: Arc<dyn ApiClient>,
    template: String,
    token: String,
    debounce: Duration,
    generation: Arc<AtomicU64>,
}

impl ReferenceSearch {
    pub fn new(api: Arc<dyn ApiClient>, template: impl Into<String>, debounce: Duration) -> Self {
        Self {
            api,
            template: template.into(),
            token: SEARCH_TOKEN.to_string(),
            debounce,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn url_for(&self, text: &str) -> String {
        self.template.replace(&self.token, &encode_component(text))
    }

    /// Rows matching `text`, or `None` when a newer search superseded this one.
    pub async fn search(&self, text: &str) -> Option<Vec<Value>> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.debounce).await;
        if self.generation.load(Ordering::SeqCst) != ticket {
            return None;
        }
        let url = self.url_for(text);
        let rows = match self.api.get(ApiRequest::new(url.clone())).await.and_then(envelope_rows) {
            Ok(rows) => rows,
            Err(err) => {
                log::warn!("reference search {url} failed: {err}");
                Vec::new()
            }
        };
        (self.generation.load(Ordering::SeqCst) == ticket).then_some(rows)
    }
}
