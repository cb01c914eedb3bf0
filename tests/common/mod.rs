#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use metawindow::{
    app::{ApiClient, ApiRequest, DialogHost, DialogKind, DialogRequest, Toast},
    domain::Record,
    error::ApiError,
};
use serde_json::{Value, json};
use tokio::time::Instant;

/// One request seen by [`MockApi`].
#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub link: String,
    pub data: Option<Value>,
    pub at: Instant,
}

/// What the scripted backend answers, after an optional delay.
#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Duration,
    pub result: Result<Value, ApiError>,
}

impl Reply {
    pub fn ok(value: Value) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(value),
        }
    }

    pub fn err(error: ApiError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }

    pub fn after(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }
}

type Handler = Box<dyn Fn(&Call) -> Reply + Send + Sync>;

/// Scripted API client recording every call and the peak number of
/// requests in flight.
pub struct MockApi {
    handler: Handler,
    calls: Mutex<Vec<Call>>,
    settled: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockApi {
    pub fn new(handler: impl Fn(&Call) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            settled: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, link: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.link == link)
            .collect()
    }

    /// Links of the calls in issue order.
    pub fn links(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.link).collect()
    }

    /// When each response was handed back, in completion order.
    pub fn settled(&self) -> Vec<(String, Instant)> {
        self.settled.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn respond(&self, method: &'static str, request: ApiRequest) -> Result<Value, ApiError> {
        let call = Call {
            method,
            link: request.link,
            data: request.data,
            at: Instant::now(),
        };
        let reply = (self.handler)(&call);
        self.calls.lock().unwrap().push(call.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.settled
            .lock()
            .unwrap()
            .push((call.link, Instant::now()));
        reply.result
    }
}

#[async_trait]
impl ApiClient for MockApi {
    async fn get(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.respond("GET", request).await
    }

    async fn post(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.respond("POST", request).await
    }

    async fn put(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.respond("PUT", request).await
    }

    async fn delete(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.respond("DELETE", request).await
    }
}

/// Dialog host that remembers what it was asked to do.
#[derive(Default)]
pub struct MockHost {
    pub presented: Mutex<Vec<(DialogRequest, Instant)>>,
    pub closed: Mutex<Vec<DialogKind>>,
    pub toasts: Mutex<Vec<Toast>>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn presented(&self) -> Vec<(DialogRequest, Instant)> {
        self.presented.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<DialogKind> {
        self.closed.lock().unwrap().clone()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap().clone()
    }
}

impl DialogHost for MockHost {
    fn present(&self, request: &DialogRequest) {
        self.presented
            .lock()
            .unwrap()
            .push((request.clone(), Instant::now()));
    }

    fn close(&self, kind: DialogKind) {
        self.closed.lock().unwrap().push(kind);
    }

    fn toast(&self, toast: Toast) {
        self.toasts.lock().unwrap().push(toast);
    }
}

pub fn record(value: Value) -> Record {
    value.as_object().cloned().expect("record fixture must be an object")
}

/// Users window: a master tab with a remote org-unit select and two detail
/// tabs.
pub fn users_config() -> Value {
    json!([{
        "id": "users",
        "title": "Users",
        "tabs": [
            {"title": "Users", "insertProc": "usr_ins", "updateProc": "usr_upd", "deleteProc": "usr_del"},
            {"title": "Roles", "table": "user_roles"},
            {"title": "Logins", "table": "user_logins"}
        ],
        "fields": [
            [
                {"name": "id", "hidden": true},
                {"name": "username", "label": "Username", "required": true},
                {"name": "email", "label": "Email", "email": true},
                {
                    "name": "orgUnit",
                    "type": "select",
                    "reference": "/org?u=#U#",
                    "mapKey": {"#U#": "username"}
                }
            ],
            [{"name": "role"}],
            [{"name": "at", "type": "date"}]
        ]
    }])
}

/// Read-only window with a tree hint on the master tab.
pub fn units_config() -> Value {
    json!([{
        "id": "units",
        "tabs": [{"title": "Units", "tree": {"parentField": "parentId"}}],
        "fields": [[{"name": "id"}, {"name": "name"}]]
    }])
}
