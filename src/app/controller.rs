use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use crossterm::event::KeyEvent;
use futures::future::join_all;
use indexmap::IndexMap;
use serde_json::{Value, json};
use uuid::Uuid;

use super::{
    api::{ApiClient, ApiRequest, DialogHost, DialogKind, Toast, envelope_records},
    cache::WindowMetadataCache,
    dialog::DialogSession,
    input::{ListCommand, classify},
    options::ControllerOptions,
    status::LoadStatus,
};
use crate::{
    domain::{
        Node, Permission, Record, WindowConfig, delete_schema, detail_key, schema_for_tab,
    },
    error::{ApiError, FieldErrors, WindowError},
    form::{DataSourceResolver, FormRenderer, Phase, Reaction},
    i18n::{self, NoTranslation, Translator},
    records::{
        FlatRow, SearchIndex, TreeOptions, TreeRow, filter_records, filter_tree, flat_rows, nest,
        visible_rows,
    },
};

/// Parameters of one list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: usize,
    pub page_size: usize,
    pub filter: String,
    pub tlbparam: Value,
    pub infoparam: Value,
}

impl ListQuery {
    fn new(page_size: usize) -> Self {
        Self {
            page: 0,
            page_size,
            filter: String::new(),
            tlbparam: Value::Null,
            infoparam: Value::Null,
        }
    }
}

#[derive(Debug, Default)]
struct ListState {
    config: Option<WindowConfig>,
    schema: Option<Node>,
    tree_options: Option<TreeOptions>,
    query: Option<ListQuery>,
    /// The query of the last issued fetch.
    last_query: Option<ListQuery>,
    records: Vec<Record>,
    tree: Vec<TreeRow>,
    rows: Vec<FlatRow>,
    collapsed: HashSet<String>,
    selected: Option<usize>,
    total_count: Option<u64>,
    status: LoadStatus,
}

impl ListState {
    fn selected_key(&self) -> Option<String> {
        self.selected
            .and_then(|index| self.rows.get(index))
            .and_then(|row| row.key.clone())
    }

    /// Rebuilds the flat row order and keeps the selection on the same key
    /// when it is still present, else on the first row.
    fn materialize(&mut self, id_field: &str) {
        let previous = self.selected_key();
        self.rows = if self.tree_options.is_some() {
            visible_rows(&self.tree, &self.collapsed, id_field)
        } else {
            flat_rows(&self.records, id_field)
        };
        let kept = previous.and_then(|key| {
            self.rows
                .iter()
                .position(|row| row.key.as_deref() == Some(key.as_str()))
        });
        self.selected = kept.or(if self.rows.is_empty() { None } else { Some(0) });
    }
}

/// What a handled key press led to.
#[derive(Debug)]
pub enum KeyOutcome {
    Moved(Option<usize>),
    Toggled,
    Refreshed,
    Opened(DialogSession),
    Ignored,
}

/// Result of a dialog submit.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Saved,
    /// Validation refused the values; the dialog stays open.
    Invalid(FieldErrors),
    /// The dialog was not in a state that accepts a submit.
    Ignored,
}

/// The CRUD lifecycle of one window: list or tree fetch, selection,
/// dialogs and saves.
///
/// Fetches are last-issued-wins: every fetch takes a ticket and its response
/// is applied only while that ticket is the newest.
pub struct WindowController {
    window_id: String,
    api: Arc<dyn ApiClient>,
    cache: WindowMetadataCache,
    host: Arc<dyn DialogHost>,
    translator: Arc<dyn Translator>,
    options: ControllerOptions,
    context: Record,
    state: Mutex<ListState>,
    generation: AtomicU64,
}

impl WindowController {
    pub fn new(
        window_id: impl Into<String>,
        api: Arc<dyn ApiClient>,
        cache: WindowMetadataCache,
        host: Arc<dyn DialogHost>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            window_id: window_id.into(),
            api,
            cache,
            host,
            translator: Arc::new(NoTranslation),
            options,
            context: Record::new(),
            state: Mutex::new(ListState::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    /// Values visible to condition expressions after the dependency values.
    pub fn with_context(mut self, context: Record) -> Self {
        self.context = context;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Loads config, master schema and permission, then fetches rows.
    pub async fn open(&self) -> Result<(), WindowError> {
        let config = self.cache.get(&self.window_id).await?;
        let schema = schema_for_tab(&config, 0, &self.options.id_field).map_err(|err| {
            WindowError::InvalidConfig {
                window_id: self.window_id.clone(),
                message: format!("{err:#}"),
            }
        })?;
        let tree_options = self.options.tree.clone().or_else(|| {
            config
                .master()
                .and_then(|tab| tab.tree.as_ref())
                .map(|hints| TreeOptions {
                    id_field: self.options.id_field.clone(),
                    ..TreeOptions::from(hints)
                })
        });
        log::debug!(
            "opened window '{}' ({} mode)",
            self.window_id,
            if tree_options.is_some() { "tree" } else { "paged" }
        );
        {
            let mut state = self.lock();
            state.config = Some(config);
            state.schema = Some(schema);
            state.tree_options = tree_options;
            if state.query.is_none() {
                state.query = Some(ListQuery::new(self.options.page_size.max(1)));
            }
        }
        self.fetch().await
    }

    pub fn config(&self) -> Option<WindowConfig> {
        self.lock().config.clone()
    }

    pub fn schema(&self) -> Option<Node> {
        self.lock().schema.clone()
    }

    pub fn permission(&self) -> Permission {
        self.lock()
            .config
            .as_ref()
            .map(WindowConfig::permission)
            .unwrap_or_default()
    }

    pub fn is_tree(&self) -> bool {
        self.lock().tree_options.is_some()
    }

    /// Fetches with the current query.
    pub async fn fetch(&self) -> Result<(), WindowError> {
        let query = {
            let state = self.lock();
            if state.config.is_none() {
                return Err(WindowError::NotLoaded(self.window_id.clone()));
            }
            state
                .query
                .clone()
                .unwrap_or_else(|| ListQuery::new(self.options.page_size.max(1)))
        };
        self.fetch_query(query).await
    }

    /// Re-issues the last fetch with unchanged parameters.
    pub async fn refresh(&self) -> Result<(), WindowError> {
        let last = self.lock().last_query.clone();
        match last {
            Some(query) => self.fetch_query(query).await,
            None => self.fetch().await,
        }
    }

    async fn fetch_query(&self, query: ListQuery) -> Result<(), WindowError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let tree_mode = {
            let mut state = self.lock();
            state.status.started();
            state.last_query = Some(query.clone());
            state.tree_options.is_some()
        };
        let (start, count) = if tree_mode {
            (0, -1)
        } else {
            let size = query.page_size.max(1);
            (
                i64::try_from(query.page * size).unwrap_or(i64::MAX),
                i64::try_from(size).unwrap_or(i64::MAX),
            )
        };
        let request = ApiRequest::new(self.options.endpoints.data.clone()).with_data(json!({
            "start": start,
            "count": count,
            "continue": false,
            "filter": query.filter,
            "tlbparam": query.tlbparam,
            "infoparam": query.infoparam,
            "window_id": self.window_id,
        }));
        log::debug!("fetch #{ticket} of window '{}': start={start} count={count}", self.window_id);
        let response = self.api.post(request).await;

        if self.generation.load(Ordering::SeqCst) != ticket {
            log::debug!("fetch #{ticket} of window '{}' superseded", self.window_id);
            return Ok(());
        }

        let page = response.and_then(|response| {
            let total = total_count(&response);
            envelope_records(response).map(|records| (records, total))
        });
        let mut state = self.lock();
        match page {
            Ok((records, total)) => {
                if let Some(tree_options) = state.tree_options.clone() {
                    state.tree = nest(&records, &tree_options);
                    state.total_count = Some(records.len() as u64);
                } else {
                    state.tree.clear();
                    state.total_count = Some(total.unwrap_or(records.len() as u64));
                }
                state.records = records;
                state.materialize(&self.options.id_field);
                state.status.succeeded();
                Ok(())
            }
            Err(err) => {
                log::warn!("fetch of window '{}' failed: {err}", self.window_id);
                state.status.failed(err.to_string());
                Err(WindowError::Fetch(err))
            }
        }
    }

    fn update_query(&self, update: impl FnOnce(&mut ListQuery)) -> Result<(), WindowError> {
        let mut state = self.lock();
        if state.config.is_none() {
            return Err(WindowError::NotLoaded(self.window_id.clone()));
        }
        let query = state
            .query
            .get_or_insert_with(|| ListQuery::new(self.options.page_size.max(1)));
        update(query);
        Ok(())
    }

    pub async fn set_page(&self, page: usize) -> Result<(), WindowError> {
        self.update_query(|query| query.page = page)?;
        self.fetch().await
    }

    /// Changing the page size starts again from the first page.
    pub async fn set_page_size(&self, page_size: usize) -> Result<(), WindowError> {
        self.update_query(|query| {
            query.page_size = page_size.max(1);
            query.page = 0;
        })?;
        self.fetch().await
    }

    pub async fn set_filter(&self, filter: impl Into<String>) -> Result<(), WindowError> {
        let filter = filter.into();
        self.update_query(|query| {
            query.filter = filter;
            query.page = 0;
        })?;
        self.fetch().await
    }

    /// Extra toolbar and info parameters forwarded with every list request.
    pub async fn set_params(&self, tlbparam: Value, infoparam: Value) -> Result<(), WindowError> {
        self.update_query(|query| {
            query.tlbparam = tlbparam;
            query.infoparam = infoparam;
        })?;
        self.fetch().await
    }

    pub fn query(&self) -> Option<ListQuery> {
        self.lock().query.clone()
    }

    pub fn page(&self) -> usize {
        self.lock().query.as_ref().map_or(0, |query| query.page)
    }

    pub fn page_count(&self) -> usize {
        let state = self.lock();
        let size = state
            .query
            .as_ref()
            .map_or(self.options.page_size, |query| query.page_size)
            .max(1) as u64;
        let total = state.total_count.unwrap_or(0);
        usize::try_from(total.div_ceil(size)).unwrap_or(usize::MAX)
    }

    pub fn total_count(&self) -> Option<u64> {
        self.lock().total_count
    }

    pub fn status(&self) -> LoadStatus {
        self.lock().status.clone()
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().records.clone()
    }

    pub fn tree(&self) -> Vec<TreeRow> {
        self.lock().tree.clone()
    }

    /// Rows in navigation order.
    pub fn rows(&self) -> Vec<FlatRow> {
        self.lock().rows.clone()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.lock().selected
    }

    pub fn selected(&self) -> Option<FlatRow> {
        let state = self.lock();
        state.selected.and_then(|index| state.rows.get(index).cloned())
    }

    pub fn select_key(&self, key: &str) -> bool {
        let mut state = self.lock();
        match state.rows.iter().position(|row| row.key.as_deref() == Some(key)) {
            Some(index) => {
                state.selected = Some(index);
                true
            }
            None => false,
        }
    }

    /// Moves the selection within the materialized rows, clamped at both ends.
    pub fn move_selection(&self, delta: i64) -> Option<usize> {
        let mut state = self.lock();
        if state.rows.is_empty() {
            state.selected = None;
            return None;
        }
        let last = state.rows.len() - 1;
        let current = i64::try_from(state.selected.unwrap_or(0)).unwrap_or(i64::MAX);
        let target = current.saturating_add(delta).clamp(0, i64::try_from(last).unwrap_or(i64::MAX));
        state.selected = usize::try_from(target).ok();
        state.selected
    }

    /// Collapses or expands the selected tree row. Returns whether anything
    /// changed.
    pub fn set_expanded(&self, expanded: bool) -> bool {
        let mut state = self.lock();
        if state.tree_options.is_none() {
            return false;
        }
        let Some(row) = state.selected.and_then(|index| state.rows.get(index)) else {
            return false;
        };
        let (Some(key), true) = (row.key.clone(), row.has_children) else {
            return false;
        };
        let changed = if expanded {
            state.collapsed.remove(&key)
        } else {
            state.collapsed.insert(key)
        };
        if changed {
            state.materialize(&self.options.id_field);
        }
        changed
    }

    /// Client-side quick search over the fetched records.
    pub fn search(&self, query: &str) -> Vec<String> {
        let state = self.lock();
        SearchIndex::build(&state.records, &[], &self.options.id_field).search(query)
    }

    /// Rows whose cells contain `query`; tree rows keep their ancestors.
    pub fn matching_rows(&self, query: &str, columns: &[String]) -> Vec<FlatRow> {
        let state = self.lock();
        if state.tree_options.is_some() {
            let tree = filter_tree(&state.tree, query, columns);
            visible_rows(&tree, &HashSet::new(), &self.options.id_field)
        } else {
            flat_rows(&filter_records(&state.records, query, columns), &self.options.id_field)
        }
    }

    pub async fn handle_key(&self, key: &KeyEvent) -> Result<KeyOutcome, WindowError> {
        let outcome = match classify(key) {
            ListCommand::Move(delta) => KeyOutcome::Moved(self.move_selection(delta)),
            ListCommand::First => KeyOutcome::Moved(self.move_selection(i64::MIN)),
            ListCommand::Last => KeyOutcome::Moved(self.move_selection(i64::MAX)),
            command @ (ListCommand::PageDown | ListCommand::PageUp) if self.is_tree() => {
                let step = i64::try_from(self.options.page_size).unwrap_or(i64::MAX);
                let delta = if command == ListCommand::PageUp { -step } else { step };
                KeyOutcome::Moved(self.move_selection(delta))
            }
            ListCommand::PageDown => {
                let page = self.page();
                if page + 1 >= self.page_count() {
                    KeyOutcome::Ignored
                } else {
                    self.set_page(page + 1).await?;
                    KeyOutcome::Refreshed
                }
            }
            ListCommand::PageUp => match self.page().checked_sub(1) {
                Some(page) => {
                    self.set_page(page).await?;
                    KeyOutcome::Refreshed
                }
                None => KeyOutcome::Ignored,
            },
            ListCommand::Collapse => toggled(self.set_expanded(false)),
            ListCommand::Expand => toggled(self.set_expanded(true)),
            ListCommand::Refresh => {
                self.refresh().await?;
                KeyOutcome::Refreshed
            }
            ListCommand::Activate => KeyOutcome::Opened(self.open_edit().await?),
            ListCommand::New => KeyOutcome::Opened(self.open_new().await?),
            ListCommand::Copy => KeyOutcome::Opened(self.open_copy().await?),
            ListCommand::Delete => KeyOutcome::Opened(self.open_delete().await?),
            ListCommand::None => KeyOutcome::Ignored,
        };
        Ok(outcome)
    }

    fn loaded(&self) -> Result<(WindowConfig, Node), WindowError> {
        let state = self.lock();
        match (&state.config, &state.schema) {
            (Some(config), Some(schema)) => Ok((config.clone(), schema.clone())),
            _ => Err(WindowError::NotLoaded(self.window_id.clone())),
        }
    }

    fn selected_record(&self) -> Result<Record, WindowError> {
        self.selected()
            .map(|row| row.record)
            .ok_or(WindowError::NoSelection)
    }

    fn fresh_id() -> Value {
        Value::String(Uuid::new_v4().to_string())
    }

    pub async fn open_new(&self) -> Result<DialogSession, WindowError> {
        if !self.permission().new {
            return Err(WindowError::Forbidden("new"));
        }
        let (_, schema) = self.loaded()?;
        let mut values = Record::new();
        values.insert(self.options.id_field.clone(), Self::fresh_id());
        self.open_dialog(DialogKind::New, schema, values, None).await
    }

    pub async fn open_edit(&self) -> Result<DialogSession, WindowError> {
        if !self.permission().edit {
            return Err(WindowError::Forbidden("edit"));
        }
        let (_, schema) = self.loaded()?;
        let record = self.selected_record()?;
        let id = record.get(&self.options.id_field).cloned();
        self.open_dialog(DialogKind::Edit, schema, record, id).await
    }

    /// Edit-like dialog seeded with the selected record under a fresh id;
    /// details are loaded from the source record.
    pub async fn open_copy(&self) -> Result<DialogSession, WindowError> {
        if !self.permission().new {
            return Err(WindowError::Forbidden("copy"));
        }
        let (_, schema) = self.loaded()?;
        let mut record = self.selected_record()?;
        let source_id = record.insert(self.options.id_field.clone(), Self::fresh_id());
        self.open_dialog(DialogKind::Copy, schema, record, source_id).await
    }

    pub async fn open_delete(&self) -> Result<DialogSession, WindowError> {
        if !self.permission().delete {
            return Err(WindowError::Forbidden("delete"));
        }
        self.loaded()?;
        let record = self.selected_record()?;
        let schema = delete_schema(&self.options.id_field);
        self.open_dialog(DialogKind::Delete, schema, record, None)
            .await
    }

    /// Builds the session, loads details of `detail_id` and option sources
    /// concurrently, and presents the dialog once all of them settled.
    async fn open_dialog(
        &self,
        kind: DialogKind,
        schema: Node,
        values: Record,
        detail_id: Option<Value>,
    ) -> Result<DialogSession, WindowError> {
        let resolver = DataSourceResolver::new(
            Arc::clone(&self.api),
            schema.data_sources(),
            self.options.debounce(),
        );
        let renderer = FormRenderer::new(
            schema,
            Arc::clone(&self.translator),
            values,
            self.context.clone(),
        );
        let title = i18n::text(self.translator.as_ref(), kind.title_key());
        let mut session =
            DialogSession::new(kind, self.window_id.clone(), title, renderer, resolver);

        let details = async {
            match &detail_id {
                Some(id) => self.fetch_details(id).await,
                None => IndexMap::new(),
            }
        };
        let (details, ()) = futures::join!(details, session.load_options());
        for (key, rows) in details {
            session.renderer_mut().set_details(key, rows);
        }

        self.host.present(&session.request());
        Ok(session)
    }

    /// Child rows of every detail tab, fetched concurrently. A failing tab
    /// yields an empty list.
    pub async fn fetch_details(&self, id: &Value) -> IndexMap<String, Vec<Record>> {
        let tabs: Vec<(String, Option<String>)> = self
            .config()
            .map(|config| {
                config
                    .detail_tabs()
                    .map(|(index, tab)| (detail_key(index, tab.table.as_deref()), tab.table.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let requests = tabs.into_iter().map(|(key, table)| async move {
            let request = ApiRequest::new(self.options.endpoints.detail.clone()).with_data(json!({
                "window_id": self.window_id,
                "id": id,
                "tab_table": table,
            }));
            let rows = match self.api.post(request).await.and_then(envelope_records) {
                Ok(rows) => rows,
                Err(err) => {
                    log::warn!("detail tab '{key}' of window '{}' failed: {err}", self.window_id);
                    Vec::new()
                }
            };
            (key, rows)
        });
        join_all(requests).await.into_iter().collect()
    }

    /// Validates and saves the dialog's values.
    ///
    /// A refused validation keeps the dialog open with field errors. A
    /// transport failure or an `error` in the response shows a toast and
    /// keeps the dialog open. Success closes the dialog and re-fetches.
    pub async fn submit(&self, session: &mut DialogSession) -> Result<SubmitOutcome, WindowError> {
        match session.phase() {
            Phase::Idle => match session.renderer_mut().submit() {
                Some(Reaction::Invalid(errors)) => return Ok(SubmitOutcome::Invalid(errors)),
                Some(Reaction::Dispatch(_)) => {}
                _ => return Ok(SubmitOutcome::Ignored),
            },
            Phase::Submitting => {}
            Phase::Validating | Phase::Closed => return Ok(SubmitOutcome::Ignored),
        }

        let mode = session.submit_mode();
        let request = ApiRequest::new(self.options.endpoints.save.clone()).with_data(json!({
            "editmode": mode,
            "windowid": session.window_id(),
            "data": [Value::Object(session.values().clone())],
        }));
        log::debug!("saving window '{}' as {mode:?}", session.window_id());
        let failure = match self.api.post(request).await {
            Ok(response) => response_error(&response),
            Err(err) => Some(transport_message(&err)),
        };

        if let Some(message) = failure {
            log::warn!("save of window '{}' failed: {message}", session.window_id());
            self.host.toast(Toast::error(message.clone()));
            session.renderer_mut().finish_submit(Err(message.clone()));
            return Err(WindowError::Save(message));
        }

        session.renderer_mut().finish_submit(Ok(()));
        self.host.close(session.kind());
        if let Err(err) = self.fetch().await {
            log::warn!("refetch after save failed: {err}");
        }
        Ok(SubmitOutcome::Saved)
    }
}

fn toggled(changed: bool) -> KeyOutcome {
    if changed {
        KeyOutcome::Toggled
    } else {
        KeyOutcome::Ignored
    }
}

fn total_count(response: &Value) -> Option<u64> {
    let object = response.as_object()?;
    ["total_count", "totalCount", "total"]
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(|value| match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}

/// The message of a non-null `error` payload.
fn response_error(response: &Value) -> Option<String> {
    match response.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        Value::Object(map) => Some(
            map.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        ),
        other => Some(other.to_string()),
    }
}

fn transport_message(err: &ApiError) -> String {
    match err {
        ApiError::Status { message, .. } if !message.is_empty() => message.clone(),
        other => other.to_string(),
    }
}
