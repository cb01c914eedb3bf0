use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde_json::Value;

use super::api::{DialogKind, DialogRequest};
use crate::{
    domain::{EditMode, Record},
    form::{DataSourceResolver, FormEvent, FormRenderer, Phase, Reaction},
};

/// One open create/edit/copy/delete dialog: its form, its option sources
/// and the mode it will be saved with.
///
/// Edits only mark the option sources that depend on them as stale. The
/// next [`Self::pump`] or [`Self::refresh_options`] re-fetches them once,
/// after a single debounce window, with the values current at that point.
pub struct DialogSession {
    kind: DialogKind,
    window_id: String,
    title: String,
    renderer: FormRenderer,
    resolver: DataSourceResolver,
    /// Edited fields some remote source depends on.
    dirty: BTreeSet<String>,
    /// Sources fetched at least once.
    loaded: BTreeSet<String>,
}

impl std::fmt::Debug for DialogSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogSession")
            .field("kind", &self.kind)
            .field("window_id", &self.window_id)
            .field("renderer", &self.renderer)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl DialogSession {
    pub(crate) fn new(
        kind: DialogKind,
        window_id: String,
        title: String,
        mut renderer: FormRenderer,
        resolver: DataSourceResolver,
    ) -> Self {
        renderer.set_all_options(resolver.snapshot());
        Self {
            kind,
            window_id,
            title,
            renderer,
            resolver,
            dirty: BTreeSet::new(),
            loaded: BTreeSet::new(),
        }
    }

    pub fn kind(&self) -> DialogKind {
        self.kind
    }

    /// Mode sent on submit; a copy is saved as new.
    pub fn submit_mode(&self) -> EditMode {
        self.kind.edit_mode()
    }

    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn renderer(&self) -> &FormRenderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut FormRenderer {
        &mut self.renderer
    }

    /// A handle on the option sources, for hosts that drive refreshes
    /// themselves.
    pub fn resolver(&self) -> DataSourceResolver {
        self.resolver.clone()
    }

    pub fn values(&self) -> &Record {
        self.renderer.values()
    }

    pub fn phase(&self) -> Phase {
        self.renderer.phase()
    }

    pub fn details(&self) -> &IndexMap<String, Vec<Record>> {
        self.renderer.details()
    }

    pub(crate) fn request(&self) -> DialogRequest {
        DialogRequest {
            kind: self.kind,
            window_id: self.window_id.clone(),
            title: self.title.clone(),
            schema: self.renderer.schema().clone(),
            values: self.renderer.values().clone(),
            details: self.renderer.details().clone(),
        }
    }

    /// Fields edited since the last option refresh that some source
    /// depends on.
    pub fn pending_refresh(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    /// Resolves the option sources of every visible group against the
    /// current values. Sources inside hidden groups wait until they show.
    pub async fn load_options(&mut self) {
        let active = self.renderer.active_sources();
        let values = self.renderer.values().clone();
        self.resolver.resolve_sources(&active, &values).await;
        self.loaded.extend(active);
        self.renderer.set_all_options(self.resolver.snapshot());
    }

    /// Applies an edit. Dependent option sources are refreshed by the next
    /// [`Self::pump`] or [`Self::refresh_options`].
    pub fn change(&mut self, field: &str, value: Value) -> Vec<Reaction> {
        let reactions = self.renderer.handle(FormEvent::Changed {
            field: field.to_string(),
            value,
        });
        self.mark_dirty(&reactions);
        reactions
    }

    /// Drains events queued by mounted handles, then refreshes the option
    /// sources they made stale.
    pub async fn pump(&mut self) -> Vec<Reaction> {
        let reactions = self.renderer.pump();
        self.mark_dirty(&reactions);
        self.refresh_options().await;
        reactions
    }

    fn mark_dirty(&mut self, reactions: &[Reaction]) {
        let watched = self.resolver.watched_fields();
        self.dirty
            .extend(reactions.iter().filter_map(|reaction| match reaction {
                Reaction::ValueChanged { field, .. } if watched.contains(field) => {
                    Some(field.clone())
                }
                _ => None,
            }));
    }

    /// Fetches sources of groups that became visible, and re-fetches the
    /// visible sources depending on edited fields after one debounce window.
    /// Returns the names of sources whose rows changed.
    pub async fn refresh_options(&mut self) -> Vec<String> {
        let active = self.renderer.active_sources();
        let fresh: BTreeSet<String> = active.difference(&self.loaded).cloned().collect();
        let stale: BTreeSet<String> = active.intersection(&self.loaded).cloned().collect();
        let dirty = std::mem::take(&mut self.dirty);
        let values = self.renderer.values().clone();

        let mut updated = Vec::new();
        if !fresh.is_empty() {
            updated.extend(self.resolver.resolve_sources(&fresh, &values).await);
            self.loaded.extend(fresh);
        }
        if !dirty.is_empty() {
            log::debug!("refreshing option sources after edits of {dirty:?}");
            updated.extend(
                self.resolver
                    .fields_changed(&dirty, Some(&stale), &values)
                    .await,
            );
        }
        for source in &updated {
            let rows = self.resolver.options(source);
            self.renderer.set_options(source.clone(), rows);
        }
        updated
    }
}
