//! Registry of aggregate views served over HTTP.

use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::definition::{AggregateDefinition, is_valid_view_id};
use super::error::AggregateError;
use super::source_set::SourceSetCache;
use super::types::RequestContext;
use super::view::AggregateView;
use crate::store::Store;

/// Summary of a registered view.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ViewSummary {
    pub view_id: String,
    pub label: String,
    pub description: Option<String>,
    pub shape: &'static str,
    pub paginated: bool,
}

struct RegisteredView {
    view: Arc<AggregateView>,
    label: String,
    description: Option<String>,
}

/// Named views, looked up per request.
#[derive(Default)]
pub struct AggregateRegistry {
    views: DashMap<String, RegisteredView>,
}

impl AggregateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a programmatic view under its own name.
    pub fn register(&self, view: AggregateView) -> anyhow::Result<()> {
        self.insert(view, None, None)
    }

    /// Build and register a declarative view.
    pub fn register_definition(
        &self,
        definition: &AggregateDefinition,
        store: &Store,
        cache: Option<Arc<dyn SourceSetCache>>,
    ) -> anyhow::Result<()> {
        let view = definition.build(store, cache)?;
        let label = (!definition.label.is_empty()).then(|| definition.label.clone());
        self.insert(view, label, definition.description.clone())
    }

    /// Register every definition.
    ///
    /// Fails on the first invalid definition. Returns the number registered.
    pub fn register_definitions(
        &self,
        definitions: &[AggregateDefinition],
        store: &Store,
        cache: Option<Arc<dyn SourceSetCache>>,
    ) -> anyhow::Result<usize> {
        for definition in definitions {
            self.register_definition(definition, store, cache.clone())
                .with_context(|| format!("invalid aggregate '{}'", definition.view_id))?;
        }
        Ok(definitions.len())
    }

    fn insert(
        &self,
        view: AggregateView,
        label: Option<String>,
        description: Option<String>,
    ) -> anyhow::Result<()> {
        let view_id = view.name().to_string();
        if !is_valid_view_id(&view_id) {
            anyhow::bail!("invalid view id '{view_id}'");
        }
        if self.views.contains_key(&view_id) {
            warn!(view_id = %view_id, "replacing registered aggregate");
        }
        info!(view_id = %view_id, shape = view.strategy().name(), "aggregate registered");
        self.views.insert(
            view_id.clone(),
            RegisteredView {
                view: Arc::new(view),
                label: label.unwrap_or(view_id),
                description,
            },
        );
        Ok(())
    }

    pub fn get(&self, view_id: &str) -> Option<Arc<AggregateView>> {
        self.views.get(view_id).map(|entry| Arc::clone(&entry.view))
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Summaries of all views, sorted by id.
    pub fn list(&self) -> Vec<ViewSummary> {
        let mut summaries: Vec<ViewSummary> = self
            .views
            .iter()
            .map(|entry| ViewSummary {
                view_id: entry.key().clone(),
                label: entry.label.clone(),
                description: entry.description.clone(),
                shape: entry.view.strategy().name(),
                paginated: entry.view.settings().pagination.is_some(),
            })
            .collect();
        summaries.sort_by(|a, b| a.view_id.cmp(&b.view_id));
        summaries
    }

    /// Run a view. `None` when the id is unknown.
    pub fn execute(
        &self,
        view_id: &str,
        request: &RequestContext,
    ) -> Option<Result<Value, AggregateError>> {
        let view = self.get(view_id)?;
        Some(view.list(request))
    }
}
