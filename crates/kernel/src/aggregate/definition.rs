//! Declarative aggregate definitions.
//!
//! Definitions are plain JSON so views can be configured without code:
//!
//! ```json
//! {
//!   "view_id": "plays_and_poems",
//!   "label": "Plays and poems",
//!   "shape": "flat",
//!   "settings": {"sorting_fields": ["type", "title"]},
//!   "search_fields": ["title"],
//!   "sources": [
//!     {"table": "Play", "fields": ["genre", "title", "year"]},
//!     {"table": "Poem", "fields": ["title", "style"], "label": "poetry"}
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::error::AggregateError;
use super::filter::SearchFilter;
use super::merge::ResultShape;
use super::source_set::{CachedSourceSet, DynamicSourceSet, SourceSet, SourceSetCache};
use super::types::{RequestContext, SourceDescriptor, ViewSettings};
use super::view::AggregateView;
use crate::store::{FieldSerializer, QueryFilter, Store, Table};

/// A view described in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateDefinition {
    /// URL identifier.
    pub view_id: String,

    /// Human-readable name.
    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub shape: ResultShape,

    #[serde(default)]
    pub settings: ViewSettings,

    pub sources: Vec<SourceDefinition>,

    /// Fields searched by the `search` parameter. Empty disables search.
    #[serde(default)]
    pub search_fields: Vec<String>,

    /// Serve the resolved source set from the shared cache.
    #[serde(default)]
    pub cache: bool,
}

/// One source of a declarative view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDefinition {
    /// Table to read.
    pub table: String,

    /// Conditions rows must satisfy.
    #[serde(default)]
    pub filters: Vec<QueryFilter>,

    /// Conditions that drop rows.
    #[serde(default)]
    pub exclude: Vec<QueryFilter>,

    /// Output fields.
    pub fields: FieldSerializer,

    #[serde(default)]
    pub label: Option<String>,
}

impl SourceDefinition {
    fn query_params(&self) -> impl Iterator<Item = &str> {
        self.filters
            .iter()
            .chain(&self.exclude)
            .flat_map(QueryFilter::query_params)
    }

    fn descriptor(&self, table: &Table, request: &RequestContext) -> SourceDescriptor {
        let query = table
            .query()
            .with_filters(self.filters.iter().filter_map(|f| f.resolve(request)))
            .with_excludes(self.exclude.iter().filter_map(|f| f.resolve(request)));
        let mut descriptor = SourceDescriptor::new(query, self.fields.clone());
        descriptor.label = self.label.clone();
        descriptor
    }
}

impl AggregateDefinition {
    /// Check a definition against the store.
    ///
    /// Returns every problem found; empty means valid.
    pub fn validate(&self, store: &Store) -> Vec<String> {
        let mut errors = Vec::new();

        if !is_valid_view_id(&self.view_id) {
            errors.push(format!(
                "View id '{}' must be non-empty and contain only lowercase letters, digits, \
                 underscores and hyphens",
                self.view_id
            ));
        }

        if self.sources.is_empty() {
            errors.push("At least one source is required".to_string());
        }

        if self.settings.sorting_field.is_some() && self.settings.sorting_fields.is_some() {
            errors.push("Only one of sorting_field and sorting_fields may be set".to_string());
        }

        for source in &self.sources {
            if store.table(&source.table).is_none() {
                errors.push(format!("Unknown table '{}'", source.table));
            }
            if source.fields.field_names().next().is_none() {
                errors.push(format!("Source '{}' declares no fields", source.table));
            }
        }

        if self.shape == ResultShape::Grouped {
            for source in &self.sources {
                if source.label.as_deref() == Some("") {
                    errors.push(format!(
                        "Source '{}' has an empty label; grouped views need non-empty labels",
                        source.table
                    ));
                }
            }
        }

        errors
    }

    /// Build a runnable view over the store's tables.
    pub fn build(
        &self,
        store: &Store,
        cache: Option<Arc<dyn SourceSetCache>>,
    ) -> anyhow::Result<AggregateView> {
        let errors = self.validate(store);
        if !errors.is_empty() {
            anyhow::bail!("invalid aggregate '{}': {}", self.view_id, errors.join("; "));
        }

        let sources: Vec<(SourceDefinition, Table)> = self
            .sources
            .iter()
            .map(|source| {
                store
                    .table(&source.table)
                    .map(|table| (source.clone(), table))
                    .with_context(|| format!("unknown table '{}'", source.table))
            })
            .collect::<anyhow::Result<_>>()?;

        let query_params: Vec<String> = self
            .sources
            .iter()
            .flat_map(SourceDefinition::query_params)
            .map(String::from)
            .collect();
        let resolver = DynamicSourceSet::new(
            move |request: &RequestContext| -> Result<Vec<SourceDescriptor>, AggregateError> {
                Ok(sources
                    .iter()
                    .map(|(source, table)| source.descriptor(table, request))
                    .collect())
            },
        );
        let mut source_set: Arc<dyn SourceSet> = Arc::new(resolver);
        if let Some(cache) = cache.filter(|_| self.cache) {
            source_set = Arc::new(
                CachedSourceSet::new(&self.view_id, source_set, cache)
                    .with_query_params(query_params),
            );
        }

        let mut view = AggregateView::new(&self.view_id, self.shape.strategy())
            .with_settings(self.settings.clone())
            .with_source_set(source_set);
        if !self.search_fields.is_empty() {
            view = view.with_filter_backend(Arc::new(SearchFilter::new(
                self.search_fields.iter().cloned(),
            )));
        }
        Ok(view)
    }
}

/// View ids appear in URLs: lowercase ASCII letters, digits, `_` and `-`.
pub fn is_valid_view_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Read a JSON array of definitions from disk.
pub fn load_definitions(path: &Path) -> anyhow::Result<Vec<AggregateDefinition>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read aggregate definitions {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("invalid aggregate definitions in {}", path.display()))
}
