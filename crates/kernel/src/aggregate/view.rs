//! Aggregate views: the per-request pipeline.
//!
//! `list` resolves the source set, loads each source (filter backends,
//! per-source filter, pagination), transforms and merges the rows, sorts
//! flat results, formats them and finally wraps them in the pagination
//! envelope when a page was produced.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::error::AggregateError;
use super::filter::FilterBackend;
use super::format::{HtmlEnvelope, ResultFormatter};
use super::merge::{FlatMerge, GroupedMerge, MergeStrategy, MergedResult};
use super::pagination::{Paginator, paginator_from_settings};
use super::sort::SortSpec;
use super::source_set::SourceSet;
use super::types::{RequestContext, Source, SourceDescriptor, ViewSettings};
use crate::store::QuerySet;

/// Builds a fresh paginator for each request.
pub type PaginatorFactory = Arc<dyn Fn() -> Box<dyn Paginator> + Send + Sync>;

/// One source after filtering and pagination.
#[derive(Debug)]
pub struct LoadedSource {
    pub rows: QuerySet,
    pub paginated: bool,
}

/// A configured aggregation endpoint.
pub struct AggregateView {
    name: String,
    strategy: Arc<dyn MergeStrategy>,
    settings: ViewSettings,
    source_set: Option<Arc<dyn SourceSet>>,
    filter_backends: Vec<Arc<dyn FilterBackend>>,
    formatter: Arc<dyn ResultFormatter>,
    paginator_factory: Option<PaginatorFactory>,
}

impl AggregateView {
    /// View with an explicit merge strategy and no sources.
    pub fn new(name: impl Into<String>, strategy: Arc<dyn MergeStrategy>) -> Self {
        Self {
            name: name.into(),
            strategy,
            settings: ViewSettings::default(),
            source_set: None,
            filter_backends: Vec::new(),
            formatter: Arc::new(HtmlEnvelope),
            paginator_factory: None,
        }
    }

    /// View producing one flat, labelled list.
    pub fn flat(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(FlatMerge))
    }

    /// View producing records grouped by label.
    pub fn grouped(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(GroupedMerge))
    }

    /// Use a fixed list of sources.
    pub fn with_sources(self, sources: Vec<SourceDescriptor>) -> Self {
        self.with_source_set(Arc::new(sources))
    }

    pub fn with_source_set(mut self, source_set: Arc<dyn SourceSet>) -> Self {
        self.source_set = Some(source_set);
        self
    }

    pub fn with_settings(mut self, settings: ViewSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_filter_backend(mut self, backend: Arc<dyn FilterBackend>) -> Self {
        self.filter_backends.push(backend);
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn ResultFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Use a custom paginator instead of the one the settings describe.
    pub fn with_paginator<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Paginator> + Send + Sync + 'static,
    {
        self.paginator_factory = Some(Arc::new(factory));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    pub fn strategy(&self) -> &dyn MergeStrategy {
        self.strategy.as_ref()
    }

    /// Resolve this request's source descriptors.
    pub fn source_set(
        &self,
        request: &RequestContext,
    ) -> Result<Vec<SourceDescriptor>, AggregateError> {
        let source_set = self.source_set.as_ref().ok_or_else(|| {
            AggregateError::configuration(
                &self.name,
                "should either declare sources or provide a source set resolver",
            )
        })?;
        source_set.resolve(request)
    }

    fn paginator(&self) -> Option<Box<dyn Paginator>> {
        if let Some(factory) = &self.paginator_factory {
            return Some(factory());
        }
        self.settings.pagination.as_ref().map(paginator_from_settings)
    }

    /// Filter and paginate one source.
    pub fn load_source(
        &self,
        descriptor: &SourceDescriptor,
        source: &dyn Source,
        request: &RequestContext,
        paginator: Option<&mut (dyn Paginator + '_)>,
    ) -> Result<LoadedSource, AggregateError> {
        let mut rows = source.all();
        for backend in &self.filter_backends {
            rows = backend.filter_rows(rows, request)?;
        }
        if let Some(filter_fn) = &descriptor.filter_fn {
            rows = filter_fn(rows, request)?;
        }

        let page = paginator.and_then(|p| p.paginate(&rows, request));
        Ok(match page {
            Some(page) => LoadedSource {
                rows: page,
                paginated: true,
            },
            None => LoadedSource {
                rows,
                paginated: false,
            },
        })
    }

    /// Run the full pipeline for one request.
    pub fn list(&self, request: &RequestContext) -> Result<Value, AggregateError> {
        let sort = SortSpec::resolve(&self.settings, request, &self.name)?;
        if !sort.is_empty() {
            debug!(view = %self.name, keys = ?sort.keys(), "sort resolved");
        }
        let descriptors = self.source_set(request)?;
        for descriptor in &descriptors {
            descriptor.require(&self.name)?;
        }

        let mut paginator = self.paginator();
        let mut results = self.strategy.empty_results();
        let mut paginated = false;

        for descriptor in &descriptors {
            let (source, transform) = descriptor.require(&self.name)?;
            let loaded =
                self.load_source(descriptor, source.as_ref(), request, paginator.as_deref_mut())?;
            paginated = loaded.paginated;

            let data = transform.transform(&loaded.rows, request)?;
            let label = self
                .strategy
                .resolve_label(descriptor, source.kind(), &self.settings);
            debug!(
                view = %self.name,
                kind = %source.kind(),
                label = ?label,
                records = data.len(),
                paginated = loaded.paginated,
                "source loaded"
            );
            results = self
                .strategy
                .add_to_results(data, label.as_deref(), results)
                .map_err(|e| match e {
                    AggregateError::Validation(message) => {
                        AggregateError::Validation(format!("{}: {message}", self.name))
                    }
                    other => other,
                })?;
        }

        let value = match results {
            MergedResult::Flat(mut records)
                if self.strategy.supports_sorting() && !sort.is_empty() =>
            {
                sort.apply(&mut records)?;
                MergedResult::Flat(records).into_value()
            }
            other => other.into_value(),
        };

        let formatted = self.formatter.format(value, request)?;
        match paginator.as_deref_mut() {
            Some(paginator) if paginated => paginator.format_response(formatted, &self.name),
            _ => Ok(formatted),
        }
    }
}

impl fmt::Debug for AggregateView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateView")
            .field("name", &self.name)
            .field("strategy", &self.strategy.name())
            .field("settings", &self.settings)
            .field("filter_backends", &self.filter_backends)
            .finish_non_exhaustive()
    }
}
