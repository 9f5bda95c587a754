//! Source set resolution.
//!
//! A view's sources come from a [`SourceSet`]: a fixed list, a function of
//! the request, or a cached wrapper around either. The view re-resolves the
//! set on every request, so the list it holds is never mutated.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use super::error::AggregateError;
use super::types::{RequestContext, Source, SourceDescriptor};

/// Produces the descriptors a request aggregates over.
pub trait SourceSet: Send + Sync {
    fn resolve(&self, request: &RequestContext) -> Result<Vec<SourceDescriptor>, AggregateError>;
}

impl SourceSet for Vec<SourceDescriptor> {
    fn resolve(&self, _request: &RequestContext) -> Result<Vec<SourceDescriptor>, AggregateError> {
        Ok(self.clone())
    }
}

/// Source set computed from the request.
pub struct DynamicSourceSet<F> {
    build: F,
}

impl<F> DynamicSourceSet<F>
where
    F: Fn(&RequestContext) -> Result<Vec<SourceDescriptor>, AggregateError> + Send + Sync,
{
    pub fn new(build: F) -> Self {
        Self { build }
    }
}

impl<F> SourceSet for DynamicSourceSet<F>
where
    F: Fn(&RequestContext) -> Result<Vec<SourceDescriptor>, AggregateError> + Send + Sync,
{
    fn resolve(&self, request: &RequestContext) -> Result<Vec<SourceDescriptor>, AggregateError> {
        (self.build)(request)
    }
}

/// Storage for resolved, materialized source sets.
pub trait SourceSetCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<SourceDescriptor>>;
    fn set(&self, key: &str, descriptors: Vec<SourceDescriptor>);
}

/// Serves a source set from a cache, materializing sources on a miss.
///
/// Cached descriptors hold evaluated rows, so a hit reads no source at
/// all. Entries are keyed by a prefix, the request's path arguments and
/// the values of any query parameters the sources are built from.
pub struct CachedSourceSet {
    prefix: String,
    inner: Arc<dyn SourceSet>,
    cache: Arc<dyn SourceSetCache>,
    query_params: BTreeSet<String>,
}

impl CachedSourceSet {
    pub fn new(
        prefix: impl Into<String>,
        inner: Arc<dyn SourceSet>,
        cache: Arc<dyn SourceSetCache>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
            cache,
            query_params: BTreeSet::new(),
        }
    }

    /// Query parameters that change the resolved sources.
    pub fn with_query_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_params.extend(names.into_iter().map(Into::into));
        self
    }

    fn key(&self, request: &RequestContext) -> String {
        let args: BTreeMap<&String, &String> = request.path_params.iter().collect();
        let mut key = self.prefix.clone();
        for (name, value) in args {
            key.push(':');
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        if !self.query_params.is_empty() {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            for name in &self.query_params {
                // An absent parameter is left out, which differs from an empty one.
                if let Some(value) = request.query_param(name) {
                    query.append_pair(name, value);
                }
            }
            key.push('?');
            key.push_str(&query.finish());
        }
        key
    }
}

impl SourceSet for CachedSourceSet {
    fn resolve(&self, request: &RequestContext) -> Result<Vec<SourceDescriptor>, AggregateError> {
        let key = self.key(request);
        if let Some(descriptors) = self.cache.get(&key) {
            debug!(key = %key, "source set cache hit");
            return Ok(descriptors);
        }

        let descriptors: Vec<SourceDescriptor> = self
            .inner
            .resolve(request)?
            .into_iter()
            .map(|mut descriptor| {
                if let Some(source) = &descriptor.source {
                    let rows: Arc<dyn Source> = Arc::new(source.all());
                    descriptor.source = Some(rows);
                }
                descriptor
            })
            .collect();
        debug!(key = %key, sources = descriptors.len(), "source set cached");
        self.cache.set(&key, descriptors.clone());
        Ok(descriptors)
    }
}
