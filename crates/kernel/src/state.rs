//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::aggregate::{AggregateRegistry, SourceSetCache, load_definitions};
use crate::cache::MokaSourceSetCache;
use crate::config::Config;
use crate::store::Store;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Base URL for absolute links, without trailing slash.
    site_url: String,

    /// Tables served by declarative views.
    store: Arc<Store>,

    /// Views reachable under /api/aggregate.
    registry: AggregateRegistry,

    /// Cache for views declared with `"cache": true`.
    source_cache: MokaSourceSetCache,
}

impl AppState {
    /// Load the dataset and view definitions named by the configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let store = match &config.data_file {
            Some(path) => Store::load(path).context("failed to load dataset")?,
            None => Store::new(),
        };
        let source_cache =
            MokaSourceSetCache::new(config.source_cache_max_capacity, config.source_cache_ttl);

        let registry = AggregateRegistry::new();
        if let Some(path) = &config.views_file {
            let definitions = load_definitions(path).context("failed to load views")?;
            let cache: Arc<dyn SourceSetCache> = Arc::new(source_cache.clone());
            let registered = registry.register_definitions(&definitions, &store, Some(cache))?;
            info!(
                registered,
                declared = definitions.len(),
                "aggregate definitions loaded"
            );
        }

        Ok(Self::from_parts(config, store, registry, source_cache))
    }

    /// Assemble state from prepared parts.
    pub fn from_parts(
        config: &Config,
        store: Store,
        registry: AggregateRegistry,
        source_cache: MokaSourceSetCache,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                site_url: config.site_url.trim_end_matches('/').to_string(),
                store: Arc::new(store),
                registry,
                source_cache,
            }),
        }
    }

    pub fn site_url(&self) -> &str {
        &self.inner.site_url
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.inner.store
    }

    pub fn registry(&self) -> &AggregateRegistry {
        &self.inner.registry
    }

    pub fn source_cache(&self) -> &MokaSourceSetCache {
        &self.inner.source_cache
    }
}
