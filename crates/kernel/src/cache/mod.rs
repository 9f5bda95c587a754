//! In-process cache for resolved source sets (Moka).
//!
//! Entries expire after a fixed TTL, so cached views pick up data changes
//! within that window.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tracing::debug;

use crate::aggregate::{SourceDescriptor, SourceSetCache};

/// Default TTL for cached source sets (60 seconds).
pub const DEFAULT_TTL_SECS: u64 = 60;

/// Default maximum number of cached source sets.
pub const DEFAULT_MAX_CAPACITY: u64 = 1_000;

/// Moka-backed source set cache.
///
/// Cloning is cheap; clones share entries.
#[derive(Clone)]
pub struct MokaSourceSetCache {
    local: Cache<String, Arc<Vec<SourceDescriptor>>>,
}

impl MokaSourceSetCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let local = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { local }
    }

    /// Drop every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let keys: Vec<Arc<String>> = self
            .local
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            self.local.invalidate(key.as_str());
        }
        debug!(prefix = %prefix, "source set cache invalidated");
    }

    pub fn invalidate_all(&self) {
        self.local.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.local.entry_count()
    }
}

impl Default for MokaSourceSetCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CAPACITY, Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

impl SourceSetCache for MokaSourceSetCache {
    fn get(&self, key: &str) -> Option<Vec<SourceDescriptor>> {
        let hit = self.local.get(key)?;
        debug!(key = %key, "source set cache hit");
        Some(hit.as_ref().clone())
    }

    fn set(&self, key: &str, descriptors: Vec<SourceDescriptor>) {
        self.local.insert(key.to_string(), Arc::new(descriptors));
    }
}
