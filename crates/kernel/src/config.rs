//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cache::{DEFAULT_MAX_CAPACITY, DEFAULT_TTL_SECS};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// Public site URL used to build absolute pagination links
    /// (default: http://localhost:{port}).
    pub site_url: String,

    /// JSON dataset with the tables to serve. When None, the store starts empty.
    pub data_file: Option<PathBuf>,

    /// JSON array of aggregate definitions. When None, no views are registered.
    pub views_file: Option<PathBuf>,

    /// TTL for cached source sets (default: 60 seconds).
    pub source_cache_ttl: Duration,

    /// Maximum number of cached source sets (default: 1000).
    pub source_cache_max_capacity: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let site_url = env::var("SITE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();

        let data_file = env::var("DATA_FILE").ok().map(PathBuf::from);
        let views_file = env::var("VIEWS_FILE").ok().map(PathBuf::from);

        let ttl_secs: u64 = env::var("SOURCE_CACHE_TTL_SECS")
            .unwrap_or_else(|_| DEFAULT_TTL_SECS.to_string())
            .parse()
            .context("SOURCE_CACHE_TTL_SECS must be a valid u64")?;

        let source_cache_max_capacity = env::var("SOURCE_CACHE_MAX_CAPACITY")
            .unwrap_or_else(|_| DEFAULT_MAX_CAPACITY.to_string())
            .parse()
            .context("SOURCE_CACHE_MAX_CAPACITY must be a valid u64")?;

        Ok(Self {
            port,
            site_url,
            data_file,
            views_file,
            source_cache_ttl: Duration::from_secs(ttl_secs),
            source_cache_max_capacity,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            site_url: "http://localhost:3000".to_string(),
            data_file: None,
            views_file: None,
            source_cache_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            source_cache_max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}
