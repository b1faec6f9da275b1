//! Configuration types for catalog client construction.

use std::collections::BTreeMap;
use std::time::Duration;

/// Upper bound for the in-memory response cache, in bytes of response bodies.
pub const DEFAULT_CACHE_CAPACITY_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for catalog client construction.
#[derive(Debug, Clone)]
pub struct CatalogClientConfig {
    /// Base URL for the catalog API.
    ///
    /// Searches are sent to the base URL itself,
    /// content blocks to `<base>/content`.
    pub catalog_url: String,
    /// Additional headers to include in requests.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional `User-Agent` header value.
    pub user_agent: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Capacity of the response cache in bytes. `0` disables caching.
    pub cache_capacity_bytes: usize,
}

impl CatalogClientConfig {
    /// Create a configuration for `catalog_url` with default timeouts and cache size.
    pub fn new(catalog_url: impl Into<String>) -> Self {
        Self {
            catalog_url: catalog_url.into(),
            extra_headers: BTreeMap::new(),
            user_agent: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cache_capacity_bytes: DEFAULT_CACHE_CAPACITY_BYTES,
        }
    }
}
