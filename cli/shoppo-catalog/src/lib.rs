//! HTTP client for the Shoppo product catalog API.
//!
//! This crate provides:
//! - Paginated product queries for free text, related product and vendor searches
//! - Bulk product lookups by id and static content blocks
//! - A bounded in-memory response cache honoring `Cache-Control`
//! - The error taxonomy shared by everything that talks to the catalog
//!
//! ## Usage
//!
//! ```ignore
//! use shoppo_catalog::{CatalogClient, CatalogClientConfig, ClientTrait, Freshness, SearchMode};
//!
//! let client = CatalogClient::new(CatalogClientConfig::new("https://www.shoppo.co.nz/app/"))?;
//! let page = client
//!     .fetch_products(SearchMode::FreeText, "shoes", 1, Freshness::Cached)
//!     .await?;
//! ```

mod cache;
mod client;
mod config;
mod error;
mod types;

pub use client::{CatalogClient, ClientTrait};
pub use config::{
    CatalogClientConfig,
    DEFAULT_CACHE_CAPACITY_BYTES,
    DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use error::{CatalogClientError, TransportError};
pub use types::*;
