//! Catalog interaction types.
//!
//! These types mirror the JSON documents served by the catalog API
//! and add the identity rules the rest of the application relies on.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Product identity
// ---------------------------------------------------------------------------

/// Globally unique product identifier of the form `<vendor_id>.<product_id>`.
///
/// Two products with the same id are the same logical product,
/// regardless of differences in their other fields.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Derive the id of a product sold by `vendor_id`.
    pub fn new(vendor_id: impl Display, product_id: impl Display) -> Self {
        ProductId(format!("{vendor_id}.{product_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        ProductId(value.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Products and pages
// ---------------------------------------------------------------------------

/// A product as returned by the catalog.
///
/// Prices are display strings; an empty `sale_price` means "not on sale".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub price: String,
    pub sale_price: String,
    /// Image URL
    pub image: String,
    /// Destination URL on the vendor's site
    pub url: String,
    pub product_id: String,
    pub vendor_id: String,
    pub vendor_name: String,
    pub summary: String,
}

impl Product {
    pub fn id(&self) -> ProductId {
        ProductId::new(&self.vendor_id, &self.product_id)
    }

    pub fn is_on_sale(&self) -> bool {
        !self.sale_price.is_empty()
    }
}

/// One page of catalog results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    pub results: Vec<Product>,
    /// Total number of results across all pages as reported by the server.
    pub total_count: u64,
    /// 1-based page number
    pub page: u32,
    pub per_page: u32,
}

/// Response of the content endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentResponse {
    pub content: String,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// The three mutually exclusive query contexts of a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Arbitrary text search
    #[default]
    FreeText,
    /// "More like this product", keyed by a [ProductId]
    Related,
    /// All products of one vendor, keyed by a vendor id
    Vendor,
}

impl SearchMode {
    /// Name of the query parameter carrying the query text or context id.
    pub fn query_param(&self) -> &'static str {
        match self {
            SearchMode::FreeText => "query",
            SearchMode::Related => "relatedId",
            SearchMode::Vendor => "vendorId",
        }
    }
}

impl Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::FreeText => write!(f, "search"),
            SearchMode::Related => write!(f, "related"),
            SearchMode::Vendor => write!(f, "vendor"),
        }
    }
}

/// Whether a request may be answered from the response cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Freshness {
    #[default]
    Cached,
    /// Bypass the cache and ask intermediaries to do the same.
    ForceFresh,
}
