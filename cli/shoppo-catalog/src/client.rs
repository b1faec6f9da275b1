//! Catalog client issuing the search, lookup and content requests.

use std::fmt::Debug;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use itertools::Itertools;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace};
use url::Url;

use crate::cache::{CachedResponse, Lookup, ResponseCache};
use crate::config::CatalogClientConfig;
use crate::error::{CatalogClientError, TransportError};
use crate::types::*;

/// Path of the content endpoint relative to the catalog URL.
const CONTENT_PATH: &str = "content";
/// Query parameter of bulk product lookups.
const PRODUCT_IDS_PARAM: &str = "ids";
const PAGE_PARAM: &str = "page";
/// Number of bytes of an undecodable body included in debug logs.
const RAW_BODY_LOG_LIMIT: usize = 300;

/// A client for the catalog service.
///
/// Handles:
/// - HTTP client configuration with timeouts and extra headers
/// - Building the query parameters of each request kind
/// - Serving GET responses from a bounded in-memory cache
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: Url,
    config: CatalogClientConfig,
    cache: Mutex<ResponseCache>,
}

impl Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("catalog_url", &self.config.catalog_url)
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    /// Create a new catalog client from configuration.
    pub fn new(config: CatalogClientConfig) -> Result<Self, CatalogClientError> {
        let base_url = parse_base_url(&config.catalog_url)?;
        let client = build_http_client(&config)?;
        let cache = Mutex::new(ResponseCache::new(config.cache_capacity_bytes));

        Ok(Self {
            client,
            base_url,
            config,
            cache,
        })
    }

    fn cache(&self) -> MutexGuard<'_, ResponseCache> {
        // The cache holds no invariants a panicking writer could break halfway.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn url_with_params<'a>(
        &self,
        path: Option<&str>,
        params: impl IntoIterator<Item = (&'a str, String)>,
    ) -> Result<Url, CatalogClientError> {
        let mut url = match path {
            Some(path) => self.base_url.join(path).map_err(|e| {
                CatalogClientError::MalformedRequest(format!("invalid path '{path}': {e}"))
            })?,
            None => self.base_url.clone(),
        };
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (key, value) in params {
                pairs.append_pair(key, &value);
            }
        }
        Ok(url)
    }

    /// GET `url` and decode the body as JSON.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        freshness: Freshness,
    ) -> Result<T, CatalogClientError> {
        let body = self.get_bytes(url, freshness).await?;
        serde_json::from_slice(&body).map_err(|err| {
            let raw = String::from_utf8_lossy(&body[..body.len().min(RAW_BODY_LOG_LIMIT)]);
            debug!(%err, %raw, "could not decode catalog response");
            CatalogClientError::DecodeFailure(err)
        })
    }

    /// GET `url`, consulting and updating the response cache.
    async fn get_bytes(&self, url: Url, freshness: Freshness) -> Result<Vec<u8>, CatalogClientError> {
        let key = url.to_string();
        let mut request = self.client.get(url);
        let mut stale_body = None;

        match freshness {
            Freshness::ForceFresh => {
                request = request.header(header::CACHE_CONTROL, "no-cache");
            },
            Freshness::Cached => {
                let lookup = self.cache().lookup(&key, Instant::now());
                match lookup {
                    Lookup::Fresh(body) => {
                        debug!(url = %key, "serving catalog response from cache");
                        return Ok(body);
                    },
                    Lookup::Stale { body, validators } => {
                        trace!(url = %key, "revalidating cached catalog response");
                        request = request.headers(validators);
                        stale_body = Some(body);
                    },
                    Lookup::Miss => {},
                }
            },
        }

        debug!(url = %key, ?freshness, "sending catalog request");
        let response = request.send().await.map_err(TransportError::Network)?;
        let status = response.status();
        debug!(url = %key, %status, "received catalog response");

        if status == StatusCode::NOT_MODIFIED {
            if let Some(body) = stale_body {
                self.cache().refresh(&key, response.headers(), Instant::now());
                return Ok(body);
            }
        }

        if !status.is_success() {
            return Err(TransportError::Status(status).into());
        }

        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(TransportError::Network)?
            .to_vec();

        match CachedResponse::from_response(&headers, body.clone(), Instant::now()) {
            Some(entry) => self.cache().insert(key, entry),
            None => self.cache().remove(&key),
        }

        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Catalog trait
// ---------------------------------------------------------------------------

/// The catalog API interface.
///
/// This trait enables alternate implementations:
/// - **HTTP**: requests to the catalog API via [`CatalogClient`]
/// - **Canned**: in-process responses for controller and session tests
///
/// Futures are `Send` so that fetches can run on spawned tasks.
pub trait ClientTrait: Send + Sync {
    /// Fetch one page of products for a search.
    ///
    /// `context_or_query` is the free text for [SearchMode::FreeText],
    /// a product id for [SearchMode::Related] and a vendor id for [SearchMode::Vendor].
    /// `page` is 1-based.
    fn fetch_products(
        &self,
        mode: SearchMode,
        context_or_query: &str,
        page: u32,
        freshness: Freshness,
    ) -> impl Future<Output = Result<ProductPage, CatalogClientError>> + Send;

    /// Fetch the current details of the given products.
    fn fetch_products_by_id(
        &self,
        ids: &[ProductId],
    ) -> impl Future<Output = Result<ProductPage, CatalogClientError>> + Send;

    /// Fetch the text of a static content block.
    fn fetch_content(
        &self,
        content_id: u32,
    ) -> impl Future<Output = Result<String, CatalogClientError>> + Send;
}

impl ClientTrait for CatalogClient {
    #[instrument(skip(self, context_or_query), fields(mode = %mode, context_or_query = %context_or_query))]
    async fn fetch_products(
        &self,
        mode: SearchMode,
        context_or_query: &str,
        page: u32,
        freshness: Freshness,
    ) -> Result<ProductPage, CatalogClientError> {
        let params = product_query_params(mode, context_or_query, page)?;
        let url = self.url_with_params(None, params)?;

        let products: ProductPage = self.get_json(url, freshness).await?;

        debug!(
            n_results = products.results.len(),
            total_count = products.total_count,
            "received product page"
        );
        Ok(products)
    }

    #[instrument(skip_all, fields(n_ids = ids.len()))]
    async fn fetch_products_by_id(
        &self,
        ids: &[ProductId],
    ) -> Result<ProductPage, CatalogClientError> {
        if ids.is_empty() {
            return Err(CatalogClientError::MalformedRequest(
                "product lookup without ids".to_string(),
            ));
        }
        let ids_csv = ids.iter().map(ProductId::as_str).join(",");
        let url = self.url_with_params(None, [(PRODUCT_IDS_PARAM, ids_csv)])?;
        self.get_json(url, Freshness::Cached).await
    }

    #[instrument(skip(self))]
    async fn fetch_content(&self, content_id: u32) -> Result<String, CatalogClientError> {
        let url = self.url_with_params(Some(CONTENT_PATH), [("id", content_id.to_string())])?;
        let response: ContentResponse = self.get_json(url, Freshness::Cached).await?;
        Ok(response.content)
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Build the query parameters of a product search.
///
/// Exactly one mode parameter is sent together with the page.
fn product_query_params(
    mode: SearchMode,
    context_or_query: &str,
    page: u32,
) -> Result<Vec<(&'static str, String)>, CatalogClientError> {
    if page == 0 {
        return Err(CatalogClientError::MalformedRequest(
            "pages are numbered from 1".to_string(),
        ));
    }

    match mode {
        SearchMode::FreeText => {},
        SearchMode::Related | SearchMode::Vendor if context_or_query.trim().is_empty() => {
            return Err(CatalogClientError::MalformedRequest(format!(
                "{mode} search without a context id"
            )));
        },
        SearchMode::Related | SearchMode::Vendor => {},
    }

    Ok(vec![
        (mode.query_param(), context_or_query.to_string()),
        (PAGE_PARAM, page.to_string()),
    ])
}

/// Parse the catalog URL, making sure it ends with a slash
/// so that relative paths are resolved below it.
fn parse_base_url(catalog_url: &str) -> Result<Url, CatalogClientError> {
    let normalized = if catalog_url.ends_with('/') {
        catalog_url.to_string()
    } else {
        format!("{catalog_url}/")
    };
    Url::parse(&normalized).map_err(|e| {
        CatalogClientError::Configuration(format!("invalid catalog url '{catalog_url}': {e}"))
    })
}

// ---------------------------------------------------------------------------
// HTTP client builder
// ---------------------------------------------------------------------------

/// Build the HTTP client used for all catalog requests.
fn build_http_client(config: &CatalogClientConfig) -> Result<reqwest::Client, CatalogClientError> {
    let mut headers = HeaderMap::new();

    for (key, value) in &config.extra_headers {
        headers.insert(
            header::HeaderName::from_str(key).map_err(
                |e: reqwest::header::InvalidHeaderName| {
                    CatalogClientError::Configuration(e.to_string())
                },
            )?,
            header::HeaderValue::from_str(value).map_err(
                |e: reqwest::header::InvalidHeaderValue| {
                    CatalogClientError::Configuration(e.to_string())
                },
            )?,
        );
    }

    debug!(
        catalog_url = %config.catalog_url,
        extra_headers = config.extra_headers.len(),
        cache_capacity_bytes = config.cache_capacity_bytes,
        "building catalog HTTP client"
    );

    let client_builder = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout);

    let client_builder = if let Some(ref user_agent) = config.user_agent {
        client_builder.user_agent(user_agent)
    } else {
        client_builder
    };

    client_builder
        .build()
        .map_err(|e| CatalogClientError::Configuration(e.to_string()))
}
