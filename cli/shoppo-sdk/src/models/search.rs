//! Search and back-navigation state of a browsing session.
//!
//! [SearchController] owns the single live [SearchState] and is the only
//! place that mutates it. Actions return a [FetchTicket] describing the
//! request the caller has to perform; the outcome is handed back through
//! [SearchController::apply]. Keeping the network out of the controller
//! makes every transition synchronous and lets the caller decide where
//! fetches run (see [crate::providers::session]).

use std::collections::HashSet;

use serde::Serialize;
use shoppo_catalog::{
    CatalogClientError,
    ClientTrait,
    Freshness,
    Product,
    ProductId,
    ProductPage,
    SearchMode,
};
use tracing::{debug, warn};

/// A view should request the next page once the visible item is
/// within this many positions of the end of the loaded results.
pub const PREFETCH_MARGIN: usize = 6;
/// Default bound of the back-navigation history.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Identifies one search session,
/// i.e. the span between two mode-changing actions or back navigations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SearchSessionId(u64);

impl SearchSessionId {
    fn next(self) -> Self {
        SearchSessionId(self.0 + 1)
    }
}

/// The published state of a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchState {
    /// Free text of the search field
    pub query: String,
    pub search_mode: SearchMode,
    /// Product id for related searches, vendor id for vendor searches
    pub mode_context_id: Option<String>,
    /// 1-based number of the last requested page,
    /// 0 while the first page has not been loaded
    pub current_page: u32,
    pub has_more_pages: bool,
    pub is_fetching: bool,
    /// Total count reported with the last response
    pub total_result_count: Option<u64>,
    pub results: Vec<Product>,
    /// Whether a fetch of the current session has completed
    pub has_searched: bool,
    /// Display string of the last failed fetch of the current session.
    ///
    /// Purely informational, failures are otherwise silent.
    pub last_error: Option<String>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            query: String::new(),
            search_mode: SearchMode::FreeText,
            mode_context_id: None,
            current_page: 1,
            has_more_pages: true,
            is_fetching: false,
            total_result_count: None,
            results: Vec::new(),
            has_searched: false,
            last_error: None,
        }
    }
}

/// Snapshot taken when a mode-changing action leaves a non-empty result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub results: Vec<Product>,
    /// Text of the search field
    pub query: String,
    /// Free text the results were fetched for
    pub searched_query: String,
    pub search_mode: SearchMode,
    pub mode_context_id: Option<String>,
}

/// How the products of a response are merged into the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Append,
    Replace,
}

/// A fetch requested by the controller.
///
/// The ticket is stamped with the session it was issued in;
/// responses for an earlier session are discarded by [SearchController::apply].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub session: SearchSessionId,
    pub mode: SearchMode,
    pub context_or_query: String,
    pub page: u32,
    pub merge: Merge,
    pub freshness: Freshness,
}

impl FetchTicket {
    /// Perform the request described by this ticket.
    pub async fn fetch(&self, client: &impl ClientTrait) -> Result<ProductPage, CatalogClientError> {
        client
            .fetch_products(self.mode, &self.context_or_query, self.page, self.freshness)
            .await
    }
}

/// What [SearchController::apply] did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Results were merged into the state.
    Applied,
    /// The fetch failed, previously loaded results were kept.
    Failed,
    /// The response belonged to an abandoned session and was dropped.
    Stale,
}

#[derive(Debug)]
pub struct SearchController {
    state: SearchState,
    history: Vec<HistoryEntry>,
    max_history: usize,
    session: SearchSessionId,
    /// Free text the current free text session was started with.
    ///
    /// Pagination keeps using it even if the search field changes.
    pinned_query: String,
}

impl Default for SearchController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl SearchController {
    /// Create a controller keeping at most `max_history` back-navigation entries.
    pub fn new(max_history: usize) -> Self {
        Self {
            state: SearchState::default(),
            history: Vec::new(),
            max_history,
            session: SearchSessionId::default(),
            pinned_query: String::new(),
        }
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn session(&self) -> SearchSessionId {
        self.session
    }

    pub fn can_go_back(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn history_depth(&self) -> usize {
        self.history.len()
    }

    /// Update the text of the search field without starting a search.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.state.query = query.into();
    }

    /// Start a free text search for `query`.
    pub fn search(&mut self, query: impl Into<String>) -> FetchTicket {
        self.begin_session(SearchMode::FreeText, None);
        self.state.query = query.into();
        self.pinned_query = self.state.query.clone();
        self.issue(Merge::Replace, Freshness::Cached)
    }

    /// Start a search for products related to `product_id`.
    pub fn search_related(&mut self, product_id: &ProductId) -> FetchTicket {
        self.begin_session(SearchMode::Related, Some(product_id.to_string()));
        self.issue(Merge::Replace, Freshness::Cached)
    }

    /// Start a search for all products of `vendor_id`.
    pub fn search_vendor(&mut self, vendor_id: impl Into<String>) -> FetchTicket {
        self.begin_session(SearchMode::Vendor, Some(vendor_id.into()));
        self.issue(Merge::Replace, Freshness::Cached)
    }

    /// Request the next page, unless pagination ended or a fetch is in flight.
    pub fn load_next_page(&mut self) -> Option<FetchTicket> {
        if !self.state.has_more_pages || self.state.is_fetching {
            debug!(
                has_more_pages = self.state.has_more_pages,
                is_fetching = self.state.is_fetching,
                "not loading next page"
            );
            return None;
        }
        self.state.current_page += 1;
        Some(self.issue(Merge::Append, Freshness::Cached))
    }

    /// Request the next page if `current_item` is within [PREFETCH_MARGIN]
    /// positions of the end of the results.
    pub fn load_next_page_if_needed(&mut self, current_item: &ProductId) -> Option<FetchTicket> {
        let threshold = self.state.results.len().saturating_sub(PREFETCH_MARGIN);
        let position = self
            .state
            .results
            .iter()
            .position(|product| &product.id() == current_item)?;

        if position >= threshold {
            self.load_next_page()
        } else {
            None
        }
    }

    /// Reload the current search from its first page, bypassing caches.
    pub fn refresh_first_page(&mut self) -> Option<FetchTicket> {
        if self.state.is_fetching {
            return None;
        }
        self.state.current_page = 1;
        self.state.results.clear();
        self.state.total_result_count = None;
        self.state.has_more_pages = true;
        Some(self.issue(Merge::Replace, Freshness::ForceFresh))
    }

    /// Reload the current page only, bypassing caches, and show just that page.
    pub fn refresh_current_page(&mut self) -> Option<FetchTicket> {
        if self.state.is_fetching {
            return None;
        }
        if self.state.current_page == 0 {
            return self.refresh_first_page();
        }
        Some(self.issue(Merge::Replace, Freshness::ForceFresh))
    }

    /// Restore the state before the last mode-changing action.
    ///
    /// Restored results are not paginated further until a new search begins.
    /// Returns `false` if there is no history.
    pub fn go_back(&mut self) -> bool {
        let Some(entry) = self.history.pop() else {
            return false;
        };

        self.session = self.session.next();
        self.pinned_query = entry.searched_query;
        self.state = SearchState {
            query: entry.query,
            search_mode: entry.search_mode,
            mode_context_id: entry.mode_context_id,
            current_page: 1,
            has_more_pages: false,
            is_fetching: false,
            total_result_count: None,
            results: entry.results,
            has_searched: true,
            last_error: None,
        };

        debug!(
            history_depth = self.history.len(),
            "restored previous search, pagination disabled until a new search"
        );
        true
    }

    /// Apply the outcome of the fetch described by `ticket`.
    pub fn apply(
        &mut self,
        ticket: &FetchTicket,
        result: Result<ProductPage, CatalogClientError>,
    ) -> ApplyOutcome {
        if ticket.session != self.session {
            debug!(
                ticket_session = ?ticket.session,
                current_session = ?self.session,
                "discarding response of abandoned search"
            );
            return ApplyOutcome::Stale;
        }

        self.state.is_fetching = false;
        self.state.has_searched = true;

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                warn!(%err, page = ticket.page, mode = %ticket.mode, "catalog fetch failed");
                // the next page request retries the failed page
                match ticket.merge {
                    Merge::Append => self.state.current_page = ticket.page.saturating_sub(1),
                    Merge::Replace if self.state.results.is_empty() => {
                        self.state.current_page = ticket.page.saturating_sub(1);
                    },
                    Merge::Replace => {},
                }
                self.state.last_error = Some(err.to_string());
                return ApplyOutcome::Failed;
            },
        };

        let n_fetched = page.results.len();
        if ticket.merge == Merge::Replace {
            self.state.results.clear();
        }
        extend_unique(&mut self.state.results, page.results);

        self.state.current_page = ticket.page;
        self.state.total_result_count = Some(page.total_count);
        self.state.last_error = None;
        // An empty page ends pagination even if the reported total says otherwise.
        self.state.has_more_pages =
            n_fetched > 0 && (self.state.results.len() as u64) < page.total_count;

        debug!(
            page = ticket.page,
            n_fetched,
            n_results = self.state.results.len(),
            total_count = page.total_count,
            has_more_pages = self.state.has_more_pages,
            "applied product page"
        );
        ApplyOutcome::Applied
    }

    /// Push the current results to the history, reset paging and start a new session.
    fn begin_session(&mut self, mode: SearchMode, mode_context_id: Option<String>) {
        if !self.state.results.is_empty() {
            self.history.push(HistoryEntry {
                results: std::mem::take(&mut self.state.results),
                query: self.state.query.clone(),
                searched_query: self.pinned_query.clone(),
                search_mode: self.state.search_mode,
                mode_context_id: self.state.mode_context_id.clone(),
            });
            if self.history.len() > self.max_history {
                let excess = self.history.len() - self.max_history;
                self.history.drain(..excess);
            }
        }

        self.session = self.session.next();
        self.state.search_mode = mode;
        self.state.mode_context_id = mode_context_id;
        self.state.current_page = 1;
        self.state.results.clear();
        self.state.has_more_pages = true;
        self.state.total_result_count = None;
        self.state.has_searched = false;
        self.state.last_error = None;
    }

    /// Mark a fetch as in flight and describe it.
    fn issue(&mut self, merge: Merge, freshness: Freshness) -> FetchTicket {
        self.state.is_fetching = true;

        let context_or_query = match self.state.search_mode {
            SearchMode::FreeText => self.pinned_query.clone(),
            SearchMode::Related | SearchMode::Vendor => {
                self.state.mode_context_id.clone().unwrap_or_default()
            },
        };

        let ticket = FetchTicket {
            session: self.session,
            mode: self.state.search_mode,
            context_or_query,
            page: self.state.current_page,
            merge,
            freshness,
        };
        debug!(?ticket, "issuing catalog fetch");
        ticket
    }
}

/// Append `products` to `results`, skipping ids that are already present.
fn extend_unique(results: &mut Vec<Product>, products: Vec<Product>) {
    let mut seen = results.iter().map(Product::id).collect::<HashSet<_>>();
    results.extend(products.into_iter().filter(|product| seen.insert(product.id())));
}
