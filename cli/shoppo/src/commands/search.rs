use anyhow::Result;
use bpaf::Bpaf;
use shoppo_catalog::ProductId;
use shoppo_sdk::models::favorites::lock_favorites;
use shoppo_sdk::models::search::SearchState;
use shoppo_sdk::providers::session::SearchCommand;
use tracing::{debug, instrument};

use super::Shoppo;
use crate::utils::message;
use crate::utils::render::{DisplayProducts, render_json};

#[derive(Debug, Bpaf, Clone)]
pub struct ResultOptions {
    /// Display results as a JSON array
    #[bpaf(long)]
    pub json: bool,

    /// Number of result pages to load
    #[bpaf(long, argument("N"), fallback(1))]
    pub pages: u32,
}

// Search for products by text
#[derive(Debug, Bpaf, Clone)]
pub struct Search {
    #[bpaf(external(result_options))]
    pub options: ResultOptions,

    /// The text to search for
    #[bpaf(positional("query"))]
    pub query: String,
}

impl Search {
    #[instrument(name = "search", skip_all, fields(query = %self.query))]
    pub async fn handle(self, shoppo: Shoppo) -> Result<()> {
        run_search(&shoppo, SearchCommand::Search(self.query), &self.options).await
    }
}

// Show products related to a product
#[derive(Debug, Bpaf, Clone)]
pub struct Related {
    #[bpaf(external(result_options))]
    pub options: ResultOptions,

    /// Id of the product in the form '<vendor-id>.<product-id>'
    #[bpaf(positional("product-id"))]
    pub product_id: String,
}

impl Related {
    #[instrument(name = "related", skip_all, fields(product_id = %self.product_id))]
    pub async fn handle(self, shoppo: Shoppo) -> Result<()> {
        let product_id = ProductId::from(self.product_id.as_str());
        run_search(&shoppo, SearchCommand::SearchRelated(product_id), &self.options).await
    }
}

// Show the products of a vendor
#[derive(Debug, Bpaf, Clone)]
pub struct Vendor {
    #[bpaf(external(result_options))]
    pub options: ResultOptions,

    #[bpaf(positional("vendor-id"))]
    pub vendor_id: String,
}

impl Vendor {
    #[instrument(name = "vendor", skip_all, fields(vendor_id = %self.vendor_id))]
    pub async fn handle(self, shoppo: Shoppo) -> Result<()> {
        run_search(&shoppo, SearchCommand::SearchVendor(self.vendor_id), &self.options).await
    }
}

/// Run one search, load up to `options.pages` pages and print the results.
async fn run_search(shoppo: &Shoppo, command: SearchCommand, options: &ResultOptions) -> Result<()> {
    let session = shoppo.spawn_session();

    session.dispatch(command).await?;
    let mut snapshot = session.settled().await?;

    for _ in 1..options.pages {
        if !snapshot.state.has_more_pages {
            debug!("no more pages to load");
            break;
        }
        session.dispatch(SearchCommand::LoadNextPage).await?;
        snapshot = session.settled().await?;
    }

    // the session cached details of favorited products it has seen
    shoppo.save_favorites()?;

    let results = &snapshot.state.results;
    if options.json {
        println!("{}", render_json(results)?);
        return Ok(());
    }

    if results.is_empty() {
        message::plain("No products found.");
        return Ok(());
    }

    print!(
        "{}",
        DisplayProducts::new(results, 0, &lock_favorites(&shoppo.favorites))
    );
    message::plain(summary_line(&snapshot.state));
    Ok(())
}

/// How many of the available results are shown.
pub(crate) fn summary_line(state: &SearchState) -> String {
    let shown = state.results.len();
    match state.total_result_count {
        Some(total) if state.has_more_pages => format!("Showing {shown} of {total} products."),
        _ => format!("Showing {shown} products."),
    }
}
