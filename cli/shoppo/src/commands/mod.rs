mod browse;
mod content;
mod favorites;
mod search;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use bpaf::Bpaf;
use indoc::indoc;
use shoppo_catalog::CatalogClient;
use shoppo_sdk::models::favorites::{FavoritesStore, SharedFavorites, lock_favorites};
use shoppo_sdk::models::search::SearchController;
use shoppo_sdk::providers::session::{SearchSession, SearchSessionHandle};
use tracing::debug;

use crate::config::Config;
use crate::utils::init::init_catalog_client;

static SHOPPO_DESCRIPTION: &str = indoc! {"
    Shoppo searches products from stores around New Zealand.

    Search by text, find products related to one you like or browse
    everything a vendor sells, and keep a list of favorites."
};

fn vec_len<T>(x: Vec<T>) -> usize {
    Vec::len(&x)
}

#[derive(Bpaf, Clone, Copy, Debug)]
pub enum Verbosity {
    Verbose(
        /// Increase logging verbosity
        ///
        /// Invoke multiple times for increasing detail.
        #[bpaf(short('v'), long("verbose"), req_flag(()), many, map(vec_len))]
        usize,
    ),

    /// Silence logs except for errors
    #[bpaf(short, long)]
    Quiet,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Verbose(0)
    }
}

#[derive(Bpaf)]
#[bpaf(options, descr(SHOPPO_DESCRIPTION))]
pub struct ShoppoCli(#[bpaf(external(shoppo_args))] pub ShoppoArgs);

/// Main shoppo args parser
///
/// To parse the shoppo CLI, use [`ShoppoCli`] instead using [`shoppo_cli()`].
#[derive(Debug, Bpaf)]
#[bpaf(ignore_rustdoc)]
pub struct ShoppoArgs {
    #[bpaf(external, fallback(Default::default()))]
    pub verbosity: Verbosity,

    #[bpaf(external(commands))]
    command: Commands,
}

/// Shared context of all commands.
pub struct Shoppo {
    pub config: Config,
    pub client: Arc<CatalogClient>,
    pub favorites: SharedFavorites,
}

impl Shoppo {
    fn new(config: Config) -> Result<Self> {
        let client = init_catalog_client(&config)?;
        let favorites = FavoritesStore::load(&config.data_dir).context("could not read favorites")?;
        debug!(n_favorites = favorites.len(), "loaded favorites");

        Ok(Self {
            config,
            client: Arc::new(client),
            favorites: Arc::new(Mutex::new(favorites)),
        })
    }

    /// Start a search session that caches fetched favorites.
    pub fn spawn_session(&self) -> SearchSessionHandle {
        SearchSession::new(
            Arc::clone(&self.client),
            SearchController::new(self.config.max_history),
        )
        .with_favorites(Arc::clone(&self.favorites))
        .spawn()
    }

    pub fn save_favorites(&self) -> Result<()> {
        lock_favorites(&self.favorites)
            .save()
            .context("could not save favorites")
    }
}

impl ShoppoArgs {
    pub async fn handle(self, config: Config) -> Result<()> {
        let shoppo = Shoppo::new(config)?;

        match self.command {
            Commands::Search(args) => args.handle(shoppo).await,
            Commands::Related(args) => args.handle(shoppo).await,
            Commands::Vendor(args) => args.handle(shoppo).await,
            Commands::Browse(args) => args.handle(shoppo).await,
            Commands::Favorites(args) => args.handle(shoppo).await,
            Commands::Content(args) => args.handle(shoppo).await,
        }
    }
}

#[derive(Bpaf, Clone, Debug)]
enum Commands {
    /// Search products by text
    #[bpaf(command)]
    Search(#[bpaf(external(search::search))] search::Search),

    /// Show products related to a product
    #[bpaf(command)]
    Related(#[bpaf(external(search::related))] search::Related),

    /// Show the products of a vendor
    #[bpaf(command)]
    Vendor(#[bpaf(external(search::vendor))] search::Vendor),

    /// Search interactively
    #[bpaf(command)]
    Browse(#[bpaf(external(browse::browse))] browse::Browse),

    /// Manage favorite products
    #[bpaf(command)]
    Favorites(#[bpaf(external(favorites::favorites_commands))] favorites::FavoritesCommands),

    /// Show informational text
    #[bpaf(command)]
    Content(#[bpaf(external(content::content))] content::Content),
}
