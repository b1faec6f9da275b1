use anyhow::{Context, Result};
use bpaf::Bpaf;
use shoppo_catalog::ProductId;
use shoppo_sdk::models::favorites::{SyncMode, lock_favorites, sync_favorites};
use shoppo_sdk::models::preferences::{FavoritesLayout, Preferences};
use tracing::instrument;

use super::Shoppo;
use crate::utils::message;
use crate::utils::render::{render_favorites, render_json};

#[derive(Bpaf, Clone, Debug)]
pub enum FavoritesCommands {
    /// List favorites, most recently added first
    #[bpaf(command)]
    List {
        /// Display favorites as a JSON array
        #[bpaf(long)]
        json: bool,
    },

    /// Add a product to favorites, or remove it if it is a favorite
    #[bpaf(command)]
    Toggle {
        /// Id of the product in the form '<vendor-id>.<product-id>'
        #[bpaf(positional("product-id"))]
        product_id: String,
    },

    /// Remove all favorites
    #[bpaf(command)]
    Clear,

    /// Fetch current details of favorited products
    #[bpaf(command)]
    Sync {
        /// Refresh all favorites, not only those without details
        #[bpaf(long)]
        all: bool,
    },

    /// Show or set how favorites are listed ('list' or 'grid')
    #[bpaf(command)]
    Layout {
        #[bpaf(positional("layout"))]
        layout: Option<FavoritesLayout>,
    },
}

impl FavoritesCommands {
    #[instrument(name = "favorites", skip_all)]
    pub async fn handle(self, shoppo: Shoppo) -> Result<()> {
        match self {
            FavoritesCommands::List { json } => list(&shoppo, json).await,
            FavoritesCommands::Toggle { product_id } => {
                toggle(&shoppo, ProductId::from(product_id.as_str()))
            },
            FavoritesCommands::Clear => {
                lock_favorites(&shoppo.favorites).remove_all();
                shoppo.save_favorites()?;
                message::deleted("Removed all favorites");
                Ok(())
            },
            FavoritesCommands::Sync { all } => {
                let mode = if all {
                    SyncMode::ReplaceAll
                } else {
                    SyncMode::MissingOnly
                };
                let n_cached = sync_favorites(&shoppo.favorites, &*shoppo.client, mode).await;
                shoppo.save_favorites()?;
                message::updated(format!("Updated details of {n_cached} favorites"));
                Ok(())
            },
            FavoritesCommands::Layout { layout } => set_layout(&shoppo, layout),
        }
    }
}

async fn list(shoppo: &Shoppo, json: bool) -> Result<()> {
    sync_favorites(&shoppo.favorites, &*shoppo.client, SyncMode::MissingOnly).await;
    shoppo.save_favorites()?;

    let preferences =
        Preferences::load(&shoppo.config.data_dir).context("could not read preferences")?;

    let favorites = lock_favorites(&shoppo.favorites);
    if favorites.is_empty() {
        message::plain("You have no favorites yet.");
        return Ok(());
    }

    let products = favorites.merged_favorites(&[]);
    if json {
        println!("{}", render_json(&products)?);
    } else {
        print!(
            "{}",
            render_favorites(&products, preferences.favorites_layout, &favorites)
        );
    }

    let n_missing = favorites.len() - products.len();
    if n_missing > 0 {
        message::warning(format!(
            "Details of {n_missing} favorites could not be loaded"
        ));
    }
    Ok(())
}

fn toggle(shoppo: &Shoppo, id: ProductId) -> Result<()> {
    let added = lock_favorites(&shoppo.favorites).toggle_favorite(&id);
    shoppo.save_favorites()?;

    if added {
        message::updated(format!("Added '{id}' to favorites"));
    } else {
        message::deleted(format!("Removed '{id}' from favorites"));
    }
    Ok(())
}

fn set_layout(shoppo: &Shoppo, layout: Option<FavoritesLayout>) -> Result<()> {
    let data_dir = &shoppo.config.data_dir;
    let mut preferences = Preferences::load(data_dir).context("could not read preferences")?;

    let Some(layout) = layout else {
        println!("{}", preferences.favorites_layout);
        return Ok(());
    };

    preferences.favorites_layout = layout;
    preferences
        .save(data_dir)
        .context("could not save preferences")?;
    message::updated(format!("Favorites are listed as '{layout}'"));
    Ok(())
}
