use std::io::Write;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use bpaf::Bpaf;
use indoc::indoc;
use shoppo_catalog::Product;
use shoppo_sdk::models::content::{ContentBlock, load_content};
use shoppo_sdk::models::favorites::lock_favorites;
use shoppo_sdk::models::search::SearchState;
use shoppo_sdk::providers::session::{SearchCommand, SearchSessionHandle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, instrument};

use super::Shoppo;
use crate::commands::search::summary_line;
use crate::utils::message;
use crate::utils::render::DisplayProducts;

const BROWSE_HELP: &str = indoc! {"
    Commands:
      search <text>, s <text>   search products
      more, m                   load the next page of results
      related <n>               products related to result <n>
      vendor <n>                products of the vendor of result <n>
      fav <n>                   add or remove result <n> from favorites
      refresh, r                reload the first page
      back, b                   return to the previous results
      help, ?                   show this help
      quit, q                   leave"
};

// Search interactively
#[derive(Bpaf, Debug, Clone)]
pub struct Browse {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BrowseAction {
    Search(String),
    More,
    Back,
    Refresh,
    Related(usize),
    Vendor(usize),
    Favorite(usize),
    Help,
    Quit,
}

impl FromStr for BrowseAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (word, rest) = match s.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (s, ""),
        };

        let action = match (word, rest) {
            ("search" | "s", "") => bail!("'{word}' needs something to search for"),
            ("search" | "s", text) => BrowseAction::Search(text.to_string()),
            ("more" | "m", "") => BrowseAction::More,
            ("back" | "b", "") => BrowseAction::Back,
            ("refresh" | "r", "") => BrowseAction::Refresh,
            ("related", n) => BrowseAction::Related(parse_index(n)?),
            ("vendor", n) => BrowseAction::Vendor(parse_index(n)?),
            ("fav", n) => BrowseAction::Favorite(parse_index(n)?),
            ("help" | "?", "") => BrowseAction::Help,
            ("quit" | "q" | "exit", "") => BrowseAction::Quit,
            _ => bail!("unknown command '{s}', type 'help' for a list of commands"),
        };
        Ok(action)
    }
}

/// Parse a 1-based result number.
fn parse_index(s: &str) -> Result<usize> {
    match s.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(anyhow!("expected a result number, got '{s}'")),
    }
}

fn result_at(state: &SearchState, n: usize) -> Result<&Product> {
    state
        .results
        .get(n - 1)
        .with_context(|| format!("there is no result {n}"))
}

impl Browse {
    #[instrument(name = "browse", skip_all)]
    pub async fn handle(self, shoppo: Shoppo) -> Result<()> {
        let session = shoppo.spawn_session();

        message::plain(load_content(&*shoppo.client, ContentBlock::Intro).await);
        message::plain(BROWSE_HELP);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        prompt()?;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                prompt()?;
                continue;
            }

            let outcome = match line.parse::<BrowseAction>() {
                Ok(BrowseAction::Quit) => break,
                Ok(action) => step(&shoppo, &session, action).await,
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                message::error(err);
            }
            prompt()?;
        }

        shoppo.save_favorites()
    }
}

fn prompt() -> Result<()> {
    eprint!("> ");
    std::io::stderr().flush()?;
    Ok(())
}

async fn step(shoppo: &Shoppo, session: &SearchSessionHandle, action: BrowseAction) -> Result<()> {
    debug!(?action, "browse action");
    let current = session.snapshot();

    let command = match action {
        BrowseAction::Search(text) => SearchCommand::Search(text),
        BrowseAction::More => {
            if !current.state.has_more_pages {
                message::plain("No more results.");
                return Ok(());
            }
            SearchCommand::LoadNextPage
        },
        BrowseAction::Back => {
            if !current.can_go_back {
                message::plain("Nothing to go back to.");
                return Ok(());
            }
            SearchCommand::GoBack
        },
        BrowseAction::Refresh => SearchCommand::RefreshFirstPage,
        BrowseAction::Related(n) => SearchCommand::SearchRelated(result_at(&current.state, n)?.id()),
        BrowseAction::Vendor(n) => {
            SearchCommand::SearchVendor(result_at(&current.state, n)?.vendor_id.clone())
        },
        BrowseAction::Favorite(n) => {
            let product = result_at(&current.state, n)?;
            toggle_favorite(shoppo, product)?;
            return Ok(());
        },
        BrowseAction::Help => {
            message::plain(BROWSE_HELP);
            return Ok(());
        },
        BrowseAction::Quit => return Ok(()),
    };

    // only a further page extends what is already on screen
    let shown = match command {
        SearchCommand::LoadNextPage => current.state.results.len(),
        _ => 0,
    };

    session.dispatch(command).await?;
    let snapshot = session.settled().await?;
    print_results(shoppo, &snapshot.state, shown);
    Ok(())
}

fn print_results(shoppo: &Shoppo, state: &SearchState, shown: usize) {
    if let Some(err) = &state.last_error {
        message::error(err);
    }
    if state.results.is_empty() {
        message::plain("No products found.");
        return;
    }

    let new_results = state.results.get(shown..).unwrap_or_default();
    print!(
        "{}",
        DisplayProducts::new(new_results, shown, &lock_favorites(&shoppo.favorites))
    );
    message::plain(summary_line(state));
}

fn toggle_favorite(shoppo: &Shoppo, product: &Product) -> Result<()> {
    let added = {
        let mut favorites = lock_favorites(&shoppo.favorites);
        let added = favorites.toggle_favorite(&product.id());
        if added {
            favorites.update_cache([product.clone()]);
        }
        added
    };
    shoppo.save_favorites()?;

    if added {
        message::updated(format!("Added '{}' to favorites", product.name));
    } else {
        message::deleted(format!("Removed '{}' from favorites", product.name));
    }
    Ok(())
}
