//! A search session running as a single task.
//!
//! The task owns the [SearchController] and is the only writer of its state.
//! Commands from views and completions of fetches arrive over one channel
//! and are applied in arrival order. Fetches run as separate tasks that post
//! their result back into that channel, so a slow response can never
//! interleave with newer state. Views observe the state through a
//! [watch] channel.

use std::sync::Arc;

use serde::Serialize;
use shoppo_catalog::{CatalogClientError, ClientTrait, ProductId, ProductPage};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{oneshot, watch};
use tracing::{debug, trace};

use crate::models::favorites::{SharedFavorites, lock_favorites};
use crate::models::search::{ApplyOutcome, FetchTicket, SearchController, SearchState};

/// Actions a view can request from a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCommand {
    Search(String),
    SearchRelated(ProductId),
    SearchVendor(String),
    /// Edit the search field without searching
    SetQuery(String),
    LoadNextPage,
    /// The view shows the given product, load more results if it is near the end
    LoadNextPageIfNeeded(ProductId),
    RefreshFirstPage,
    RefreshCurrentPage,
    GoBack,
}

/// Published state of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchSnapshot {
    pub state: SearchState,
    pub can_go_back: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("search session has ended")]
    Closed,
}

enum Message {
    Command {
        command: SearchCommand,
        ack: oneshot::Sender<()>,
    },
    Completed {
        ticket: FetchTicket,
        result: Result<ProductPage, CatalogClientError>,
    },
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Command { command, .. } => f.debug_tuple("Command").field(command).finish(),
            Message::Completed { ticket, result } => f
                .debug_struct("Completed")
                .field("ticket", ticket)
                .field("ok", &result.is_ok())
                .finish(),
        }
    }
}

pub struct SearchSession<C> {
    client: Arc<C>,
    controller: SearchController,
    favorites: Option<SharedFavorites>,
}

impl<C> SearchSession<C>
where
    C: ClientTrait + 'static,
{
    pub fn new(client: Arc<C>, controller: SearchController) -> Self {
        Self {
            client,
            controller,
            favorites: None,
        }
    }

    /// Offer every fetched page to the cache of `favorites`.
    pub fn with_favorites(mut self, favorites: SharedFavorites) -> Self {
        self.favorites = Some(favorites);
        self
    }

    /// Start the session task on the current tokio runtime.
    ///
    /// The task ends once all handles are dropped and no fetch is in flight.
    pub fn spawn(self) -> SearchSessionHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (state_sender, state) = watch::channel(self.snapshot());

        tokio::spawn(self.run(receiver, sender.downgrade(), state_sender));

        SearchSessionHandle { sender, state }
    }

    fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            state: self.controller.state().clone(),
            can_go_back: self.controller.can_go_back(),
        }
    }

    async fn run(
        mut self,
        mut receiver: UnboundedReceiver<Message>,
        sender: WeakUnboundedSender<Message>,
        state: watch::Sender<SearchSnapshot>,
    ) {
        while let Some(message) = receiver.recv().await {
            match message {
                Message::Command { command, ack } => {
                    if let Some(ticket) = self.handle_command(command) {
                        self.start_fetch(ticket, &sender);
                    }
                    state.send_replace(self.snapshot());
                    // the dispatcher may have stopped waiting
                    let _ = ack.send(());
                },
                Message::Completed { ticket, result } => {
                    self.offer_to_favorites(&result);
                    if self.controller.apply(&ticket, result) != ApplyOutcome::Stale {
                        state.send_replace(self.snapshot());
                    }
                },
            }
        }
        debug!("search session ended");
    }

    fn handle_command(&mut self, command: SearchCommand) -> Option<FetchTicket> {
        trace!(?command, "handling search command");
        let controller = &mut self.controller;
        match command {
            SearchCommand::Search(query) => Some(controller.search(query)),
            SearchCommand::SearchRelated(product_id) => Some(controller.search_related(&product_id)),
            SearchCommand::SearchVendor(vendor_id) => Some(controller.search_vendor(vendor_id)),
            SearchCommand::SetQuery(query) => {
                controller.set_query(query);
                None
            },
            SearchCommand::LoadNextPage => controller.load_next_page(),
            SearchCommand::LoadNextPageIfNeeded(product_id) => {
                controller.load_next_page_if_needed(&product_id)
            },
            SearchCommand::RefreshFirstPage => controller.refresh_first_page(),
            SearchCommand::RefreshCurrentPage => controller.refresh_current_page(),
            SearchCommand::GoBack => {
                controller.go_back();
                None
            },
        }
    }

    fn start_fetch(&self, ticket: FetchTicket, sender: &WeakUnboundedSender<Message>) {
        let Some(sender) = sender.upgrade() else {
            debug!(?ticket, "session is shutting down, not fetching");
            return;
        };
        let client = Arc::clone(&self.client);

        tokio::spawn(async move {
            let result = ticket.fetch(&*client).await;
            // the session is gone if sending fails, nothing is left to update
            let _ = sender.send(Message::Completed { ticket, result });
        });
    }

    fn offer_to_favorites(&self, result: &Result<ProductPage, CatalogClientError>) {
        let (Some(favorites), Ok(page)) = (&self.favorites, result) else {
            return;
        };
        let n_cached = lock_favorites(favorites).cache_favorited(&page.results);
        if n_cached > 0 {
            debug!(n_cached, "cached fetched favorites");
        }
    }
}

/// Handle to a running [SearchSession].
#[derive(Debug, Clone)]
pub struct SearchSessionHandle {
    sender: UnboundedSender<Message>,
    state: watch::Receiver<SearchSnapshot>,
}

impl SearchSessionHandle {
    /// Send `command` to the session.
    ///
    /// Returns once the command has been applied to the published state.
    /// Fetches it started may still be in flight, see [Self::settled].
    pub async fn dispatch(&self, command: SearchCommand) -> Result<(), SessionError> {
        let (ack, acked) = oneshot::channel();
        self.sender
            .send(Message::Command { command, ack })
            .map_err(|_| SessionError::Closed)?;
        acked.await.map_err(|_| SessionError::Closed)
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.state.clone()
    }

    /// Wait until the current search has no fetch in flight.
    pub async fn settled(&self) -> Result<SearchSnapshot, SessionError> {
        let mut state = self.state.clone();
        let snapshot = state
            .wait_for(|snapshot| !snapshot.state.is_fetching)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(snapshot.clone())
    }
}
