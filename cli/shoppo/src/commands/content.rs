use anyhow::Result;
use bpaf::Bpaf;
use shoppo_sdk::models::content::{ContentBlock, load_content};
use tracing::instrument;

use super::Shoppo;

// Show informational text
#[derive(Bpaf, Clone, Debug)]
pub struct Content {
    /// Which text to show: 'intro', 'faqs' or 'terms'
    #[bpaf(positional("block"))]
    pub block: ContentBlock,
}

impl Content {
    #[instrument(name = "content", skip_all, fields(block = %self.block))]
    pub async fn handle(self, shoppo: Shoppo) -> Result<()> {
        println!("{}", load_content(&*shoppo.client, self.block).await);
        Ok(())
    }
}
