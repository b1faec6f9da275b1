//! Static informational text served by the catalog.

use std::fmt::Display;
use std::str::FromStr;

use shoppo_catalog::ClientTrait;
use tracing::{debug, warn};

/// The content blocks shown by the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentBlock {
    Intro,
    Faqs,
    Terms,
}

impl ContentBlock {
    /// Id of the block on the content endpoint.
    pub fn content_id(&self) -> u32 {
        match self {
            ContentBlock::Intro => 1,
            ContentBlock::Faqs => 2,
            ContentBlock::Terms => 5,
        }
    }

    /// Text shown when the block can't be loaded.
    pub fn fallback(&self) -> &'static str {
        match self {
            ContentBlock::Intro => {
                "Shop for over 2,000,000 products in 12,000 stores from around New Zealand"
            },
            ContentBlock::Faqs | ContentBlock::Terms => " ",
        }
    }
}

impl Display for ContentBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentBlock::Intro => write!(f, "intro"),
            ContentBlock::Faqs => write!(f, "faqs"),
            ContentBlock::Terms => write!(f, "terms"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown content block '{0}', expected 'intro', 'faqs' or 'terms'")]
pub struct UnknownContentBlock(String);

impl FromStr for ContentBlock {
    type Err = UnknownContentBlock;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intro" => Ok(ContentBlock::Intro),
            "faqs" => Ok(ContentBlock::Faqs),
            "terms" => Ok(ContentBlock::Terms),
            other => Err(UnknownContentBlock(other.to_string())),
        }
    }
}

/// Load the text of `block`, falling back to its default text
/// if the fetch fails or yields no text.
pub async fn load_content(client: &impl ClientTrait, block: ContentBlock) -> String {
    match client.fetch_content(block.content_id()).await {
        Ok(content) if !content.is_empty() => content,
        Ok(_) => {
            debug!(%block, "empty content, using fallback");
            block.fallback().to_string()
        },
        Err(err) => {
            warn!(%err, %block, "could not load content, using fallback");
            block.fallback().to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::utils::test_helpers::CannedClient;

    #[test]
    fn block_names_round_trip() {
        for block in [ContentBlock::Intro, ContentBlock::Faqs, ContentBlock::Terms] {
            assert_eq!(block.to_string().parse::<ContentBlock>().unwrap(), block);
        }
        assert!("about".parse::<ContentBlock>().is_err());
    }

    #[tokio::test]
    async fn loads_fetched_text() {
        let client = CannedClient::default().with_content(2, "Frequently asked");
        assert_eq!(load_content(&client, ContentBlock::Faqs).await, "Frequently asked");
        assert_eq!(client.requests(), vec!["content:2".to_string()]);
    }

    #[tokio::test]
    async fn failure_falls_back() {
        let client = CannedClient::default().failing();
        assert_eq!(
            load_content(&client, ContentBlock::Intro).await,
            ContentBlock::Intro.fallback()
        );
    }

    #[tokio::test]
    async fn empty_text_falls_back() {
        let client = CannedClient::default().with_content(5, "");
        assert_eq!(load_content(&client, ContentBlock::Terms).await, " ");
    }
}
