// Opens articles in the system browser

use crate::domain::FeedItem;
use crate::error::{FeedError, Result};
use tracing::info;

/// Opens the item's canonical URL without waiting for the browser
pub fn open_article(item: &FeedItem) -> Result<()> {
    let url = article_url(item)?;
    info!(id = %item.id, %url, "opening article");
    open::that_detached(url)?;
    Ok(())
}

fn article_url(item: &FeedItem) -> Result<&str> {
    item.url
        .as_deref()
        .filter(|url| url.starts_with("https://") || url.starts_with("http://"))
        .ok_or_else(|| FeedError::InvalidItem(format!("Item {} has no article URL", item.id)))
}
