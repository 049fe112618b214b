// Domain types shared by the feed engine components

pub mod controller;
pub mod gesture;
pub mod pagination;

use crate::api::ApiItem;
use crate::content_cache::CacheEntry;
use crate::error::{FeedError, Result};
use std::fmt;
use std::str::FromStr;

/// Stable item identity within a feed session.
///
/// Persisted as its decimal string form in the liked set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(ItemId)
            .map_err(|e| FeedError::InvalidItem(format!("Bad item id {:?}: {}", s, e)))
    }
}

/// A displayable image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub id: ItemId,
    pub title: String,
    pub summary_text: String,
    pub thumbnail_url: Option<String>,
    /// Canonical article URL, when the source provides one
    pub url: Option<String>,
    /// Liked status captured on entry, refreshed from like broadcasts
    pub liked: bool,
}

impl FeedItem {
    /// Validates a raw API payload into a feed item.
    ///
    /// Payloads without an id or title are rejected with `InvalidItem`.
    pub fn from_api(raw: ApiItem) -> Result<Self> {
        let id = raw
            .pageid
            .map(ItemId)
            .ok_or_else(|| FeedError::InvalidItem("Item payload has no id".to_string()))?;

        let title = raw
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FeedError::InvalidItem(format!("Item {} has no title", id)))?;

        let thumbnail_url = raw
            .thumbnail
            .map(|t| t.source)
            .filter(|source| !source.trim().is_empty());

        Ok(FeedItem {
            id,
            title,
            summary_text: raw.extract.unwrap_or_default(),
            thumbnail_url,
            url: raw.fullurl,
            liked: false,
        })
    }

    /// Whether the item can be shown as a card
    pub fn is_displayable(&self) -> bool {
        self.thumbnail_url.is_some()
    }
}

/// Navigation direction of a committed gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards higher indices
    Forward,
    /// Towards index 0
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeedPosition {
    pub current_index: usize,
    /// Signed fraction of the viewport; zero when no drag is active
    pub drag_offset: f32,
}

/// Per-item state handed to the rendering layer
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    /// Content cache entry, `None` until a fetch has been issued
    pub media: Option<CacheEntry>,
    pub liked: bool,
    /// Whether the first media image has finished preloading
    pub preloaded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisibleItem {
    pub index: usize,
    pub item: FeedItem,
    pub render: RenderState,
    pub is_current: bool,
}

/// Read-only snapshot of the feed for one frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedView {
    pub items: Vec<VisibleItem>,
    pub position: FeedPosition,
    /// Total loaded items in the session
    pub total: usize,
    pub loading: bool,
    pub error: Option<String>,
    pub locale: String,
}

impl FeedView {
    pub fn current(&self) -> Option<&VisibleItem> {
        self.items.iter().find(|v| v.is_current)
    }
}
