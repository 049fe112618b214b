//! Feedswipe - an endless, swipeable feed of random articles
//!
//! This crate provides the feed engine (pagination, media prefetching,
//! gesture resolution and liked-state synchronization) plus the terminal
//! front-end built on top of it.

pub mod api;
pub mod cli;
pub mod config;
pub mod content_cache;
pub mod domain;
pub mod error;
pub mod likes;
pub mod opener;
pub mod prefetch;
pub mod preview;
pub mod tui;

// Re-export primary types for convenience
pub use api::{ContentApi, ImageFetcher, WikipediaApi};
pub use config::FeedConfig;
pub use content_cache::{CacheEntry, ContentCache, FetchState};
pub use domain::controller::FeedController;
pub use domain::gesture::{GestureOutcome, GestureTracker};
pub use domain::pagination::{MoreOutcome, PaginationSource, PaginationStats};
pub use domain::{Direction, FeedItem, FeedPosition, FeedView, ItemId, MediaRef, VisibleItem};
pub use error::{FeedError, Result};
pub use likes::{JsonLikedStore, LikeBus, LikeEvent, LikedStore, MemoryLikedStore, Subscription};
pub use opener::open_article;
