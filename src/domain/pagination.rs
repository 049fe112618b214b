use super::{FeedItem, ItemId};
use crate::api::ContentApi;
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::likes::LikeBus;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Counters kept for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationStats {
    pub batches_started: u64,
    pub batches_failed: u64,
    pub items_appended: u64,
    pub items_rejected: u64,
}

/// What a `more` call did to the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoreOutcome {
    Appended(usize),
    /// Another batch was already outstanding; nothing was requested
    AlreadyLoading,
    /// The session was reset while the batch was in flight
    Discarded,
}

/// Right to run the one outstanding batch of a session generation
#[must_use = "a claimed batch must be run or pagination stays blocked"]
#[derive(Debug)]
pub struct PageTicket {
    generation: u64,
}

#[derive(Debug, Default)]
struct PageState {
    items: Vec<FeedItem>,
    ids: HashSet<ItemId>,
    generation: u64,
    in_flight: Option<u64>,
    error: Option<String>,
    consecutive_failures: u32,
    next_attempt_at: Option<Instant>,
    stats: PaginationStats,
}

/// Items gathered by one batch loop
struct Batch {
    items: Vec<FeedItem>,
    rejected: u64,
    error: Option<FeedError>,
}

/// Owns the ordered item sequence of a feed session
pub struct PaginationSource {
    api: Arc<dyn ContentApi>,
    likes: LikeBus,
    batch_size: usize,
    max_attempts_per_item: usize,
    retry_backoff: Duration,
    state: Mutex<PageState>,
    loading: watch::Sender<bool>,
}

impl PaginationSource {
    pub fn new(api: Arc<dyn ContentApi>, likes: LikeBus, config: &FeedConfig) -> Self {
        let (loading, _) = watch::channel(false);
        Self {
            api,
            likes,
            batch_size: config.batch_size,
            max_attempts_per_item: config.max_random_attempts_per_item.max(1),
            retry_backoff: config.retry_backoff(),
            state: Mutex::new(PageState::default()),
            loading,
        }
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the single batch slot. `None` while a batch is outstanding.
    pub fn try_begin(&self) -> Option<PageTicket> {
        let mut state = self.state();
        if state.in_flight.is_some() {
            return None;
        }

        state.in_flight = Some(state.generation);
        state.stats.batches_started += 1;
        self.loading.send_replace(true);
        Some(PageTicket {
            generation: state.generation,
        })
    }

    /// Fetches one batch and appends the usable, unseen items in order
    pub async fn more(&self, locale: &str) -> Result<MoreOutcome> {
        match self.try_begin() {
            Some(ticket) => self.run(ticket, locale).await,
            None => {
                debug!("more() ignored, batch already outstanding");
                Ok(MoreOutcome::AlreadyLoading)
            }
        }
    }

    /// Runs a batch claimed with [`try_begin`](Self::try_begin)
    pub async fn run(&self, ticket: PageTicket, locale: &str) -> Result<MoreOutcome> {
        let known = self.state().ids.clone();
        debug!(locale, generation = ticket.generation, "page fetch started");
        let batch = self.fetch_batch(locale, &known).await;
        self.finish(ticket, batch)
    }

    async fn fetch_batch(&self, locale: &str, known: &HashSet<ItemId>) -> Batch {
        let max_attempts = self.batch_size.saturating_mul(self.max_attempts_per_item);
        let mut batch = Batch {
            items: Vec::with_capacity(self.batch_size),
            rejected: 0,
            error: None,
        };
        let mut seen = HashSet::new();
        let mut attempts = 0;
        let mut retried = false;

        while batch.items.len() < self.batch_size && attempts < max_attempts {
            attempts += 1;

            let raw = match self.api.random_item(locale).await {
                Ok(raw) => {
                    retried = false;
                    raw
                }
                Err(e) if e.is_transient() && !retried => {
                    retried = true;
                    warn!(
                        error = %e,
                        backoff_ms = self.retry_backoff.as_millis() as u64,
                        "page fetch failed, retrying once"
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                    continue;
                }
                Err(e) if e.is_transient() => {
                    batch.error = Some(e);
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "dropping unusable payload");
                    batch.rejected += 1;
                    continue;
                }
            };

            match FeedItem::from_api(raw) {
                Ok(item) if !item.is_displayable() => {
                    debug!(id = %item.id, "dropping item without thumbnail");
                    batch.rejected += 1;
                }
                Ok(item) if known.contains(&item.id) || !seen.insert(item.id) => {
                    debug!(id = %item.id, "dropping duplicate item");
                    batch.rejected += 1;
                }
                Ok(item) => batch.items.push(item),
                Err(e) => {
                    debug!(error = %e, "dropping invalid item");
                    batch.rejected += 1;
                }
            }
        }

        batch
    }

    fn finish(&self, ticket: PageTicket, batch: Batch) -> Result<MoreOutcome> {
        let mut state = self.state();
        if state.generation != ticket.generation {
            debug!(
                generation = ticket.generation,
                "discarding batch from previous session"
            );
            return Ok(MoreOutcome::Discarded);
        }

        state.in_flight = None;
        state.stats.items_rejected += batch.rejected;

        let mut appended = 0;
        for mut item in batch.items {
            if !state.ids.insert(item.id) {
                continue;
            }
            item.liked = self.likes.is_liked(item.id);
            state.items.push(item);
            appended += 1;
        }
        state.stats.items_appended += appended as u64;

        let outcome = match batch.error {
            Some(e) => {
                state.consecutive_failures += 1;
                state.stats.batches_failed += 1;
                state.error = Some(e.to_string());
                state.next_attempt_at = Some(Instant::now() + self.retry_backoff);
                warn!(
                    failures = state.consecutive_failures,
                    appended,
                    error = %e,
                    "page fetch failed after retry"
                );
                Err(e)
            }
            None if appended == 0 => {
                state.next_attempt_at = Some(Instant::now() + self.retry_backoff);
                warn!("batch produced no usable items");
                Ok(MoreOutcome::Appended(0))
            }
            None => {
                if state.error.take().is_some() {
                    info!("feed error cleared");
                }
                state.consecutive_failures = 0;
                state.next_attempt_at = None;
                info!(appended, total = state.items.len(), "page appended");
                Ok(MoreOutcome::Appended(appended))
            }
        };

        drop(state);
        self.loading.send_replace(false);
        outcome
    }

    /// Refreshes the liked flag of a loaded item
    pub fn set_liked(&self, id: ItemId, liked: bool) {
        let mut state = self.state();
        if let Some(item) = state.items.iter_mut().find(|item| item.id == id) {
            item.liked = liked;
        }
    }

    /// Drops the whole sequence. Outstanding batches complete into nothing.
    pub fn reset(&self) {
        let mut state = self.state();
        let generation = state.generation + 1;
        let stats = state.stats;
        *state = PageState {
            generation,
            stats,
            ..PageState::default()
        };
        drop(state);
        self.loading.send_replace(false);
        info!(generation, "pagination session reset");
    }

    /// Resolves once no batch is outstanding
    pub async fn wait_idle(&self) {
        let mut rx = self.loading.subscribe();
        let _ = rx.wait_for(|loading| !*loading).await;
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    pub fn items(&self) -> Vec<FeedItem> {
        self.state().items.clone()
    }

    /// Clones only the items in `range`, clamped to the sequence
    pub fn items_in(&self, range: Range<usize>) -> Vec<FeedItem> {
        let state = self.state();
        let end = range.end.min(state.items.len());
        let start = range.start.min(end);
        state.items[start..end].to_vec()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state().consecutive_failures
    }

    /// True while the backoff after a failed or empty batch is running
    pub fn is_cooling_down(&self) -> bool {
        self.state()
            .next_attempt_at
            .map_or(false, |at| Instant::now() < at)
    }

    pub fn stats(&self) -> PaginationStats {
        self.state().stats
    }
}

impl std::fmt::Debug for PaginationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("PaginationSource")
            .field("items", &state.items.len())
            .field("generation", &state.generation)
            .field("in_flight", &state.in_flight.is_some())
            .field("error", &state.error)
            .finish()
    }
}
