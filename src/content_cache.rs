//! Per-item media memoization with single-flight fetches
//!
//! Each id owns one watch channel. The first caller to claim an absent (or
//! failed) id becomes the owner and runs the fetch; everyone else waits on
//! the channel and observes the same result. Entries live until
//! [`ContentCache::clear`].

use crate::domain::{ItemId, MediaRef};
use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub state: FetchState,
    /// Zero to three media, best first
    pub media: Vec<MediaRef>,
    pub error: Option<String>,
}

impl CacheEntry {
    fn pending() -> Self {
        Self {
            state: FetchState::Pending,
            media: Vec::new(),
            error: None,
        }
    }

    fn ready(media: Vec<MediaRef>) -> Self {
        Self {
            state: FetchState::Ready,
            media,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            state: FetchState::Failed,
            media: Vec::new(),
            error: Some(error.into()),
        }
    }
}

type Slot = Arc<watch::Sender<CacheEntry>>;

/// Result of claiming an id
#[derive(Debug)]
pub enum Claim {
    /// Already cached
    Ready(CacheEntry),
    /// Another caller owns the fetch; wait on the receiver
    InFlight(watch::Receiver<CacheEntry>),
    /// The caller must run the fetch and complete the ticket
    Owner(FetchTicket),
}

/// Exclusive right to fetch one id. Dropping it uncompleted marks the
/// entry failed so waiters are released.
#[derive(Debug)]
pub struct FetchTicket {
    id: ItemId,
    slot: Slot,
    completed: bool,
}

impl FetchTicket {
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Publishes the fetch result to the cache and all waiters
    pub fn complete(mut self, result: Result<Vec<MediaRef>>) -> CacheEntry {
        let entry = match result {
            Ok(media) => CacheEntry::ready(media),
            Err(e) => {
                warn!(id = %self.id, error = %e, "media fetch failed");
                CacheEntry::failed(e.to_string())
            }
        };
        self.completed = true;
        self.slot.send_replace(entry.clone());
        entry
    }
}

impl Drop for FetchTicket {
    fn drop(&mut self) {
        if !self.completed {
            self.slot
                .send_replace(CacheEntry::failed("fetch abandoned before completion"));
        }
    }
}

#[derive(Debug, Default)]
pub struct ContentCache {
    slots: Mutex<HashMap<ItemId, Slot>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ItemId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: ItemId) -> Option<CacheEntry> {
        self.slots().get(&id).map(|slot| slot.borrow().clone())
    }

    /// Atomically decides who fetches `id`.
    ///
    /// Absent and failed ids hand out an owner ticket and flip to pending in
    /// the same step, so at most one fetch per id is ever in flight.
    pub fn claim(&self, id: ItemId) -> Claim {
        let mut slots = self.slots();

        if let Some(slot) = slots.get(&id) {
            let entry = slot.borrow().clone();
            match entry.state {
                FetchState::Ready => return Claim::Ready(entry),
                FetchState::Pending => return Claim::InFlight(slot.subscribe()),
                FetchState::Failed => {
                    debug!(%id, "retrying failed media fetch");
                    slot.send_replace(CacheEntry::pending());
                    return Claim::Owner(FetchTicket {
                        id,
                        slot: Arc::clone(slot),
                        completed: false,
                    });
                }
            }
        }

        let (tx, _rx) = watch::channel(CacheEntry::pending());
        let slot = Arc::new(tx);
        slots.insert(id, Arc::clone(&slot));
        Claim::Owner(FetchTicket {
            id,
            slot,
            completed: false,
        })
    }

    /// Returns the cached entry, or runs `fetch` if this caller wins the
    /// claim, or waits for the caller that did.
    pub async fn fetch_if_absent<F, Fut>(&self, id: ItemId, fetch: F) -> CacheEntry
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<MediaRef>>>,
    {
        match self.claim(id) {
            Claim::Ready(entry) => entry,
            Claim::InFlight(rx) => wait_settled(rx).await,
            Claim::Owner(ticket) => {
                debug!(%id, "media fetch started");
                let result = fetch().await;
                ticket.complete(result)
            }
        }
    }

    /// Drops every entry. In-flight owners complete into the detached slot.
    pub fn clear(&self) {
        self.slots().clear();
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

/// Waits until the entry leaves `Pending`
pub async fn wait_settled(mut rx: watch::Receiver<CacheEntry>) -> CacheEntry {
    match rx.wait_for(|entry| entry.state != FetchState::Pending).await {
        Ok(entry) => entry.clone(),
        Err(_) => CacheEntry::failed("fetch owner went away"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn media(url: &str) -> MediaRef {
        MediaRef {
            url: url.to_string(),
            alt: String::new(),
        }
    }

    #[test]
    fn test_new_cache_is_empty() {
        let cache = ContentCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.get(ItemId(1)), None);
    }

    #[test]
    fn test_claim_marks_pending() {
        let cache = ContentCache::new();
        let claim = cache.claim(ItemId(1));
        assert!(matches!(claim, Claim::Owner(_)));
        assert_eq!(cache.get(ItemId(1)).unwrap().state, FetchState::Pending);
        assert!(matches!(cache.claim(ItemId(1)), Claim::InFlight(_)));
        drop(claim);
    }

    #[test]
    fn test_dropped_ticket_marks_failed() {
        let cache = ContentCache::new();
        if let Claim::Owner(ticket) = cache.claim(ItemId(4)) {
            drop(ticket);
        }
        assert_eq!(cache.get(ItemId(4)).unwrap().state, FetchState::Failed);
    }

    #[tokio::test]
    async fn test_fetch_if_absent_memoizes() {
        let cache = ContentCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let entry = cache
                .fetch_if_absent(ItemId(1), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![media("a.jpg")])
                })
                .await;
            assert_eq!(entry.state, FetchState::Ready);
            assert_eq!(entry.media, vec![media("a.jpg")]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = Arc::new(ContentCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .fetch_if_absent(ItemId(9), || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(vec![media("one.jpg"), media("two.jpg")])
                        })
                        .await
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|entry| *entry == results[0]));
        assert_eq!(results[0].state, FetchState::Ready);
    }

    #[tokio::test]
    async fn test_failure_is_cached_but_retryable() {
        let cache = ContentCache::new();

        let failed = cache
            .fetch_if_absent(ItemId(2), || async {
                Err(FeedError::TransientFetch("timeout".to_string()))
            })
            .await;
        assert_eq!(failed.state, FetchState::Failed);
        assert!(failed.error.unwrap().contains("timeout"));
        assert_eq!(cache.get(ItemId(2)).unwrap().state, FetchState::Failed);

        let retried = cache
            .fetch_if_absent(ItemId(2), || async { Ok(vec![media("b.jpg")]) })
            .await;
        assert_eq!(retried.state, FetchState::Ready);
    }

    #[tokio::test]
    async fn test_waiters_observe_failure() {
        let cache = ContentCache::new();
        let Claim::Owner(ticket) = cache.claim(ItemId(3)) else {
            panic!("expected owner");
        };
        let Claim::InFlight(rx) = cache.claim(ItemId(3)) else {
            panic!("expected in-flight");
        };

        ticket.complete(Err(FeedError::TransientFetch("down".to_string())));
        let entry = wait_settled(rx).await;
        assert_eq!(entry.state, FetchState::Failed);
    }

    #[tokio::test]
    async fn test_clear_detaches_in_flight_owner() {
        let cache = ContentCache::new();
        let Claim::Owner(ticket) = cache.claim(ItemId(5)) else {
            panic!("expected owner");
        };

        cache.clear();
        assert!(cache.is_empty());

        ticket.complete(Ok(vec![media("late.jpg")]));
        assert_eq!(cache.get(ItemId(5)), None);
    }
}
