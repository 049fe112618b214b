//! Liked-set persistence and the like synchronization bus
//!
//! The persisted set is the only source of truth for "liked". Every surface
//! reads it through [`LikeBus::is_liked`] and learns about changes by
//! subscribing; all mutation goes through [`LikeBus::toggle`].

use crate::domain::ItemId;
use crate::error::{FeedError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Externally owned set of liked ids
pub trait LikedStore: Send + Sync {
    fn contains(&self, id: &str) -> Result<bool>;
    fn insert(&self, id: &str) -> Result<()>;
    fn remove(&self, id: &str) -> Result<()>;
    fn all(&self) -> Result<Vec<String>>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory store, used in tests and when no file store can be opened
#[derive(Debug, Default)]
pub struct MemoryLikedStore {
    ids: Mutex<BTreeSet<String>>,
}

impl MemoryLikedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LikedStore for MemoryLikedStore {
    fn contains(&self, id: &str) -> Result<bool> {
        Ok(lock(&self.ids).contains(id))
    }

    fn insert(&self, id: &str) -> Result<()> {
        lock(&self.ids).insert(id.to_string());
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        lock(&self.ids).remove(id);
        Ok(())
    }

    fn all(&self) -> Result<Vec<String>> {
        Ok(lock(&self.ids).iter().cloned().collect())
    }
}

/// On-disk layout: one slot holding the string-encoded ids
#[derive(Debug, Default, Serialize, Deserialize)]
struct LikedFile {
    #[serde(rename = "likedItems", default)]
    liked_items: Vec<String>,
}

/// JSON-file store, written through on every mutation
#[derive(Debug)]
pub struct JsonLikedStore {
    path: PathBuf,
    ids: Mutex<BTreeSet<String>>,
}

impl JsonLikedStore {
    /// Default location (~/.local/share/feedswipe/liked.json)
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("feedswipe").join("liked.json"))
    }

    /// Opens the store, starting empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ids = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| FeedError::Store(format!("Failed to read liked set: {}", e)))?;
            let file: LikedFile = serde_json::from_str(&contents)
                .map_err(|e| FeedError::Store(format!("Failed to parse liked set: {}", e)))?;
            file.liked_items.into_iter().collect()
        } else {
            BTreeSet::new()
        };

        Ok(Self {
            path,
            ids: Mutex::new(ids),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a sibling temp file and renames it over the store, so a
    /// crash mid-write leaves the previous file intact
    fn persist(&self, ids: &BTreeSet<String>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .map_err(|e| FeedError::Store(format!("Failed to create store directory: {}", e)))?;

        let file = LikedFile {
            liked_items: ids.iter().cloned().collect(),
        };
        let contents = serde_json::to_string_pretty(&file)
            .map_err(|e| FeedError::Store(format!("Failed to serialize liked set: {}", e)))?;

        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|e| FeedError::Store(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(contents.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| FeedError::Store(format!("Failed to write liked set: {}", e)))?;
        temp.persist(&self.path)
            .map_err(|e| FeedError::Store(format!("Failed to replace liked set: {}", e.error)))?;
        Ok(())
    }

    /// Applies `change` and persists; the in-memory set is untouched if the write fails
    fn mutate(&self, change: impl FnOnce(&mut BTreeSet<String>)) -> Result<()> {
        let mut ids = lock(&self.ids);
        let mut next = ids.clone();
        change(&mut next);
        self.persist(&next)?;
        *ids = next;
        Ok(())
    }
}

impl LikedStore for JsonLikedStore {
    fn contains(&self, id: &str) -> Result<bool> {
        Ok(lock(&self.ids).contains(id))
    }

    fn insert(&self, id: &str) -> Result<()> {
        self.mutate(|ids| {
            ids.insert(id.to_string());
        })
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.mutate(|ids| {
            ids.remove(id);
        })
    }

    fn all(&self) -> Result<Vec<String>> {
        Ok(lock(&self.ids).iter().cloned().collect())
    }
}

/// A liked-state change delivered to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeEvent {
    pub id: ItemId,
    pub liked: bool,
}

type Handler = Arc<dyn Fn(&LikeEvent) + Send + Sync>;

struct BusInner {
    store: Box<dyn LikedStore>,
    /// Serializes toggles so store mutation and broadcast happen as one step
    toggle_lock: Mutex<()>,
    subscribers: Mutex<Vec<(u64, Handler)>>,
    next_subscriber: AtomicU64,
}

/// Publish/subscribe hub for liked state. Cheap to clone.
#[derive(Clone)]
pub struct LikeBus {
    inner: Arc<BusInner>,
}

impl LikeBus {
    pub fn new(store: impl LikedStore + 'static) -> Self {
        Self {
            inner: Arc::new(BusInner {
                store: Box::new(store),
                toggle_lock: Mutex::new(()),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(0),
            }),
        }
    }

    /// Bus over an in-memory store
    pub fn in_memory() -> Self {
        Self::new(MemoryLikedStore::new())
    }

    /// Store errors read as "not liked"
    pub fn is_liked(&self, id: ItemId) -> bool {
        self.inner
            .store
            .contains(&id.to_string())
            .unwrap_or_else(|e| {
                warn!(%id, error = %e, "liked store unavailable");
                false
            })
    }

    /// Flips `id` in the persisted set, then broadcasts the new state to
    /// every current subscriber before returning.
    ///
    /// Handlers run while the toggle is held and must not call `toggle`.
    /// On a store error nothing is broadcast.
    pub fn toggle(&self, id: ItemId) -> Result<bool> {
        let _toggle = lock(&self.inner.toggle_lock);
        let key = id.to_string();

        let liked = !self.inner.store.contains(&key)?;
        if liked {
            self.inner.store.insert(&key)?;
        } else {
            self.inner.store.remove(&key)?;
        }

        let handlers: Vec<Handler> = lock(&self.inner.subscribers)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        let event = LikeEvent { id, liked };
        for handler in &handlers {
            handler(&event);
        }

        info!(%id, liked, subscribers = handlers.len(), "like toggled");
        Ok(liked)
    }

    /// All liked ids, skipping entries that are not numeric
    pub fn liked_ids(&self) -> Vec<ItemId> {
        match self.inner.store.all() {
            Ok(ids) => ids.iter().filter_map(|s| s.parse().ok()).collect(),
            Err(e) => {
                warn!(error = %e, "liked store unavailable");
                Vec::new()
            }
        }
    }

    /// Registers a handler until the returned subscription is dropped or
    /// explicitly unsubscribed.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&LikeEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.subscribers).push((id, Arc::new(handler)));
        debug!(subscriber = id, "like subscriber registered");

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }
}

impl std::fmt::Debug for LikeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LikeBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle for a registered like handler
#[must_use = "dropping a subscription unsubscribes it"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            lock(&bus.subscribers).retain(|(id, _)| *id != self.id);
            debug!(subscriber = self.id, "like subscriber removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Store whose every call fails
    struct BrokenStore;

    impl LikedStore for BrokenStore {
        fn contains(&self, _id: &str) -> Result<bool> {
            Err(FeedError::Store("unavailable".to_string()))
        }
        fn insert(&self, _id: &str) -> Result<()> {
            Err(FeedError::Store("unavailable".to_string()))
        }
        fn remove(&self, _id: &str) -> Result<()> {
            Err(FeedError::Store("unavailable".to_string()))
        }
        fn all(&self) -> Result<Vec<String>> {
            Err(FeedError::Store("unavailable".to_string()))
        }
    }

    fn recorder(bus: &LikeBus) -> (Arc<Mutex<Vec<LikeEvent>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let sub = bus.subscribe(move |event| sink.lock().unwrap().push(*event));
        (events, sub)
    }

    mod bus_tests {
        use super::*;

        #[test]
        fn test_toggle_parity() {
            let bus = LikeBus::in_memory();
            let id = ItemId(5);

            for n in 1..=7 {
                let liked = bus.toggle(id).unwrap();
                assert_eq!(liked, n % 2 == 1);
                assert_eq!(bus.is_liked(id), n % 2 == 1);
            }
        }

        #[test]
        fn test_every_subscriber_sees_every_toggle_in_order() {
            let bus = LikeBus::in_memory();
            let (first, _sub1) = recorder(&bus);
            let (second, _sub2) = recorder(&bus);

            bus.toggle(ItemId(1)).unwrap();
            bus.toggle(ItemId(1)).unwrap();
            bus.toggle(ItemId(1)).unwrap();

            let expected = vec![
                LikeEvent { id: ItemId(1), liked: true },
                LikeEvent { id: ItemId(1), liked: false },
                LikeEvent { id: ItemId(1), liked: true },
            ];
            assert_eq!(*first.lock().unwrap(), expected);
            assert_eq!(*second.lock().unwrap(), expected);
        }

        #[test]
        fn test_double_toggle_restores_state_with_two_broadcasts() {
            let bus = LikeBus::in_memory();
            let (events, _sub) = recorder(&bus);
            let before = bus.is_liked(ItemId(42));

            bus.toggle(ItemId(42)).unwrap();
            bus.toggle(ItemId(42)).unwrap();

            assert_eq!(bus.is_liked(ItemId(42)), before);
            assert_eq!(events.lock().unwrap().len(), 2);
        }

        #[test]
        fn test_broadcast_happens_before_toggle_returns() {
            let bus = LikeBus::in_memory();
            let reader = bus.clone();
            let observed = Arc::new(Mutex::new(None));
            let sink = Arc::clone(&observed);
            let _sub = bus.subscribe(move |event| {
                // The store is already updated when handlers run
                *sink.lock().unwrap() = Some(reader.is_liked(event.id));
            });

            bus.toggle(ItemId(9)).unwrap();
            assert_eq!(*observed.lock().unwrap(), Some(true));
        }

        #[test]
        fn test_unsubscribe_stops_delivery() {
            let bus = LikeBus::in_memory();
            let (events, sub) = recorder(&bus);
            assert_eq!(bus.subscriber_count(), 1);

            bus.toggle(ItemId(1)).unwrap();
            sub.unsubscribe();
            assert_eq!(bus.subscriber_count(), 0);
            bus.toggle(ItemId(1)).unwrap();

            assert_eq!(events.lock().unwrap().len(), 1);
        }

        #[test]
        fn test_dropping_subscription_unsubscribes() {
            let bus = LikeBus::in_memory();
            {
                let (_events, _sub) = recorder(&bus);
                assert_eq!(bus.subscriber_count(), 1);
            }
            assert_eq!(bus.subscriber_count(), 0);
        }

        #[test]
        fn test_subscription_outliving_bus_is_harmless() {
            let bus = LikeBus::in_memory();
            let (_events, sub) = recorder(&bus);
            drop(bus);
            drop(sub);
        }

        #[test]
        fn test_liked_ids() {
            let bus = LikeBus::in_memory();
            bus.toggle(ItemId(3)).unwrap();
            bus.toggle(ItemId(1)).unwrap();
            let mut ids = bus.liked_ids();
            ids.sort();
            assert_eq!(ids, vec![ItemId(1), ItemId(3)]);
        }

        #[test]
        fn test_broken_store_degrades() {
            let bus = LikeBus::new(BrokenStore);
            let (events, _sub) = recorder(&bus);

            assert!(!bus.is_liked(ItemId(1)));
            assert!(matches!(bus.toggle(ItemId(1)), Err(FeedError::Store(_))));
            assert!(bus.liked_ids().is_empty());
            assert!(events.lock().unwrap().is_empty());
        }
    }

    mod json_store_tests {
        use super::*;

        #[test]
        fn test_json_store_persists_across_reopen() {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("data").join("liked.json");

            {
                let store = JsonLikedStore::open(&path).unwrap();
                store.insert("10").unwrap();
                store.insert("20").unwrap();
                store.remove("10").unwrap();
            }

            let reopened = JsonLikedStore::open(&path).unwrap();
            assert!(reopened.contains("20").unwrap());
            assert!(!reopened.contains("10").unwrap());
            assert_eq!(reopened.all().unwrap(), vec!["20".to_string()]);
        }

        #[test]
        fn test_json_store_layout() {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("liked.json");
            let store = JsonLikedStore::open(&path).unwrap();
            store.insert("42").unwrap();

            let contents = fs::read_to_string(&path).unwrap();
            let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
            assert_eq!(value["likedItems"], serde_json::json!(["42"]));
        }

        #[test]
        fn test_json_store_replaces_file_without_leftovers() {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("liked.json");
            let store = JsonLikedStore::open(&path).unwrap();
            for id in ["1", "2", "3"] {
                store.insert(id).unwrap();
            }

            let names: Vec<_> = fs::read_dir(temp_dir.path())
                .unwrap()
                .map(|entry| entry.unwrap().file_name())
                .collect();
            assert_eq!(names, vec![std::ffi::OsString::from("liked.json")]);
        }

        #[test]
        fn test_failed_replace_keeps_memory_and_disk_state() {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("liked.json");
            let store = JsonLikedStore::open(&path).unwrap();

            // A non-empty directory at the target makes the rename fail
            fs::create_dir(&path).unwrap();
            fs::write(path.join("keep"), "x").unwrap();

            assert!(matches!(store.insert("9"), Err(FeedError::Store(_))));
            assert!(!store.contains("9").unwrap());
            assert_eq!(fs::read_to_string(path.join("keep")).unwrap(), "x");
            assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
        }

        #[test]
        fn test_json_store_rejects_corrupt_file() {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("liked.json");
            fs::write(&path, "not json").unwrap();

            assert!(matches!(JsonLikedStore::open(&path), Err(FeedError::Store(_))));
        }

        #[test]
        fn test_bus_over_json_store() {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("liked.json");
            let bus = LikeBus::new(JsonLikedStore::open(&path).unwrap());

            assert!(bus.toggle(ItemId(7)).unwrap());
            let reopened = JsonLikedStore::open(&path).unwrap();
            assert!(reopened.contains("7").unwrap());
        }
    }
}
