//! Prefetch scheduling: warms the content cache around the current index
//! and eagerly loads image bytes so a card paints as soon as it is current.

use crate::api::{ContentApi, ImageFetcher, MediaInfo};
use crate::config::FeedConfig;
use crate::content_cache::{Claim, ContentCache, FetchState};
use crate::domain::{FeedItem, ItemId, MediaRef};
use crate::error::Result;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How media candidates are chosen for an item
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPolicy {
    pub max_media: usize,
    /// Candidates must be strictly wider than this
    pub min_width: u32,
    pub placeholder_template: Option<String>,
}

impl From<&FeedConfig> for MediaPolicy {
    fn from(config: &FeedConfig) -> Self {
        Self {
            max_media: config.max_media_per_item,
            min_width: config.min_media_width,
            placeholder_template: config.placeholder_template.clone(),
        }
    }
}

/// Asymmetric index window around the current item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchWindow {
    pub behind: usize,
    pub ahead: usize,
}

impl PrefetchWindow {
    pub fn range(&self, current: usize, len: usize) -> Range<usize> {
        let start = current.saturating_sub(self.behind);
        let end = current.saturating_add(self.ahead).saturating_add(1).min(len);
        start.min(end)..end
    }
}

/// Filters by width, ranks by pixel area (largest first) and caps the count
pub fn rank_media(mut candidates: Vec<MediaInfo>, policy: &MediaPolicy, alt: &str) -> Vec<MediaRef> {
    candidates.retain(|info| info.width > policy.min_width);
    candidates.sort_by(|a, b| b.area().cmp(&a.area()));
    candidates
        .into_iter()
        .take(policy.max_media)
        .map(|info| MediaRef {
            url: info.url,
            alt: alt.to_string(),
        })
        .collect()
}

/// Generic placeholder image seeded by the item title
pub fn placeholder_for(title: &str, policy: &MediaPolicy) -> Option<MediaRef> {
    let template = policy.placeholder_template.as_ref()?;
    let seed: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    Some(MediaRef {
        url: template.replace("{title}", &seed),
        alt: title.to_string(),
    })
}

/// Resolves the media list for one item.
///
/// Falls back from ranked item media to the thumbnail, then to the
/// placeholder. Transient errors propagate so the entry is marked failed.
pub async fn resolve_media(
    api: &dyn ContentApi,
    locale: &str,
    item: &FeedItem,
    policy: &MediaPolicy,
) -> Result<Vec<MediaRef>> {
    let titles = api.item_media(locale, &item.title).await?;
    if !titles.is_empty() {
        let infos = api.media_info(locale, &titles).await?;
        let ranked = rank_media(infos, policy, &item.title);
        if !ranked.is_empty() {
            return Ok(ranked);
        }
    }

    debug!(id = %item.id, "no usable item media, falling back");
    if let Some(thumbnail) = &item.thumbnail_url {
        return Ok(vec![MediaRef {
            url: thumbnail.clone(),
            alt: String::new(),
        }]);
    }

    Ok(placeholder_for(&item.title, policy).into_iter().collect())
}

#[derive(Default)]
struct PreloadState {
    /// URLs belonging to ready items inside the window
    wanted: HashSet<String>,
    loaded: HashMap<String, Arc<Vec<u8>>>,
    in_flight: HashSet<String>,
    /// Not retried until the URL leaves the window and comes back
    failed: HashSet<String>,
}

/// Eager image-byte loader shared by all prefetch tasks.
///
/// Bytes are only held for wanted URLs; anything else is evicted by
/// [`retain`](Self::retain) or discarded when its fetch completes.
#[derive(Clone)]
pub struct ImagePreloader {
    images: Arc<dyn ImageFetcher>,
    state: Arc<Mutex<PreloadState>>,
}

impl ImagePreloader {
    pub fn new(images: Arc<dyn ImageFetcher>) -> Self {
        Self {
            images,
            state: Arc::new(Mutex::new(PreloadState::default())),
        }
    }

    pub fn get(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        lock(&self.state).loaded.get(url).cloned()
    }

    pub fn is_loaded(&self, url: &str) -> bool {
        lock(&self.state).loaded.contains_key(url)
    }

    pub fn loaded_count(&self) -> usize {
        lock(&self.state).loaded.len()
    }

    /// Marks the media as wanted and starts loading every URL that is
    /// not already loaded, loading or known to fail
    pub fn preload(&self, media: &[MediaRef]) {
        for media_ref in media {
            let url = media_ref.url.clone();
            {
                let mut state = lock(&self.state);
                state.wanted.insert(url.clone());
                if state.loaded.contains_key(&url)
                    || state.failed.contains(&url)
                    || !state.in_flight.insert(url.clone())
                {
                    continue;
                }
            }

            let preloader = self.clone();
            tokio::spawn(async move {
                let result = preloader.images.fetch_bytes(&url).await;
                let mut state = lock(&preloader.state);
                state.in_flight.remove(&url);
                match result {
                    Ok(bytes) if state.wanted.contains(&url) => {
                        state.loaded.insert(url, Arc::new(bytes));
                    }
                    Ok(_) => debug!(%url, "discarding image no longer wanted"),
                    Err(e) => {
                        warn!(%url, error = %e, "image preload failed");
                        state.failed.insert(url);
                    }
                }
            });
        }
    }

    /// Narrows the wanted set and drops bytes and failures outside it
    pub fn retain(&self, wanted: HashSet<String>) {
        let mut state = lock(&self.state);
        state.loaded.retain(|url, _| wanted.contains(url));
        state.failed.retain(|url| wanted.contains(url));
        state.wanted = wanted;
    }

    pub fn clear(&self) {
        self.retain(HashSet::new());
    }
}

/// Decides which items get their media fetched and preloaded
pub struct PrefetchScheduler {
    api: Arc<dyn ContentApi>,
    cache: Arc<ContentCache>,
    preloader: ImagePreloader,
    policy: MediaPolicy,
    window: PrefetchWindow,
    /// Attachment flag per item currently inside the window
    attached: Mutex<HashMap<ItemId, Arc<AtomicBool>>>,
}

impl PrefetchScheduler {
    pub fn new(
        api: Arc<dyn ContentApi>,
        images: Arc<dyn ImageFetcher>,
        cache: Arc<ContentCache>,
        config: &FeedConfig,
    ) -> Self {
        Self {
            api,
            cache,
            preloader: ImagePreloader::new(images),
            policy: MediaPolicy::from(config),
            window: PrefetchWindow {
                behind: config.prefetch_behind,
                ahead: config.prefetch_ahead,
            },
            attached: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> PrefetchWindow {
        self.window
    }

    pub fn preloader(&self) -> &ImagePreloader {
        &self.preloader
    }

    pub fn is_attached(&self, id: ItemId) -> bool {
        lock(&self.attached).contains_key(&id)
    }

    /// Issues fetches for window items whose entry is absent or failed,
    /// preloads media of ready ones and detaches items that left the
    /// window, dropping their image bytes. Returns the ids a fetch was
    /// issued for.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn reconcile(&self, locale: &str, items: &[FeedItem], current: usize) -> Vec<ItemId> {
        let range = self.window.range(current, items.len());
        let mut issued = Vec::new();
        let mut attached = lock(&self.attached);

        let in_window: HashSet<ItemId> = items[range.clone()].iter().map(|item| item.id).collect();
        attached.retain(|id, flag| {
            let keep = in_window.contains(id);
            if !keep {
                flag.store(false, Ordering::Release);
                debug!(%id, "detached preload for item outside window");
            }
            keep
        });

        let mut ready = Vec::new();
        for item in &items[range] {
            let flag = Arc::clone(
                attached
                    .entry(item.id)
                    .or_insert_with(|| Arc::new(AtomicBool::new(true))),
            );

            match self.cache.claim(item.id) {
                Claim::Owner(ticket) => {
                    issued.push(item.id);
                    let api = Arc::clone(&self.api);
                    let policy = self.policy.clone();
                    let preloader = self.preloader.clone();
                    let locale = locale.to_string();
                    let item = item.clone();
                    tokio::spawn(async move {
                        let result = resolve_media(api.as_ref(), &locale, &item, &policy).await;
                        let entry = ticket.complete(result);
                        if entry.state == FetchState::Ready && flag.load(Ordering::Acquire) {
                            preloader.preload(&entry.media);
                        }
                    });
                }
                Claim::Ready(entry) => ready.push(entry),
                Claim::InFlight(_) => {}
            }
        }
        drop(attached);

        // Entries that turned ready during this pass stay wanted too
        let wanted = in_window
            .iter()
            .filter_map(|id| self.cache.get(*id))
            .filter(|entry| entry.state == FetchState::Ready)
            .flat_map(|entry| entry.media.into_iter().map(|media| media.url))
            .collect();
        self.preloader.retain(wanted);
        // Re-issued every pass, so fetches discarded while detached recover
        for entry in &ready {
            self.preloader.preload(&entry.media);
        }

        if !issued.is_empty() {
            debug!(count = issued.len(), current, "media fetches issued");
        }
        issued
    }

    /// Detaches every preload and drops loaded bytes
    pub fn reset(&self) {
        for flag in lock(&self.attached).drain().map(|(_, flag)| flag) {
            flag.store(false, Ordering::Release);
        }
        self.preloader.clear();
    }
}
