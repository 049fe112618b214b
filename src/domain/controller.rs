use super::gesture::GestureTracker;
use super::pagination::{MoreOutcome, PaginationSource, PaginationStats};
use super::{Direction, FeedItem, FeedPosition, FeedView, ItemId, RenderState, VisibleItem};
use crate::api::{ContentApi, ImageFetcher};
use crate::config::FeedConfig;
use crate::content_cache::ContentCache;
use crate::error::Result;
use crate::likes::{LikeBus, Subscription};
use crate::prefetch::PrefetchScheduler;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the feed position and composes pagination, prefetching, gesture
/// tracking and like synchronization into one view for the renderer.
///
/// Methods that may start background work (`tick`, gesture commits,
/// language changes) must run inside a Tokio runtime.
pub struct FeedController {
    config: FeedConfig,
    locale: String,
    source: Arc<PaginationSource>,
    cache: Arc<ContentCache>,
    prefetch: PrefetchScheduler,
    gesture: GestureTracker,
    likes: LikeBus,
    position: FeedPosition,
    _likes_subscription: Subscription,
}

impl FeedController {
    pub fn new(
        config: FeedConfig,
        api: Arc<dyn ContentApi>,
        images: Arc<dyn ImageFetcher>,
        likes: LikeBus,
    ) -> Self {
        let source = Arc::new(PaginationSource::new(Arc::clone(&api), likes.clone(), &config));
        let cache = Arc::new(ContentCache::new());
        let prefetch = PrefetchScheduler::new(api, images, Arc::clone(&cache), &config);

        let weak_source = Arc::downgrade(&source);
        let subscription = likes.subscribe(move |event| {
            if let Some(source) = weak_source.upgrade() {
                source.set_liked(event.id, event.liked);
            }
        });

        Self {
            locale: config.locale.clone(),
            gesture: GestureTracker::new(config.gesture_threshold, 1.0),
            config,
            source,
            cache,
            prefetch,
            likes,
            position: FeedPosition::default(),
            _likes_subscription: subscription,
        }
    }

    /// Loads the first page and warms the prefetch window
    pub async fn start(&mut self) -> Result<MoreOutcome> {
        let outcome = self.source.more(&self.locale).await;
        self.tick();
        outcome
    }

    /// Requests one more page and waits for it
    pub async fn load_more(&self) -> Result<MoreOutcome> {
        self.source.more(&self.locale).await
    }

    /// Per-frame upkeep: clamps the index, keeps the buffer above the low
    /// water mark and reconciles prefetching.
    pub fn tick(&mut self) {
        let len = self.source.len();
        if len == 0 {
            self.position.current_index = 0;
        } else if self.position.current_index >= len {
            self.position.current_index = len - 1;
        }

        self.ensure_buffer();
        self.reconcile();
    }

    /// Starts a background page fetch when fewer than `low_water_mark` items
    /// remain from the current index. Returns whether one was started.
    pub fn ensure_buffer(&self) -> bool {
        let remaining = self.source.len().saturating_sub(self.position.current_index);
        if remaining >= self.config.low_water_mark {
            return false;
        }
        self.request_more()
    }

    fn request_more(&self) -> bool {
        if self.source.is_cooling_down() {
            return false;
        }
        let Some(ticket) = self.source.try_begin() else {
            return false;
        };

        debug!(index = self.position.current_index, "requesting more items");
        let source = Arc::clone(&self.source);
        let locale = self.locale.clone();
        tokio::spawn(async move {
            if let Err(e) = source.run(ticket, &locale).await {
                warn!(error = %e, "background page fetch failed");
            }
        });
        true
    }

    fn reconcile(&self) {
        let window = self.prefetch.window();
        let start = self.position.current_index.saturating_sub(window.behind);
        let end = self.position.current_index + window.ahead + 1;
        let items = self.source.items_in(start..end);
        self.prefetch
            .reconcile(&self.locale, &items, self.position.current_index - start);
    }

    /// Items within `render_distance` of the current index, in order
    pub fn visible_window(&self) -> Vec<VisibleItem> {
        let distance = self.config.render_distance;
        let current = self.position.current_index;
        let start = current.saturating_sub(distance);
        let end = current.saturating_add(distance).saturating_add(1);

        self.source
            .items_in(start..end)
            .into_iter()
            .enumerate()
            .map(|(offset, item)| {
                let index = start + offset;
                let media = self.cache.get(item.id);
                let preloaded = media
                    .as_ref()
                    .and_then(|entry| entry.media.first())
                    .map_or(false, |first| self.prefetch.preloader().is_loaded(&first.url));
                VisibleItem {
                    index,
                    render: RenderState {
                        liked: self.likes.is_liked(item.id),
                        media,
                        preloaded,
                    },
                    item,
                    is_current: index == current,
                }
            })
            .collect()
    }

    /// Snapshot for one frame
    pub fn view(&self) -> FeedView {
        FeedView {
            items: self.visible_window(),
            position: self.position,
            total: self.source.len(),
            loading: self.source.is_loading(),
            error: self.source.error(),
            locale: self.locale.clone(),
        }
    }

    pub fn set_viewport_extent(&mut self, extent: f32) {
        self.gesture.set_viewport_extent(extent);
    }

    pub fn on_drag_start(&mut self, coordinate: f32) {
        self.gesture.start(coordinate);
        self.position.drag_offset = 0.0;
    }

    pub fn on_drag_move(&mut self, coordinate: f32) {
        if let Some(offset) = self.gesture.move_to(coordinate) {
            self.on_gesture_offset(offset);
        }
    }

    /// Resolves the tracked drag. Returns whether the index changed.
    pub fn on_drag_end(&mut self) -> bool {
        let outcome = self.gesture.release();
        self.on_gesture_commit(outcome.direction())
    }

    /// Continuous feedback only; the index never changes here
    pub fn on_gesture_offset(&mut self, offset: f32) {
        self.position.drag_offset = offset;
    }

    /// Applies a one-step move, clamped to the loaded sequence. `None` snaps
    /// back. Returns whether the index changed.
    pub fn on_gesture_commit(&mut self, direction: Option<Direction>) -> bool {
        self.position.drag_offset = 0.0;
        let len = self.source.len();
        let index = self.position.current_index;

        let next = match direction {
            Some(Direction::Forward) if index + 1 < len => index + 1,
            Some(Direction::Forward) => {
                debug!("advance clamped at end of feed");
                self.request_more();
                index
            }
            Some(Direction::Backward) => index.saturating_sub(1),
            None => index,
        };

        let changed = next != index;
        if changed {
            self.position.current_index = next;
            debug!(index = next, "position changed");
        }
        self.ensure_buffer();
        self.reconcile();
        changed
    }

    /// Starts a fresh session in `locale`: sequence, index, cache and
    /// preloads are all dropped before paginating again.
    pub fn on_language_change(&mut self, locale: &str) {
        info!(from = %self.locale, to = locale, "language changed, resetting feed");
        self.locale = locale.to_string();
        self.source.reset();
        self.cache.clear();
        self.prefetch.reset();
        self.gesture.cancel();
        self.position = FeedPosition::default();
        self.ensure_buffer();
    }

    pub fn toggle_like(&self, id: ItemId) -> Result<bool> {
        self.likes.toggle(id)
    }

    /// Toggles the current item; store failures are logged and yield `None`
    pub fn toggle_current_like(&self) -> Option<bool> {
        let item = self.current_item()?;
        match self.likes.toggle(item.id) {
            Ok(liked) => Some(liked),
            Err(e) => {
                warn!(id = %item.id, error = %e, "like toggle failed");
                None
            }
        }
    }

    pub fn current_item(&self) -> Option<FeedItem> {
        let index = self.position.current_index;
        self.source.items_in(index..index + 1).into_iter().next()
    }

    /// Preloaded bytes for a media URL, if the preload has finished
    pub fn preloaded_bytes(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.prefetch.preloader().get(url)
    }

    pub fn position(&self) -> FeedPosition {
        self.position
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.source.is_loading()
    }

    pub fn error(&self) -> Option<String> {
        self.source.error()
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn likes(&self) -> &LikeBus {
        &self.likes
    }

    pub fn stats(&self) -> PaginationStats {
        self.source.stats()
    }

    /// Resolves once no page fetch is outstanding
    pub async fn wait_idle(&self) {
        self.source.wait_idle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::super::pagination::testing::ScriptedApi;
    use super::*;
    use crate::content_cache::FetchState;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;
    use std::time::Duration;

    fn config() -> FeedConfig {
        FeedConfig {
            retry_backoff_ms: 1,
            ..FeedConfig::default()
        }
    }

    fn controller_with(config: FeedConfig) -> (FeedController, Arc<ScriptedApi>, LikeBus) {
        let api = Arc::new(ScriptedApi::default());
        let likes = LikeBus::in_memory();
        let mut controller = FeedController::new(
            config,
            Arc::clone(&api) as Arc<dyn ContentApi>,
            Arc::clone(&api) as Arc<dyn ImageFetcher>,
            likes.clone(),
        );
        controller.set_viewport_extent(100.0);
        (controller, api, likes)
    }

    async fn started(config: FeedConfig) -> (FeedController, Arc<ScriptedApi>, LikeBus) {
        let (mut controller, api, likes) = controller_with(config);
        controller.start().await.unwrap();
        (controller, api, likes)
    }

    mod navigation_tests {
        use super::*;

        #[tokio::test]
        async fn test_scenario_advance_to_last_triggers_one_more() {
            let (mut controller, _api, _likes) = started(FeedConfig {
                low_water_mark: 2,
                ..config()
            })
            .await;
            assert_eq!(controller.len(), 5);

            for _ in 0..3 {
                assert!(controller.on_gesture_commit(Some(Direction::Forward)));
            }
            assert_eq!(controller.position().current_index, 3);
            assert_eq!(controller.stats().batches_started, 1);

            controller.on_drag_start(100.0);
            controller.on_drag_move(80.0);
            assert!((controller.view().position.drag_offset - 0.2).abs() < 1e-6);
            assert_eq!(controller.position().current_index, 3);

            assert!(controller.on_drag_end());
            assert_eq!(controller.position().current_index, 4);
            assert_eq!(controller.position().drag_offset, 0.0);
            assert_eq!(controller.stats().batches_started, 2);

            controller.wait_idle().await;
            controller.tick();
            assert_eq!(controller.len(), 10);
            assert_eq!(controller.stats().batches_started, 2);
        }

        #[tokio::test]
        async fn test_small_drag_snaps_back() {
            let (mut controller, _api, _likes) = started(config()).await;
            controller.on_drag_start(50.0);
            controller.on_drag_move(40.0);
            assert!(!controller.on_drag_end());
            assert_eq!(controller.position(), FeedPosition::default());
        }

        #[tokio::test]
        async fn test_retreat_at_zero_is_noop() {
            let (mut controller, _api, _likes) = started(config()).await;
            controller.on_drag_start(10.0);
            controller.on_drag_move(60.0);
            assert!(!controller.on_drag_end());
            assert_eq!(controller.position().current_index, 0);
        }

        #[tokio::test]
        async fn test_backward_commit_decrements() {
            let (mut controller, _api, _likes) = started(config()).await;
            controller.on_gesture_commit(Some(Direction::Forward));
            assert!(controller.on_gesture_commit(Some(Direction::Backward)));
            assert_eq!(controller.position().current_index, 0);
            assert!(!controller.on_gesture_commit(None));
        }

        #[tokio::test]
        async fn test_advance_clamped_at_end_requests_more() {
            let (mut controller, _api, _likes) = started(FeedConfig {
                low_water_mark: 1,
                ..config()
            })
            .await;
            for _ in 0..4 {
                controller.on_gesture_commit(Some(Direction::Forward));
            }
            assert_eq!(controller.stats().batches_started, 1);

            assert!(!controller.on_gesture_commit(Some(Direction::Forward)));
            assert_eq!(controller.position().current_index, 4);
            assert_eq!(controller.stats().batches_started, 2);

            controller.wait_idle().await;
            assert!(controller.on_gesture_commit(Some(Direction::Forward)));
        }

        #[tokio::test]
        async fn test_low_buffer_requests_once_while_outstanding() {
            let (mut controller, api, _likes) = controller_with(config());
            controller.tick();
            controller.tick();
            controller.tick();
            controller.wait_idle().await;
            assert_eq!(controller.stats().batches_started, 1);
            assert_eq!(api.calls.load(Ordering::SeqCst), 5);
        }
    }

    mod view_tests {
        use super::*;

        #[tokio::test]
        async fn test_visible_window_respects_render_distance() {
            let (mut controller, _api, _likes) = started(FeedConfig {
                render_distance: 1,
                low_water_mark: 0,
                ..config()
            })
            .await;
            controller.on_gesture_commit(Some(Direction::Forward));
            controller.on_gesture_commit(Some(Direction::Forward));

            let view = controller.view();
            let indices: Vec<_> = view.items.iter().map(|v| v.index).collect();
            assert_eq!(indices, vec![1, 2, 3]);
            assert_eq!(view.current().unwrap().index, 2);
            assert_eq!(view.total, 5);
            assert_eq!(view.locale, "en");
        }

        #[tokio::test]
        async fn test_window_items_are_prefetched() {
            let (controller, _api, _likes) = started(config()).await;
            let first = controller.current_item().unwrap();

            for _ in 0..100 {
                let ready = controller
                    .view()
                    .current()
                    .and_then(|v| v.render.media.clone())
                    .map_or(false, |entry| entry.state == FetchState::Ready);
                if ready {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }

            let view = controller.view();
            let media = view.current().unwrap().render.media.clone().unwrap();
            assert_eq!(media.media[0].url, first.thumbnail_url.unwrap());
            assert!(view.items.iter().all(|v| v.render.media.is_some()));
        }
    }

    mod like_tests {
        use super::*;

        #[tokio::test]
        async fn test_toggle_reaches_feed_and_other_subscribers() {
            let (controller, _api, likes) = started(config()).await;
            let panel = Arc::new(Mutex::new(Vec::new()));
            let _panel_subscription = likes.subscribe({
                let panel = Arc::clone(&panel);
                move |event| panel.lock().unwrap().push(*event)
            });

            let id = controller.current_item().unwrap().id;
            assert_eq!(controller.toggle_current_like(), Some(true));
            assert!(controller.current_item().unwrap().liked);
            assert!(controller.view().current().unwrap().render.liked);

            controller.toggle_like(id).unwrap();
            assert!(!controller.current_item().unwrap().liked);
            assert_eq!(panel.lock().unwrap().len(), 2);
        }

        #[tokio::test]
        async fn test_dropping_controller_unsubscribes() {
            let (controller, _api, likes) = controller_with(config());
            assert_eq!(likes.subscriber_count(), 1);
            drop(controller);
            assert_eq!(likes.subscriber_count(), 0);
        }
    }

    mod session_tests {
        use super::*;

        #[tokio::test]
        async fn test_language_change_resets_session() {
            let (mut controller, api, _likes) = started(config()).await;
            controller.on_gesture_commit(Some(Direction::Forward));
            let old_ids: Vec<_> = controller.view().items.iter().map(|v| v.item.id).collect();

            controller.on_language_change("de");
            assert_eq!(controller.position(), FeedPosition::default());
            assert_eq!(controller.locale(), "de");
            assert!(controller.is_empty());
            assert!(controller.is_loading());

            controller.wait_idle().await;
            controller.tick();
            assert_eq!(controller.len(), 5);
            assert_eq!(api.locales.lock().unwrap().last().unwrap(), "de");
            let new_ids: Vec<_> = controller.view().items.iter().map(|v| v.item.id).collect();
            assert!(new_ids.iter().all(|id| !old_ids.contains(id)));
        }

        #[tokio::test]
        async fn test_tick_clamps_index() {
            let (mut controller, _api, _likes) = controller_with(config());
            controller.tick();
            assert_eq!(controller.position().current_index, 0);
            controller.wait_idle().await;
            assert!(controller.current_item().is_some());
        }
    }
}
