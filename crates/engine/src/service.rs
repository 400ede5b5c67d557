//! The now-playing aggregator.
//!
//! Polls a provider on an interval, decides whether artwork needs to be
//! (re)fetched, stores artwork in the cache and publishes one
//! [`NowPlayingState`] per cycle through a [`LatestValue`]. User actions get
//! an optimistic publish followed by a delayed authoritative poll.

use crate::artwork_cache::{artwork_key, ArtworkCache};
use crate::latest::LatestValue;
use crate::optimistic::apply_optimistic;
use crate::policy::{ArtworkDecision, ArtworkFetchTracker};
use nowbar_core::{
    clamp_poll_interval, AppConfig, NowPlayingInfo, NowPlayingState, PlaybackAction,
    PlayerIdentity,
};
use nowbar_providers::NowPlayingProvider;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub poll_interval: Duration,
    pub reconcile_delay: Duration,
    pub max_artwork_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            reconcile_delay: Duration::from_millis(300),
            max_artwork_attempts: 2,
        }
    }
}

impl ServiceConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            poll_interval: cfg.preferences.poll_interval(),
            reconcile_delay: Duration::from_millis(cfg.service.reconcile_delay_ms),
            max_artwork_attempts: cfg.service.max_artwork_attempts,
        }
    }
}

struct Inner {
    provider: Arc<dyn NowPlayingProvider>,
    cache: Arc<ArtworkCache>,
    state: LatestValue<Option<NowPlayingState>>,
    tracker: Mutex<ArtworkFetchTracker>,
    cfg: Mutex<ServiceConfig>,
    poll_task: Mutex<Option<CancellationToken>>,
    // Serializes poll cycles so the tracker always compares against the
    // state the previous cycle published.
    cycle: tokio::sync::Mutex<()>,
    writes: TaskTracker,
}

/// Cheap to clone; all clones drive the same aggregator.
#[derive(Clone)]
pub struct NowPlayingService {
    inner: Arc<Inner>,
}

impl NowPlayingService {
    pub fn new(
        provider: Arc<dyn NowPlayingProvider>,
        cache: Arc<ArtworkCache>,
        mut cfg: ServiceConfig,
    ) -> Self {
        cfg.poll_interval = clamp_poll_interval(cfg.poll_interval.as_secs_f64());
        Self {
            inner: Arc::new(Inner {
                provider,
                cache,
                state: LatestValue::new(None),
                tracker: Mutex::new(ArtworkFetchTracker::new(cfg.max_artwork_attempts)),
                cfg: Mutex::new(cfg),
                poll_task: Mutex::new(None),
                cycle: tokio::sync::Mutex::new(()),
                writes: TaskTracker::new(),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<ArtworkCache> {
        &self.inner.cache
    }

    pub fn current(&self) -> Option<NowPlayingState> {
        self.inner.state.get()
    }

    /// Current state first, then every later publish. `None` means idle.
    pub fn subscribe(&self) -> impl Stream<Item = Option<NowPlayingState>> + Send + Unpin {
        self.inner.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .poll_task
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Starts the interval loop. A no-op while already running.
    pub fn start(&self) {
        let token = {
            let mut slot = self.inner.poll_task.lock();
            if slot.as_ref().is_some_and(|t| !t.is_cancelled()) {
                return;
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };

        info!(
            provider = self.inner.provider.name(),
            interval_ms = self.inner.cfg.lock().poll_interval.as_millis() as u64,
            "now-playing polling started"
        );
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run(token).await });
    }

    /// Cancels the interval loop. A cycle already in flight may still publish.
    pub fn stop(&self) {
        if let Some(token) = self.inner.poll_task.lock().take() {
            token.cancel();
            info!("now-playing polling stopped");
        }
    }

    /// Runs exactly one poll cycle outside the interval loop.
    pub async fn poll_now(&self) -> Option<NowPlayingState> {
        self.inner.poll_cycle().await
    }

    pub fn set_poll_interval(&self, interval: Duration) {
        self.inner.cfg.lock().poll_interval = clamp_poll_interval(interval.as_secs_f64());
    }

    pub fn update_config(&self, mut cfg: ServiceConfig) {
        cfg.poll_interval = clamp_poll_interval(cfg.poll_interval.as_secs_f64());
        self.inner
            .tracker
            .lock()
            .set_max_attempts(cfg.max_artwork_attempts);
        *self.inner.cfg.lock() = cfg;
    }

    pub fn config(&self) -> ServiceConfig {
        self.inner.cfg.lock().clone()
    }

    /// Publishes the predicted state for `action` right away, then schedules
    /// a reconciling poll. The caller is responsible for sending the command
    /// to the player.
    pub fn perform(&self, action: PlaybackAction) -> JoinHandle<()> {
        if let Some(current) = self.inner.state.get() {
            let predicted = apply_optimistic(&current, action);
            debug!(?action, "publishing optimistic state");
            self.inner.state.set(Some(predicted));
        }
        self.schedule_reconcile()
    }

    /// One poll cycle after the reconcile delay. Does not touch the interval
    /// loop.
    pub fn schedule_reconcile(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let delay = inner.cfg.lock().reconcile_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.poll_cycle().await;
        })
    }

    /// Waits for artwork writes spawned so far to land.
    pub async fn flush_artwork_writes(&self) {
        self.inner.writes.close();
        self.inner.writes.wait().await;
        self.inner.writes.reopen();
    }
}

impl Inner {
    async fn run(self: Arc<Self>, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                break;
            }
            self.poll_cycle().await;
            if token.is_cancelled() {
                break;
            }
            let interval = self.cfg.lock().poll_interval;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        debug!("poll loop exited");
    }

    async fn poll_cycle(&self) -> Option<NowPlayingState> {
        let _cycle = self.cycle.lock().await;

        let info = match self.provider.fetch_now_playing().await {
            Ok(Some(info)) => info,
            Ok(None) => {
                self.state.set(None);
                return None;
            }
            Err(err) => {
                debug!(provider = self.provider.name(), error = %err, "provider poll failed; treating as idle");
                self.state.set(None);
                return None;
            }
        };

        let previous = self.state.get();
        let decision = self.tracker.lock().decide(previous.as_ref(), &info);
        let artwork_id = match decision {
            ArtworkDecision::Reuse(id) => id,
            ArtworkDecision::Fetch { attempt } => self.fetch_artwork(&info, attempt).await,
        };

        let state = NowPlayingState::from_info(info, artwork_id);
        self.state.set(Some(state.clone()));
        Some(state)
    }

    async fn fetch_artwork(&self, info: &NowPlayingInfo, attempt: u32) -> Option<String> {
        let identity = PlayerIdentity::classify(info.source_app_identity.as_deref());
        if !identity.supports_artwork() {
            return None;
        }

        let bytes = match self.provider.fetch_artwork(&identity).await {
            Ok(Some(bytes)) if !bytes.is_empty() => bytes,
            Ok(_) => {
                debug!(attempt, ?identity, "no artwork available");
                return None;
            }
            Err(err) => {
                debug!(attempt, ?identity, error = %err, "artwork fetch failed");
                return None;
            }
        };

        let key = artwork_key(info);
        let cache = Arc::clone(&self.cache);
        let write_key = key.clone();
        self.writes.spawn(async move {
            if let Err(err) = cache.put(&bytes, &write_key).await {
                warn!(key = %write_key, error = %err, "artwork cache write failed");
            }
        });
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::{NowPlayingService, ServiceConfig};
    use crate::artwork_cache::tests::png_bytes;
    use crate::artwork_cache::{artwork_key, ArtworkCache};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use nowbar_core::{NowPlayingInfo, NowPlayingState, PlaybackAction, PlayerIdentity, LOADING_TITLE};
    use nowbar_providers::NowPlayingProvider;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    #[derive(Default)]
    struct FakeProvider {
        now: Mutex<Option<NowPlayingInfo>>,
        artwork: Mutex<Option<Vec<u8>>>,
        fail: AtomicBool,
        polls: AtomicUsize,
        artwork_calls: AtomicUsize,
    }

    impl FakeProvider {
        fn playing(&self, info: Option<NowPlayingInfo>) {
            *self.now.lock() = info;
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }

        fn artwork_calls(&self) -> usize {
            self.artwork_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NowPlayingProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_now_playing(&self) -> Result<Option<NowPlayingInfo>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                bail!("player went away");
            }
            Ok(self.now.lock().clone())
        }

        async fn fetch_artwork(&self, _identity: &PlayerIdentity) -> Result<Option<Vec<u8>>> {
            self.artwork_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.artwork.lock().clone())
        }
    }

    fn track(title: &str, artist: &str, source: &str) -> NowPlayingInfo {
        NowPlayingInfo {
            is_playing: true,
            source_app_identity: Some(source.to_string()),
            total_time: 200.0,
            current_time: 5.0,
            ..NowPlayingInfo::new(title, artist)
        }
    }

    fn service(provider: &Arc<FakeProvider>, dir: &std::path::Path) -> NowPlayingService {
        NowPlayingService::new(
            Arc::clone(provider) as Arc<dyn NowPlayingProvider>,
            Arc::new(ArtworkCache::new(dir, 8)),
            ServiceConfig::default(),
        )
    }

    #[tokio::test]
    async fn stores_artwork_and_publishes_key() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        let song = track("Song A", "Artist A", "com.apple.Music");
        provider.playing(Some(song.clone()));
        *provider.artwork.lock() = Some(png_bytes(40));

        let svc = service(&provider, dir.path());
        let state = svc.poll_now().await.unwrap();
        let key = artwork_key(&song);
        assert_eq!(state.artwork_id.as_deref(), Some(key.as_str()));

        svc.flush_artwork_writes().await;
        let art = svc.cache().get(&key).await.unwrap();
        assert_eq!(&*art.bytes, png_bytes(40).as_slice());
    }

    #[tokio::test]
    async fn unchanged_track_reuses_resolved_artwork() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        let song = track("Song A", "Artist A", "com.spotify.client");
        provider.playing(Some(song.clone()));

        let svc = service(&provider, dir.path());
        svc.inner
            .state
            .set(Some(NowPlayingState::from_info(song, Some("abc123".to_string()))));

        let state = svc.poll_now().await.unwrap();
        assert_eq!(state.artwork_id.as_deref(), Some("abc123"));
        assert_eq!(provider.artwork_calls(), 0);
    }

    #[tokio::test]
    async fn missing_artwork_is_requested_at_most_twice_per_track() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        provider.playing(Some(track("Song A", "Artist A", "com.spotify.client")));

        let svc = service(&provider, dir.path());
        for _ in 0..5 {
            let state = svc.poll_now().await.unwrap();
            assert!(state.artwork_id.is_none());
        }
        assert_eq!(provider.artwork_calls(), 2);
        assert_eq!(svc.inner.tracker.lock().attempts(), 2);

        provider.playing(Some(track("Song B", "Artist A", "com.spotify.client")));
        svc.poll_now().await;
        assert_eq!(provider.artwork_calls(), 3);
        assert_eq!(svc.inner.tracker.lock().attempts(), 1);
    }

    #[tokio::test]
    async fn browsers_never_ask_for_artwork() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        provider.playing(Some(track("Clip", "", "com.google.Chrome")));
        *provider.artwork.lock() = Some(png_bytes(1));

        let svc = service(&provider, dir.path());
        let state = svc.poll_now().await.unwrap();
        assert!(state.artwork_id.is_none());
        assert_eq!(provider.artwork_calls(), 0);
    }

    #[tokio::test]
    async fn failed_cache_write_keeps_artwork_id() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let provider = Arc::new(FakeProvider::default());
        let song = track("Song A", "Artist A", "com.apple.Music");
        provider.playing(Some(song.clone()));
        *provider.artwork.lock() = Some(png_bytes(9));

        // The cache directory path is a regular file, so every write fails.
        let svc = service(&provider, &blocker.path().join("artwork"));
        let state = svc.poll_now().await.unwrap();
        assert_eq!(state.artwork_id, Some(artwork_key(&song)));

        svc.flush_artwork_writes().await;
        assert!(svc.cache().get(&artwork_key(&song)).await.is_none());
    }

    #[tokio::test]
    async fn nothing_playing_publishes_idle_every_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        let svc = service(&provider, dir.path());
        let mut updates = svc.subscribe();
        assert_eq!(updates.next().await, Some(None));

        for _ in 0..3 {
            assert!(svc.poll_now().await.is_none());
            assert_eq!(updates.next().await, Some(None));
        }

        provider.fail.store(true, Ordering::SeqCst);
        assert!(svc.poll_now().await.is_none());
        assert_eq!(provider.polls(), 4);

        provider.fail.store(false, Ordering::SeqCst);
        provider.playing(Some(track("Back", "Again", "com.spotify.client")));
        assert!(svc.poll_now().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_is_optimistic_then_reconciled() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        provider.playing(Some(track("Song A", "Artist A", "com.google.Chrome")));

        let svc = service(&provider, dir.path());
        svc.poll_now().await;
        let mut updates = svc.subscribe();
        assert!(updates.next().await.unwrap().unwrap().is_playing);

        // The player ignores the command, so the reconcile poll restores it.
        let reconcile = svc.perform(PlaybackAction::TogglePlayPause);
        assert!(!svc.current().unwrap().is_playing);
        assert!(!updates.next().await.unwrap().unwrap().is_playing);
        assert_eq!(provider.polls(), 1);

        reconcile.await.unwrap();
        assert_eq!(provider.polls(), 2);
        assert!(updates.next().await.unwrap().unwrap().is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_shows_placeholder_until_next_poll() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        provider.playing(Some(track("Song A", "Artist A", "com.spotify.client")));

        let svc = service(&provider, dir.path());
        svc.poll_now().await;

        provider.playing(Some(track("Song B", "Artist B", "com.spotify.client")));
        let reconcile = svc.perform(PlaybackAction::SkipNext);
        let loading = svc.current().unwrap();
        assert_eq!(loading.title, LOADING_TITLE);
        assert!(loading.artist.is_empty());

        reconcile.await.unwrap();
        let settled = svc.current().unwrap();
        assert_eq!(settled.title, "Song B");
        assert_eq!(settled.artist, "Artist B");
    }

    #[tokio::test(start_paused = true)]
    async fn perform_without_state_only_reconciles() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        let svc = service(&provider, dir.path());

        svc.perform(PlaybackAction::Seek(10.0)).await.unwrap();
        assert!(svc.current().is_none());
        assert_eq!(provider.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_polls_on_interval_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        provider.playing(Some(track("Stream", "", "com.example.radio")));
        let svc = service(&provider, dir.path());

        svc.start();
        svc.start();
        assert!(svc.is_running());

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(provider.polls(), 3);

        svc.stop();
        svc.stop();
        assert!(!svc.is_running());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(provider.polls(), 3);

        svc.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.polls(), 4);
        svc.stop();
    }

    #[tokio::test]
    async fn poll_interval_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        let svc = NowPlayingService::new(
            Arc::clone(&provider) as Arc<dyn NowPlayingProvider>,
            Arc::new(ArtworkCache::new(dir.path(), 8)),
            ServiceConfig {
                poll_interval: Duration::from_millis(10),
                ..ServiceConfig::default()
            },
        );
        assert_eq!(svc.config().poll_interval, Duration::from_secs(1));

        svc.set_poll_interval(Duration::from_secs(5));
        assert_eq!(svc.config().poll_interval, Duration::from_secs(5));
    }
}
