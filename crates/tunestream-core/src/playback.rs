//! Playback state aggregation.
//!
//! [`PlaybackAggregator`] mirrors the external player's independent signals
//! into one [`PlaybackState`] snapshot and turns UI intents into engine
//! commands. Each signal updates only its own field; everything else in the
//! snapshot is left as it was.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::PlaybackConfig;
use crate::model::{Queue, Track};
use crate::player::{PlayerEngine, PlayerSignals, RepeatMode};
use crate::remote::{ContentService, with_timeout};
use crate::scope::SubscriptionScope;
use crate::store::LibraryStore;

/// Snapshot of "what is playing" for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PlaybackState {
    /// Track shown as current (may be ahead of the engine while loading).
    pub current_track: Option<Track>,
    /// Engine is playing.
    pub is_playing: bool,
    /// Engine is buffering.
    pub is_buffering: bool,
    /// A stream URL is being resolved.
    pub is_loading: bool,
    /// Duration of the current item in milliseconds.
    pub duration_ms: u64,
    /// Engine queue.
    pub queue: Vec<Track>,
    /// Engine queue cursor.
    pub queue_index: Option<usize>,
    /// Shuffle flag.
    pub shuffle: bool,
    /// Repeat mode.
    pub repeat: RepeatMode,
    /// Whether the current track is a favorite.
    pub is_favorite: bool,
    /// Error from the last primary action.
    pub error: Option<String>,
    /// Transient notice for the last secondary action.
    pub message: Option<String>,
}

/// What [`PlaybackAggregator::skip_to_previous`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviousAction {
    /// Current track restarted from the beginning.
    Restarted,
    /// Cursor moved back to the given index.
    MovedTo(usize),
    /// Nothing to go back to.
    Ignored,
}

struct Inner {
    player: Arc<dyn PlayerEngine>,
    content: Arc<dyn ContentService>,
    library: Arc<dyn LibraryStore>,
    config: PlaybackConfig,
    signals: PlayerSignals,
    state_tx: watch::Sender<PlaybackState>,
}

impl Inner {
    fn update(&self, f: impl FnOnce(&mut PlaybackState)) {
        self.state_tx.send_modify(f);
    }
}

/// Aggregates player signals and dispatches playback commands.
pub struct PlaybackAggregator {
    inner: Arc<Inner>,
    attached: AtomicBool,
    scope: SubscriptionScope,
}

impl PlaybackAggregator {
    /// Create an aggregator over the given collaborators. Call [`attach`](Self::attach)
    /// to start mirroring the engine.
    pub fn new(
        player: Arc<dyn PlayerEngine>,
        content: Arc<dyn ContentService>,
        library: Arc<dyn LibraryStore>,
        config: PlaybackConfig,
    ) -> Self {
        let signals = player.signals();
        let (state_tx, _) = watch::channel(PlaybackState::default());
        Self {
            inner: Arc::new(Inner {
                player,
                content,
                library,
                config,
                signals,
                state_tx,
            }),
            attached: AtomicBool::new(false),
            scope: SubscriptionScope::new("playback"),
        }
    }

    /// Subscribe to every engine signal. Returns `false` if already attached.
    pub fn attach(&self) -> bool {
        if self
            .attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Playback aggregator already attached");
            return false;
        }

        let signals = self.inner.signals.clone();
        self.mirror(signals.is_playing, |s, v| s.is_playing = v);
        self.mirror(signals.is_buffering, |s, v| s.is_buffering = v);
        self.mirror(signals.duration_ms, |s, v| s.duration_ms = v);
        self.mirror(signals.current_track, |s, v| {
            // Keep an optimistic track until the engine reports one
            if v.is_some() {
                s.current_track = v;
            }
        });
        let live = self.inner.signals.clone();
        self.mirror(signals.queue, move |s, _| publish_queue(s, &live));
        let live = self.inner.signals.clone();
        self.mirror(signals.queue_index, move |s, _| publish_queue(s, &live));
        self.mirror(signals.shuffle, |s, v| s.shuffle = v);
        self.mirror(signals.repeat, |s, v| s.repeat = v);
        self.watch_favorite();

        info!("Playback aggregator attached");
        true
    }

    /// Tear down every subscription; a later [`attach`](Self::attach) starts fresh.
    pub fn detach(&self) {
        self.scope.cancel_all();
        self.attached.store(false, Ordering::Release);
    }

    fn mirror<T, F>(&self, mut rx: watch::Receiver<T>, apply: F)
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&mut PlaybackState, T) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.scope.spawn(async move {
            loop {
                let value = rx.borrow_and_update().clone();
                inner.update(|s| apply(s, value));
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    /// Re-derive the favorite flag whenever the current track changes.
    fn watch_favorite(&self) {
        let inner = Arc::clone(&self.inner);
        let mut rx = inner.state_tx.subscribe();
        self.scope.spawn(async move {
            let mut last_seen: Option<String> = None;
            loop {
                let current = rx
                    .borrow_and_update()
                    .current_track
                    .as_ref()
                    .map(|t| t.video_id.clone());

                if current != last_seen {
                    last_seen.clone_from(&current);
                    // The previous track's flag never carries over
                    inner.update(|s| s.is_favorite = false);
                    if let Some(video_id) = current {
                        let is_favorite = match inner.library.is_favorite(&video_id).await {
                            Ok(is_favorite) => is_favorite,
                            Err(e) => {
                                debug!("Favorite lookup for {} failed: {}", video_id, e);
                                false
                            }
                        };
                        inner.update(|s| {
                            // Drop results for a track that is no longer current
                            if s.current_track.as_ref().map(|t| t.video_id.as_str())
                                == Some(video_id.as_str())
                            {
                                s.is_favorite = is_favorite;
                            }
                        });
                    }
                }

                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    /// Current snapshot.
    pub fn state(&self) -> PlaybackState {
        self.inner.state_tx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state_tx.subscribe()
    }

    /// Playback position reported by the engine.
    pub fn position_ms(&self) -> u64 {
        self.inner.player.position_ms()
    }

    fn live_queue(&self) -> Queue {
        let tracks = self.inner.signals.queue.borrow().clone();
        let index = *self.inner.signals.queue_index.borrow();
        Queue::new(tracks, index)
    }

    /// Show `track` immediately, resolve its stream, then start it.
    ///
    /// With `queue == None` related tracks are appended in the background.
    /// On failure the optimistic track stays displayed and `error` is set.
    pub async fn load_and_play(&self, track: Track, queue: Option<Vec<Track>>) {
        let inner = &self.inner;
        info!("Loading {} ({})", track.title, track.video_id);

        inner.update(|s| {
            s.current_track = Some(track.clone());
            s.is_loading = true;
            s.error = None;
        });

        let resolved = with_timeout(
            inner.config.stream_url_timeout(),
            inner.content.resolve_stream_url(&track.video_id),
        )
        .await;

        let stream_url = match resolved {
            Some(Ok(url)) => url,
            Some(Err(e)) => {
                error!("Failed to resolve stream for {}: {}", track.video_id, e);
                inner.update(|s| {
                    s.is_loading = false;
                    s.error = Some(format!("Playback failed: {e}"));
                });
                return;
            }
            None => {
                error!("Timed out resolving stream for {}", track.video_id);
                inner.update(|s| {
                    s.is_loading = false;
                    s.error = Some("Timed out resolving stream".to_string());
                });
                return;
            }
        };

        let implicit_queue = queue.is_none();
        if let Err(e) = inner.player.play_track(track.clone(), stream_url, queue) {
            error!("Player rejected {}: {}", track.video_id, e);
            inner.update(|s| {
                s.is_loading = false;
                s.error = Some(format!("Playback failed: {e}"));
            });
            return;
        }
        inner.update(|s| s.is_loading = false);

        if let Err(e) = inner.library.record_history(&track).await {
            debug!("Could not record history for {}: {}", track.video_id, e);
        }

        if implicit_queue {
            self.append_related(track);
        }
    }

    fn append_related(&self, seed: Track) {
        let inner = Arc::clone(&self.inner);
        self.scope.spawn(async move {
            let fetched = with_timeout(
                inner.config.related_tracks_timeout(),
                inner.content.related_tracks(&seed.video_id),
            )
            .await;

            let related = match fetched {
                Some(Ok(tracks)) => tracks,
                Some(Err(e)) => {
                    debug!("Related tracks for {} failed: {}", seed.video_id, e);
                    return;
                }
                None => {
                    debug!("Related tracks for {} timed out", seed.video_id);
                    return;
                }
            };

            let moved_on = inner
                .signals
                .current_track
                .borrow()
                .as_ref()
                .is_some_and(|t| t.video_id != seed.video_id);
            if moved_on {
                debug!("Skipping related tracks for {}, playback moved on", seed.video_id);
                return;
            }

            let related: Vec<Track> = related
                .into_iter()
                .filter(|t| t.video_id != seed.video_id)
                .collect();
            if !related.is_empty() {
                debug!("Appending {} related tracks", related.len());
                inner.player.append_to_queue(related);
            }
        });
    }

    /// Resume playback.
    pub fn play(&self) {
        self.inner.player.play();
    }

    /// Pause playback.
    pub fn pause(&self) {
        self.inner.player.pause();
    }

    /// Play if paused, pause if playing.
    pub fn toggle_play_pause(&self) {
        if *self.inner.signals.is_playing.borrow() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Stop playback.
    pub fn stop(&self) {
        self.inner.player.stop();
    }

    /// Seek within the current track.
    pub fn seek_to(&self, position_ms: u64) {
        self.inner.player.seek_to(position_ms);
    }

    /// Restart the current track past the rewind threshold, otherwise go back one.
    pub fn skip_to_previous(&self) -> PreviousAction {
        let position = self.inner.player.position_ms();
        if position > self.inner.config.rewind_threshold_ms {
            debug!("Restarting current track at {}ms", position);
            self.inner.player.seek_to(0);
            return PreviousAction::Restarted;
        }

        match self.live_queue().previous_index() {
            Some(index) => {
                self.inner.player.skip_to(index);
                PreviousAction::MovedTo(index)
            }
            None => PreviousAction::Ignored,
        }
    }

    /// Advance the cursor; ignored at the end of the queue.
    pub fn skip_to_next(&self) -> bool {
        match self.live_queue().next_index() {
            Some(index) => {
                self.inner.player.skip_to(index);
                true
            }
            None => {
                debug!("Skip to next ignored at end of queue");
                false
            }
        }
    }

    /// Jump to a queue position; out-of-range requests are ignored.
    pub fn play_from_queue(&self, index: usize) -> bool {
        if !self.live_queue().contains_index(index) {
            debug!("Ignoring out-of-range queue index {}", index);
            return false;
        }
        self.inner.player.skip_to(index);
        true
    }

    /// Append a track to the queue.
    pub fn add_to_queue(&self, track: Track) {
        self.inner.player.append_to_queue(vec![track]);
    }

    /// Queue a track right after the current one.
    pub fn play_next(&self, track: Track) {
        self.inner.player.insert_next(track);
    }

    /// Remove a queue item; out-of-range requests are ignored.
    pub fn remove_from_queue(&self, index: usize) -> bool {
        if !self.live_queue().contains_index(index) {
            return false;
        }
        self.inner.player.remove_from_queue(index);
        true
    }

    /// Flip shuffle.
    pub fn toggle_shuffle(&self) {
        let enabled = *self.inner.signals.shuffle.borrow();
        self.inner.player.set_shuffle(!enabled);
    }

    /// Off -> All -> One -> Off.
    pub fn cycle_repeat_mode(&self) {
        let mode = *self.inner.signals.repeat.borrow();
        self.inner.player.set_repeat_mode(mode.next());
    }

    /// Flip the favorite flag of the current track.
    pub async fn toggle_favorite(&self) {
        let Some(track) = self.state().current_track else {
            return;
        };
        match self.inner.library.toggle_favorite(&track).await {
            Ok(is_favorite) => self.inner.update(|s| {
                if s.current_track.as_ref().map(|t| &t.video_id) == Some(&track.video_id) {
                    s.is_favorite = is_favorite;
                }
                s.message = Some(if is_favorite {
                    "Added to favorites".to_string()
                } else {
                    "Removed from favorites".to_string()
                });
            }),
            Err(e) => {
                warn!("Failed to toggle favorite for {}: {}", track.video_id, e);
                self.inner
                    .update(|s| s.message = Some("Couldn't update favorites".to_string()));
            }
        }
    }

    /// Add the current track to a playlist.
    pub async fn add_current_to_playlist(&self, playlist_id: &str) {
        let Some(track) = self.state().current_track else {
            return;
        };
        match self.inner.library.add_to_playlist(playlist_id, &track).await {
            Ok(()) => self
                .inner
                .update(|s| s.message = Some("Added to playlist".to_string())),
            Err(e) => {
                warn!(
                    "Failed to add {} to playlist {}: {}",
                    track.video_id, playlist_id, e
                );
                self.inner
                    .update(|s| s.message = Some("Couldn't add to playlist".to_string()));
            }
        }
    }

    /// Dismiss the current error.
    pub fn clear_error(&self) {
        self.inner.update(|s| s.error = None);
    }

    /// Dismiss the current notice.
    pub fn clear_message(&self) {
        self.inner.update(|s| s.message = None);
    }
}

/// Publish the engine queue with its cursor kept inside the queue.
fn publish_queue(state: &mut PlaybackState, signals: &PlayerSignals) {
    let tracks = signals.queue.borrow().clone();
    let queue = Queue::new(tracks, *signals.queue_index.borrow());
    state.queue_index = queue.current_index();
    state.queue = queue.tracks().to_vec();
}

impl std::fmt::Debug for PlaybackAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackAggregator")
            .field("attached", &self.attached.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::player::{MockPlayerEngine, PlayerSignalSenders, signal_channels};
    use crate::remote::MockContentService;
    use crate::remote::testing::StallingContent;
    use crate::store::MockLibraryStore;
    use mockall::predicate::eq;
    use std::time::Duration;

    fn track(i: usize) -> Track {
        Track::new(format!("vid{i:08}"), format!("Song {i}"), "Artist")
    }

    fn player_with_signals() -> (MockPlayerEngine, PlayerSignalSenders) {
        let (senders, signals) = signal_channels();
        let mut player = MockPlayerEngine::new();
        player.expect_signals().returning(move || signals.clone());
        (player, senders)
    }

    fn quiet_library() -> MockLibraryStore {
        let mut library = MockLibraryStore::new();
        library.expect_is_favorite().returning(|_| Ok(false));
        library.expect_record_history().returning(|_| Ok(()));
        library
    }

    fn aggregator(
        player: MockPlayerEngine,
        content: MockContentService,
        library: MockLibraryStore,
    ) -> PlaybackAggregator {
        PlaybackAggregator::new(
            Arc::new(player),
            Arc::new(content),
            Arc::new(library),
            PlaybackConfig::default(),
        )
    }

    async fn wait_for(
        agg: &PlaybackAggregator,
        predicate: impl FnMut(&PlaybackState) -> bool,
    ) -> PlaybackState {
        let mut rx = agg.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
            .await
            .expect("state change in time")
            .expect("sender alive")
            .clone()
    }

    #[tokio::test]
    async fn test_skip_to_previous_restarts_past_threshold() {
        let (mut player, senders) = player_with_signals();
        senders.queue.send_replace(vec![track(0), track(1), track(2)]);
        senders.queue_index.send_replace(Some(1));
        player.expect_position_ms().return_const(4_000u64);
        player.expect_seek_to().with(eq(0)).times(1).return_const(());
        player.expect_skip_to().never();

        let agg = aggregator(player, MockContentService::new(), quiet_library());
        assert_eq!(agg.skip_to_previous(), PreviousAction::Restarted);
    }

    #[tokio::test]
    async fn test_skip_to_previous_moves_back_within_threshold() {
        let (mut player, senders) = player_with_signals();
        senders.queue.send_replace(vec![track(0), track(1), track(2)]);
        senders.queue_index.send_replace(Some(1));
        player.expect_position_ms().return_const(1_000u64);
        player.expect_skip_to().with(eq(0)).times(1).return_const(());
        player.expect_seek_to().never();

        let agg = aggregator(player, MockContentService::new(), quiet_library());
        assert_eq!(agg.skip_to_previous(), PreviousAction::MovedTo(0));
    }

    #[tokio::test]
    async fn test_skip_to_previous_at_queue_start_is_ignored() {
        let (mut player, senders) = player_with_signals();
        senders.queue.send_replace(vec![track(0)]);
        senders.queue_index.send_replace(Some(0));
        player.expect_position_ms().return_const(500u64);
        player.expect_skip_to().never();
        player.expect_seek_to().never();

        let agg = aggregator(player, MockContentService::new(), quiet_library());
        assert_eq!(agg.skip_to_previous(), PreviousAction::Ignored);
    }

    #[tokio::test]
    async fn test_out_of_range_queue_requests_are_ignored() {
        let (mut player, senders) = player_with_signals();
        senders.queue.send_replace(vec![track(0), track(1)]);
        senders.queue_index.send_replace(Some(1));
        player.expect_skip_to().never();
        player.expect_remove_from_queue().never();

        let agg = aggregator(player, MockContentService::new(), quiet_library());
        assert!(!agg.skip_to_next());
        assert!(!agg.play_from_queue(2));
        assert!(!agg.play_from_queue(usize::MAX));
        assert!(!agg.remove_from_queue(5));
    }

    #[tokio::test]
    async fn test_skip_to_next_dispatches_in_range() {
        let (mut player, senders) = player_with_signals();
        senders.queue.send_replace(vec![track(0), track(1)]);
        senders.queue_index.send_replace(Some(0));
        player.expect_skip_to().with(eq(1)).times(2).return_const(());

        let agg = aggregator(player, MockContentService::new(), quiet_library());
        assert!(agg.skip_to_next());
        assert!(agg.play_from_queue(1));
    }

    #[tokio::test]
    async fn test_attach_is_idempotent_and_merges_fields() {
        let (player, senders) = player_with_signals();
        let agg = aggregator(player, MockContentService::new(), quiet_library());

        assert!(agg.attach());
        assert!(!agg.attach());

        senders.is_buffering.send_replace(true);
        let state = wait_for(&agg, |s| s.is_buffering).await;
        assert!(!state.is_playing);

        senders.is_playing.send_replace(true);
        let state = wait_for(&agg, |s| s.is_playing).await;
        // The earlier field is untouched by the later source
        assert!(state.is_buffering);

        senders.repeat.send_replace(RepeatMode::One);
        senders.duration_ms.send_replace(180_000);
        let state = wait_for(&agg, |s| s.repeat == RepeatMode::One && s.duration_ms == 180_000).await;
        assert!(state.is_playing);
    }

    #[tokio::test]
    async fn test_load_and_play_success_dispatches_and_appends_related() {
        let (mut player, _senders) = player_with_signals();
        let seed = track(1);
        let expected = seed.clone();
        player
            .expect_play_track()
            .withf(move |t, url, queue| *t == expected && url == "https://cdn/1" && queue.is_none())
            .times(1)
            .returning(|_, _, _| Ok(()));
        let (appended_tx, mut appended_rx) = tokio::sync::mpsc::unbounded_channel();
        player.expect_append_to_queue().returning(move |tracks| {
            let _ = appended_tx.send(tracks);
        });

        let mut content = MockContentService::new();
        content
            .expect_resolve_stream_url()
            .returning(|_| Ok("https://cdn/1".to_string()));
        content
            .expect_related_tracks()
            .returning(|_| Ok(vec![track(1), track(2), track(3)]));

        let agg = aggregator(player, content, quiet_library());
        agg.load_and_play(seed.clone(), None).await;

        let state = agg.state();
        assert_eq!(state.current_track, Some(seed));
        assert!(!state.is_loading);
        assert!(state.error.is_none());

        let appended = tokio::time::timeout(Duration::from_secs(2), appended_rx.recv())
            .await
            .expect("related tracks in time")
            .expect("append called");
        // The seed track is not appended to its own queue
        assert_eq!(appended, vec![track(2), track(3)]);
    }

    #[tokio::test]
    async fn test_load_and_play_with_explicit_queue_skips_related() {
        let (mut player, _senders) = player_with_signals();
        player.expect_play_track().times(1).returning(|_, _, _| Ok(()));
        player.expect_append_to_queue().never();

        let mut content = MockContentService::new();
        content
            .expect_resolve_stream_url()
            .returning(|_| Ok("https://cdn/1".to_string()));
        content.expect_related_tracks().never();

        let agg = aggregator(player, content, quiet_library());
        agg.load_and_play(track(1), Some(vec![track(1), track(2)])).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(agg.state().error.is_none());
    }

    /// Failed resolution keeps the optimistic track metadata on screen.
    #[tokio::test]
    async fn test_load_and_play_failure_keeps_optimistic_track() {
        let (mut player, _senders) = player_with_signals();
        player.expect_play_track().never();

        let mut content = MockContentService::new();
        content
            .expect_resolve_stream_url()
            .returning(|_| Err(Error::remote("Video unavailable")));

        let agg = aggregator(player, content, quiet_library());
        agg.load_and_play(track(7), None).await;

        let state = agg.state();
        assert_eq!(state.current_track, Some(track(7)));
        assert!(!state.is_loading);
        assert_eq!(
            state.error.as_deref(),
            Some("Playback failed: Remote request failed: Video unavailable")
        );

        agg.clear_error();
        assert!(agg.state().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_and_play_timeout() {
        let (mut player, _senders) = player_with_signals();
        player.expect_play_track().never();

        let agg = PlaybackAggregator::new(
            Arc::new(player),
            Arc::new(StallingContent::new(Duration::from_secs(60))),
            Arc::new(quiet_library()),
            PlaybackConfig::default(),
        );
        agg.load_and_play(track(3), None).await;

        let state = agg.state();
        assert_eq!(state.error.as_deref(), Some("Timed out resolving stream"));
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_favorite_is_derived_from_current_track() {
        let (player, senders) = player_with_signals();
        let mut library = MockLibraryStore::new();
        library
            .expect_is_favorite()
            .returning(|id| Ok(id == "vid00000002"));

        let agg = aggregator(player, MockContentService::new(), library);
        agg.attach();

        senders.current_track.send_replace(Some(track(2)));
        let state = wait_for(&agg, |s| s.is_favorite).await;
        assert_eq!(state.current_track, Some(track(2)));

        senders.current_track.send_replace(Some(track(3)));
        let state = wait_for(&agg, |s| {
            s.current_track.as_ref().is_some_and(|t| t.video_id == "vid00000003") && !s.is_favorite
        })
        .await;
        assert!(!state.is_favorite);
    }

    #[tokio::test]
    async fn test_failed_favorite_lookup_clears_previous_flag() {
        let (player, senders) = player_with_signals();
        let mut library = MockLibraryStore::new();
        library.expect_is_favorite().returning(|id| {
            if id == "vid00000002" {
                Ok(true)
            } else {
                Err(Error::store("database locked"))
            }
        });

        let agg = aggregator(player, MockContentService::new(), library);
        agg.attach();

        senders.current_track.send_replace(Some(track(2)));
        wait_for(&agg, |s| s.is_favorite).await;

        senders.current_track.send_replace(Some(track(3)));
        wait_for(&agg, |s| {
            s.current_track.as_ref().is_some_and(|t| t.video_id == "vid00000003") && !s.is_favorite
        })
        .await;

        // The failed lookup has settled and the flag stays cleared
        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = agg.state();
        assert_eq!(state.current_track, Some(track(3)));
        assert!(!state.is_favorite);
    }

    #[tokio::test]
    async fn test_queue_cursor_never_points_past_the_queue() {
        let (player, senders) = player_with_signals();
        let agg = aggregator(player, MockContentService::new(), quiet_library());
        agg.attach();

        senders.queue.send_replace(vec![track(0), track(1)]);
        senders.queue_index.send_replace(Some(1));
        wait_for(&agg, |s| s.queue.len() == 2 && s.queue_index == Some(1)).await;

        senders.queue_index.send_replace(Some(5));
        let state = wait_for(&agg, |s| s.queue_index.is_none()).await;
        assert_eq!(state.queue.len(), 2);

        // Shrinking the queue under the cursor drops the cursor too
        senders.queue_index.send_replace(Some(1));
        wait_for(&agg, |s| s.queue_index == Some(1)).await;
        senders.queue.send_replace(vec![track(0)]);
        let state = wait_for(&agg, |s| s.queue.len() == 1).await;
        assert_eq!(state.queue_index, None);
    }

    #[tokio::test]
    async fn test_toggle_favorite_failure_sets_message() {
        let (player, _senders) = player_with_signals();
        let mut library = quiet_library();
        library
            .expect_toggle_favorite()
            .returning(|_| Err(Error::store("database locked")));

        let mut content = MockContentService::new();
        content
            .expect_resolve_stream_url()
            .returning(|_| Err(Error::remote("offline")));

        let agg = aggregator(player, content, library);
        agg.load_and_play(track(1), Some(Vec::new())).await;
        agg.toggle_favorite().await;

        assert_eq!(
            agg.state().message.as_deref(),
            Some("Couldn't update favorites")
        );
        agg.clear_message();
        assert!(agg.state().message.is_none());
    }

    #[tokio::test]
    async fn test_shuffle_and_repeat_commands_read_live_state() {
        let (mut player, senders) = player_with_signals();
        senders.shuffle.send_replace(true);
        senders.repeat.send_replace(RepeatMode::All);
        player.expect_set_shuffle().with(eq(false)).times(1).return_const(());
        player
            .expect_set_repeat_mode()
            .with(eq(RepeatMode::One))
            .times(1)
            .return_const(());

        let agg = aggregator(player, MockContentService::new(), quiet_library());
        agg.toggle_shuffle();
        agg.cycle_repeat_mode();
    }

    #[tokio::test]
    async fn test_detach_allows_reattach() {
        let (player, _senders) = player_with_signals();
        let agg = aggregator(player, MockContentService::new(), quiet_library());
        assert!(agg.attach());
        agg.detach();
        assert!(agg.attach());
    }
}
