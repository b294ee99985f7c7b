//! Library state aggregation.
//!
//! Six store and download streams are folded into one [`LibraryState`].
//! Every source is forwarded as a [`LibraryEvent`] into a single reducer task,
//! which is the only writer of the snapshot. UI-local fields have no upstream
//! source and are carried over from the previous snapshot on every rebuild.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

use crate::download::{DownloadManager, DownloadRecord, ProgressMap, StatusMap};
use crate::error::{Error, Result};
use crate::model::{Playlist, PlaylistUpdate, Track};
use crate::scope::SubscriptionScope;
use crate::store::{LibraryStore, validate_playlist_name};

/// Snapshot of the user's library.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LibraryState {
    /// Playlists.
    pub playlists: Vec<Playlist>,
    /// Favorite tracks.
    pub favorites: Vec<Track>,
    /// Listening history, most recent first.
    pub history: Vec<Track>,
    /// Downloaded tracks.
    pub downloads: Vec<DownloadRecord>,
    /// Per-track download progress.
    pub download_progress: ProgressMap,
    /// Per-track download status.
    pub download_statuses: StatusMap,
    /// The create-playlist dialog is open.
    pub show_create_dialog: bool,
    /// Error from the last library action.
    pub error: Option<String>,
}

/// Input to [`LibraryState::reduce`].
#[derive(Debug, Clone)]
pub enum LibraryEvent {
    /// New playlists value.
    Playlists(Vec<Playlist>),
    /// New favorites value.
    Favorites(Vec<Track>),
    /// New history value.
    History(Vec<Track>),
    /// New downloads value.
    Downloads(Vec<DownloadRecord>),
    /// New download progress value.
    DownloadProgress(ProgressMap),
    /// New download status value.
    DownloadStatuses(StatusMap),
    /// Open the create-playlist dialog.
    ShowCreateDialog,
    /// Close the create-playlist dialog.
    HideCreateDialog,
    /// A library action failed.
    Failed(String),
    /// Dismiss the error.
    ClearError,
}

impl LibraryState {
    /// Build the next snapshot from `previous` and one event.
    ///
    /// Source events replace exactly their own collection; the dialog flag
    /// and error always come from `previous` unless the event targets them.
    #[must_use]
    pub fn reduce(previous: &Self, event: LibraryEvent) -> Self {
        let mut next = Self {
            playlists: previous.playlists.clone(),
            favorites: previous.favorites.clone(),
            history: previous.history.clone(),
            downloads: previous.downloads.clone(),
            download_progress: previous.download_progress.clone(),
            download_statuses: previous.download_statuses.clone(),
            show_create_dialog: previous.show_create_dialog,
            error: previous.error.clone(),
        };

        match event {
            LibraryEvent::Playlists(v) => next.playlists = v,
            LibraryEvent::Favorites(v) => next.favorites = v,
            LibraryEvent::History(v) => next.history = v,
            LibraryEvent::Downloads(v) => next.downloads = v,
            LibraryEvent::DownloadProgress(v) => next.download_progress = v,
            LibraryEvent::DownloadStatuses(v) => next.download_statuses = v,
            LibraryEvent::ShowCreateDialog => next.show_create_dialog = true,
            LibraryEvent::HideCreateDialog => next.show_create_dialog = false,
            LibraryEvent::Failed(message) => next.error = Some(message),
            LibraryEvent::ClearError => next.error = None,
        }
        next
    }
}

/// Aggregates library streams and dispatches library actions.
pub struct LibraryAggregator {
    store: Arc<dyn LibraryStore>,
    downloads: Arc<dyn DownloadManager>,
    events: mpsc::UnboundedSender<LibraryEvent>,
    /// Held by the running reducer; released when it is aborted.
    pending_events: Arc<Mutex<mpsc::UnboundedReceiver<LibraryEvent>>>,
    state_tx: Arc<watch::Sender<LibraryState>>,
    attached: AtomicBool,
    scope: SubscriptionScope,
}

impl LibraryAggregator {
    /// Create an aggregator. Call [`attach`](Self::attach) to start the reducer.
    pub fn new(store: Arc<dyn LibraryStore>, downloads: Arc<dyn DownloadManager>) -> Self {
        let (events, pending) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(LibraryState::default());
        Self {
            store,
            downloads,
            events,
            pending_events: Arc::new(Mutex::new(pending)),
            state_tx: Arc::new(state_tx),
            attached: AtomicBool::new(false),
            scope: SubscriptionScope::new("library"),
        }
    }

    /// Start the reducer and subscribe to every source. Returns `false` if
    /// already attached.
    pub fn attach(&self) -> bool {
        if self
            .attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let pending_events = Arc::clone(&self.pending_events);
        let state_tx = Arc::clone(&self.state_tx);
        self.scope.spawn(async move {
            let mut events = pending_events.lock_owned().await;
            while let Some(event) = events.recv().await {
                state_tx.send_modify(|state| *state = LibraryState::reduce(state, event));
            }
            debug!("Library reducer stopped");
        });

        self.forward(self.store.playlists(), LibraryEvent::Playlists);
        self.forward(self.store.favorites(), LibraryEvent::Favorites);
        self.forward(self.store.history(), LibraryEvent::History);
        self.forward(self.downloads.downloads(), LibraryEvent::Downloads);
        self.forward(self.downloads.progress(), LibraryEvent::DownloadProgress);
        self.forward(self.downloads.statuses(), LibraryEvent::DownloadStatuses);

        info!("Library aggregator attached");
        true
    }

    fn forward<T>(&self, mut rx: watch::Receiver<T>, wrap: fn(T) -> LibraryEvent)
    where
        T: Clone + Send + Sync + 'static,
    {
        let events = self.events.clone();
        self.scope.spawn(async move {
            loop {
                let value = rx.borrow_and_update().clone();
                if events.send(wrap(value)).is_err() {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    fn dispatch(&self, event: LibraryEvent) {
        if self.events.send(event).is_err() {
            debug!("Library reducer is gone, dropping event");
        }
    }

    fn fail(&self, action: &str, error: &Error) {
        warn!("Library action '{}' failed: {}", action, error);
        self.dispatch(LibraryEvent::Failed(error.to_string()));
    }

    /// Current snapshot.
    pub fn state(&self) -> LibraryState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<LibraryState> {
        self.state_tx.subscribe()
    }

    /// Open the create-playlist dialog.
    pub fn show_create_dialog(&self) {
        self.dispatch(LibraryEvent::ShowCreateDialog);
    }

    /// Close the create-playlist dialog.
    pub fn hide_create_dialog(&self) {
        self.dispatch(LibraryEvent::HideCreateDialog);
    }

    /// Dismiss the error.
    pub fn clear_error(&self) {
        self.dispatch(LibraryEvent::ClearError);
    }

    /// Create a playlist and close the dialog.
    pub async fn create_playlist(
        &self,
        name: &str,
        description: Option<String>,
        is_private: bool,
    ) -> Result<Playlist> {
        if let Err(e) = validate_playlist_name(name) {
            self.fail("create playlist", &e);
            return Err(e);
        }
        match self
            .store
            .create_playlist(name.trim().to_string(), description, is_private)
            .await
        {
            Ok(playlist) => {
                self.dispatch(LibraryEvent::HideCreateDialog);
                Ok(playlist)
            }
            Err(e) => {
                self.fail("create playlist", &e);
                Err(e)
            }
        }
    }

    /// Rename a playlist in place.
    pub async fn rename_playlist(&self, playlist_id: &str, name: &str) -> Result<()> {
        if let Err(e) = validate_playlist_name(name) {
            self.fail("rename playlist", &e);
            return Err(e);
        }
        let update = PlaylistUpdate {
            name: Some(name.trim().to_string()),
            ..PlaylistUpdate::default()
        };
        self.update(playlist_id, update, "rename playlist").await
    }

    /// Change a playlist's privacy in place.
    pub async fn set_playlist_privacy(&self, playlist_id: &str, is_private: bool) -> Result<()> {
        let update = PlaylistUpdate {
            is_private: Some(is_private),
            ..PlaylistUpdate::default()
        };
        self.update(playlist_id, update, "set playlist privacy").await
    }

    async fn update(&self, playlist_id: &str, update: PlaylistUpdate, action: &str) -> Result<()> {
        self.store
            .update_playlist(playlist_id, update)
            .await
            .map(|_| ())
            .inspect_err(|e| self.fail(action, e))
    }

    /// Delete a playlist.
    pub async fn delete_playlist(&self, playlist_id: &str) -> Result<()> {
        self.store
            .delete_playlist(playlist_id)
            .await
            .inspect_err(|e| self.fail("delete playlist", e))
    }

    /// Remove a track from favorites.
    pub async fn remove_favorite(&self, video_id: &str) -> Result<()> {
        self.store
            .remove_favorite(video_id)
            .await
            .inspect_err(|e| self.fail("remove favorite", e))
    }

    /// Clear listening history.
    pub async fn clear_history(&self) -> Result<()> {
        self.store
            .clear_history()
            .await
            .inspect_err(|e| self.fail("clear history", e))
    }

    /// Delete a stored download.
    pub async fn delete_download(&self, video_id: &str) -> Result<()> {
        self.downloads
            .delete_download(video_id)
            .await
            .inspect_err(|e| self.fail("delete download", e))
    }

    /// Abort the reducer and every forwarding task; a later
    /// [`attach`](Self::attach) resubscribes.
    pub fn shutdown(&self) {
        self.scope.cancel_all();
        self.attached.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for LibraryAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryAggregator")
            .field("attached", &self.attached.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
