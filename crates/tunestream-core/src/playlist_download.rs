//! Whole-playlist downloads.
//!
//! [`PlaylistDownloader`] downloads every track of a playlist with bounded
//! concurrency, back-fills unknown durations first and publishes a
//! [`PlaylistDownloadState`] whose progress never goes backwards. Only one
//! playlist download may run at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::download::{DownloadManager, DownloadRecord};
use crate::error::{Error, Result};
use crate::model::{PlaylistDetails, Track};
use crate::remote::{ContentService, with_timeout};
use crate::store::LibraryStore;

/// Where the tracks of a playlist come from.
#[derive(Debug, Clone)]
pub enum PlaylistSource {
    /// A playlist in the local library, by id.
    Local(String),
    /// Already fetched remote details.
    Details(PlaylistDetails),
}

/// Snapshot of the playlist download in progress.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlaylistDownloadState {
    /// A playlist download is running.
    pub is_downloading: bool,
    /// Name of the playlist being downloaded.
    pub playlist_name: Option<String>,
    /// Title of the track most recently started.
    pub current_track: Option<String>,
    /// Fraction of finished tracks, 0.0 - 1.0, never decreasing during a run.
    pub progress: f32,
    /// Finished tracks (success or failure).
    pub completed: usize,
    /// Tracks in the run.
    pub total: usize,
    /// Outcome of the last run.
    pub message: Option<String>,
    /// Error of the last run.
    pub error: Option<String>,
}

/// Progress reported to a [`ProgressCallback`] after each track finishes.
#[derive(Debug, Clone)]
pub struct PlaylistDownloadProgress {
    /// Tracks finished so far.
    pub completed: usize,
    /// Tracks in the run.
    pub total: usize,
    /// `completed / total`.
    pub fraction: f32,
    /// The track that just finished.
    pub track: Track,
    /// Whether that track downloaded successfully.
    pub succeeded: bool,
}

/// Callback invoked after each track finishes.
pub type ProgressCallback = Box<dyn Fn(PlaylistDownloadProgress) + Send + Sync>;

/// Result of a playlist download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistDownloadSummary {
    /// Tracks attempted.
    pub total: usize,
    /// Tracks downloaded.
    pub succeeded: usize,
    /// Tracks that failed.
    pub failed: usize,
}

impl PlaylistDownloadSummary {
    /// User-facing outcome line.
    #[must_use]
    pub fn message(&self) -> String {
        format!("Downloaded {} of {} tracks", self.succeeded, self.total)
    }
}

fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (done as f32 / total as f32).min(1.0)
}

/// Clears the in-flight flag and resets the snapshot on every exit path.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    state: &'a watch::Sender<PlaylistDownloadState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| {
            s.is_downloading = false;
            s.current_track = None;
            s.progress = 0.0;
            s.completed = 0;
        });
        self.flag.store(false, Ordering::Release);
    }
}

/// Downloads playlists and single tracks.
pub struct PlaylistDownloader {
    downloads: Arc<dyn DownloadManager>,
    content: Arc<dyn ContentService>,
    store: Arc<dyn LibraryStore>,
    config: DownloadConfig,
    in_flight: AtomicBool,
    state_tx: watch::Sender<PlaylistDownloadState>,
}

impl PlaylistDownloader {
    /// Create a downloader.
    pub fn new(
        downloads: Arc<dyn DownloadManager>,
        content: Arc<dyn ContentService>,
        store: Arc<dyn LibraryStore>,
        mut config: DownloadConfig,
    ) -> Self {
        config.validate();
        let (state_tx, _) = watch::channel(PlaylistDownloadState::default());
        Self {
            downloads,
            content,
            store,
            config,
            in_flight: AtomicBool::new(false),
            state_tx,
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> PlaylistDownloadState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<PlaylistDownloadState> {
        self.state_tx.subscribe()
    }

    /// Whether a playlist download is running.
    pub fn is_downloading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.state_tx.send_modify(|s| {
            *s = PlaylistDownloadState {
                is_downloading: true,
                ..PlaylistDownloadState::default()
            };
        });
        Some(InFlight {
            flag: &self.in_flight,
            state: &self.state_tx,
        })
    }

    /// Download every track of a playlist.
    ///
    /// Fails with [`Error::Busy`] while another playlist download runs. Track
    /// failures do not abort the batch; they are counted in the summary.
    pub async fn download_playlist(
        &self,
        source: PlaylistSource,
        on_progress: Option<ProgressCallback>,
    ) -> Result<PlaylistDownloadSummary> {
        let Some(_in_flight) = self.begin() else {
            debug!("Playlist download rejected, one is already running");
            return Err(Error::Busy("Playlist download".to_string()));
        };

        let (name, tracks) = match self.resolve(source).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Could not load playlist tracks: {}", e);
                self.state_tx.send_modify(|s| s.error = Some(e.to_string()));
                return Err(e);
            }
        };
        if tracks.is_empty() {
            let e = Error::Validation("Playlist has no tracks".to_string());
            self.state_tx.send_modify(|s| s.error = Some(e.to_string()));
            return Err(e);
        }

        let total = tracks.len();
        info!("Downloading playlist '{}' ({} tracks)", name, total);
        self.state_tx.send_modify(|s| {
            s.playlist_name = Some(name.clone());
            s.total = total;
        });

        let permits = Semaphore::new(self.config.max_concurrent_downloads);
        let completed = AtomicUsize::new(0);
        let on_progress = on_progress.as_ref();

        let outcomes = join_all(tracks.into_iter().map(|track| {
            let permits = &permits;
            let completed = &completed;
            async move {
                let Ok(_permit) = permits.acquire().await else {
                    return false;
                };
                self.state_tx
                    .send_modify(|s| s.current_track = Some(track.title.clone()));

                let track = self.backfill_duration(track).await;
                let succeeded = match self.downloads.download_track(&track).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Download of {} failed: {}", track.video_id, e);
                        false
                    }
                };

                let done = completed.fetch_add(1, Ordering::AcqRel) + 1;
                let progress = fraction(done, total);
                self.state_tx.send_modify(|s| {
                    s.completed = s.completed.max(done);
                    s.progress = s.progress.max(progress);
                });
                if let Some(callback) = on_progress {
                    callback(PlaylistDownloadProgress {
                        completed: done,
                        total,
                        fraction: progress,
                        track,
                        succeeded,
                    });
                }
                succeeded
            }
        }))
        .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let summary = PlaylistDownloadSummary {
            total,
            succeeded,
            failed: total - succeeded,
        };
        info!(
            "Playlist '{}' finished: {} succeeded, {} failed",
            name, summary.succeeded, summary.failed
        );
        self.state_tx
            .send_modify(|s| s.message = Some(summary.message()));
        Ok(summary)
    }

    /// Download one track, back-filling its duration first.
    pub async fn download_track(&self, track: Track) -> Result<DownloadRecord> {
        let track = self.backfill_duration(track).await;
        self.downloads.download_track(&track).await
    }

    async fn resolve(&self, source: PlaylistSource) -> Result<(String, Vec<Track>)> {
        match source {
            PlaylistSource::Details(details) => Ok((details.playlist.name, details.tracks)),
            PlaylistSource::Local(playlist_id) => {
                let tracks = self.store.playlist_tracks(&playlist_id).await?;
                let name = self
                    .store
                    .playlists()
                    .borrow()
                    .iter()
                    .find(|p| p.id == playlist_id)
                    .map_or(playlist_id.clone(), |p| p.name.clone());
                Ok((name, tracks))
            }
        }
    }

    /// One best-effort lookup for tracks without a known duration.
    async fn backfill_duration(&self, mut track: Track) -> Track {
        if !track.has_unknown_duration() {
            return track;
        }
        match with_timeout(
            self.config.metadata_timeout(),
            self.content.track_details(&track.video_id),
        )
        .await
        {
            Some(Ok(details)) if !details.has_unknown_duration() => {
                debug!(
                    "Back-filled duration of {}: {}s",
                    track.video_id, details.duration_secs
                );
                track.duration_secs = details.duration_secs;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => debug!("Duration lookup for {} failed: {}", track.video_id, e),
            None => debug!("Duration lookup for {} timed out", track.video_id),
        }
        track
    }
}

impl std::fmt::Debug for PlaylistDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistDownloader")
            .field("in_flight", &self.is_downloading())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
