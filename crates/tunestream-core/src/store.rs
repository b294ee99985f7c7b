//! Local library store: playlists, favorites, listening history, and
//! metadata stubs.
//!
//! [`LibraryStore`] is the boundary the aggregators depend on.
//! [`MemoryLibraryStore`] keeps everything in memory and can persist a JSON
//! snapshot of its contents.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{Playlist, PlaylistUpdate, Stub, Track};

/// Maximum number of history entries kept.
pub const MAX_HISTORY_ENTRIES: usize = 200;

/// Check that a playlist name is usable.
pub fn validate_playlist_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(
            "Playlist name cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > 150 {
        return Err(Error::Validation(
            "Playlist name is too long (max 150 characters)".to_string(),
        ));
    }
    Ok(())
}

/// Persistence of playlists, favorites and history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Stream of playlists.
    fn playlists(&self) -> watch::Receiver<Vec<Playlist>>;

    /// Stream of favorite tracks, most recently added first.
    fn favorites(&self) -> watch::Receiver<Vec<Track>>;

    /// Stream of listening history, most recent first.
    fn history(&self) -> watch::Receiver<Vec<Track>>;

    /// Create an owned playlist.
    async fn create_playlist(
        &self,
        name: String,
        description: Option<String>,
        is_private: bool,
    ) -> Result<Playlist>;

    /// Update a playlist in place.
    async fn update_playlist(&self, playlist_id: &str, update: PlaylistUpdate) -> Result<Playlist>;

    /// Delete a playlist and its track links.
    async fn delete_playlist(&self, playlist_id: &str) -> Result<()>;

    /// Append a track to a playlist.
    async fn add_to_playlist(&self, playlist_id: &str, track: &Track) -> Result<()>;

    /// Tracks of a playlist in order.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>>;

    /// Whether a track is a favorite.
    async fn is_favorite(&self, video_id: &str) -> Result<bool>;

    /// Flip the favorite flag of a track; returns the new flag.
    async fn toggle_favorite(&self, track: &Track) -> Result<bool>;

    /// Remove a track from favorites.
    async fn remove_favorite(&self, video_id: &str) -> Result<()>;

    /// Record a track as just played.
    async fn record_history(&self, track: &Track) -> Result<()>;

    /// Forget the listening history.
    async fn clear_history(&self) -> Result<()>;

    /// Records that exist but were never hydrated.
    async fn pending_stubs(&self) -> Result<Vec<Stub>>;

    /// Replace stored metadata for a track everywhere it appears.
    async fn save_track_metadata(&self, track: &Track) -> Result<()>;

    /// Replace stored metadata for a playlist, keeping local flags.
    async fn save_playlist_metadata(&self, playlist: &Playlist) -> Result<()>;
}

/// Serializable contents of a [`MemoryLibraryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LibrarySnapshot {
    /// Playlists in display order.
    #[serde(default)]
    pub playlists: Vec<Playlist>,
    /// Playlist id -> ordered track ids.
    #[serde(default)]
    pub playlist_tracks: HashMap<String, Vec<String>>,
    /// Every known track by video id, including stubs.
    #[serde(default)]
    pub tracks: HashMap<String, Track>,
    /// Favorite track ids, most recent first.
    #[serde(default)]
    pub favorites: Vec<String>,
    /// History track ids, most recent first.
    #[serde(default)]
    pub history: Vec<String>,
    /// Counter for locally created playlist ids.
    #[serde(default)]
    pub next_playlist_id: u64,
}

impl LibrarySnapshot {
    fn resolve(&self, ids: &[String]) -> Vec<Track> {
        ids.iter()
            .map(|id| self.tracks.get(id).cloned().unwrap_or_else(|| Track::stub(id.clone())))
            .collect()
    }

    fn remember(&mut self, track: &Track) {
        match self.tracks.get(&track.video_id) {
            // Never downgrade hydrated metadata to a stub
            Some(existing) if track.is_stub() && !existing.is_stub() => {}
            _ => {
                self.tracks.insert(track.video_id.clone(), track.clone());
            }
        }
    }

    fn playlist_mut(&mut self, playlist_id: &str) -> Result<&mut Playlist> {
        self.playlists
            .iter_mut()
            .find(|p| p.id == playlist_id)
            .ok_or_else(|| Error::NotFound(format!("playlist {playlist_id}")))
    }
}

/// In-memory [`LibraryStore`] with JSON snapshot persistence.
pub struct MemoryLibraryStore {
    data: RwLock<LibrarySnapshot>,
    playlists_tx: watch::Sender<Vec<Playlist>>,
    favorites_tx: watch::Sender<Vec<Track>>,
    history_tx: watch::Sender<Vec<Track>>,
}

impl MemoryLibraryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::from_snapshot(LibrarySnapshot::default())
    }

    /// Create a store holding `snapshot`.
    #[must_use]
    pub fn from_snapshot(snapshot: LibrarySnapshot) -> Self {
        let (playlists_tx, _) = watch::channel(snapshot.playlists.clone());
        let (favorites_tx, _) = watch::channel(snapshot.resolve(&snapshot.favorites));
        let (history_tx, _) = watch::channel(snapshot.resolve(&snapshot.history));
        Self {
            data: RwLock::new(snapshot),
            playlists_tx,
            favorites_tx,
            history_tx,
        }
    }

    /// Load a store from a JSON snapshot file; a missing file yields an empty store.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Library snapshot {} not found, starting empty", path.display());
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path).map_err(|e| Error::FileSystem {
            path: path.to_path_buf(),
            message: format!("Failed to read library snapshot: {e}"),
        })?;
        let snapshot: LibrarySnapshot = serde_json::from_str(&content)?;
        info!(
            "Loaded library snapshot with {} playlists and {} tracks",
            snapshot.playlists.len(),
            snapshot.tracks.len()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current contents as JSON to `path`.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let content = {
            let data = self.data.read().await;
            serde_json::to_string_pretty(&*data)?
        };
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| Error::FileSystem {
                path: parent.to_path_buf(),
                message: format!("Failed to create library directory: {e}"),
            })?;
        }
        fs::write(path, content).map_err(|e| Error::FileSystem {
            path: path.to_path_buf(),
            message: format!("Failed to write library snapshot: {e}"),
        })?;
        debug!("Saved library snapshot to {}", path.display());
        Ok(())
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> LibrarySnapshot {
        self.data.read().await.clone()
    }

    /// Register a track known only by id, to be hydrated later.
    pub async fn add_track_stub(&self, video_id: impl Into<String>) {
        let mut data = self.data.write().await;
        data.remember(&Track::stub(video_id));
    }

    /// Register a remote playlist known only by id, to be hydrated later.
    pub async fn add_playlist_stub(&self, playlist_id: impl Into<String>) {
        let mut data = self.data.write().await;
        let id = playlist_id.into();
        if !data.playlists.iter().any(|p| p.id == id) {
            data.playlists.push(Playlist::new(id, ""));
            self.playlists_tx.send_replace(data.playlists.clone());
        }
    }

    fn publish_all(&self, data: &LibrarySnapshot) {
        self.playlists_tx.send_replace(data.playlists.clone());
        self.favorites_tx.send_replace(data.resolve(&data.favorites));
        self.history_tx.send_replace(data.resolve(&data.history));
    }
}

impl Default for MemoryLibraryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryLibraryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLibraryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl LibraryStore for MemoryLibraryStore {
    fn playlists(&self) -> watch::Receiver<Vec<Playlist>> {
        self.playlists_tx.subscribe()
    }

    fn favorites(&self) -> watch::Receiver<Vec<Track>> {
        self.favorites_tx.subscribe()
    }

    fn history(&self) -> watch::Receiver<Vec<Track>> {
        self.history_tx.subscribe()
    }

    async fn create_playlist(
        &self,
        name: String,
        description: Option<String>,
        is_private: bool,
    ) -> Result<Playlist> {
        validate_playlist_name(&name)?;
        let mut data = self.data.write().await;
        let id = format!("LP{}", data.next_playlist_id);
        data.next_playlist_id += 1;

        let playlist = Playlist {
            id: id.clone(),
            name: name.trim().to_string(),
            description,
            is_private,
            is_owned: true,
            ..Playlist::default()
        };
        data.playlists.push(playlist.clone());
        data.playlist_tracks.insert(id, Vec::new());
        self.playlists_tx.send_replace(data.playlists.clone());

        info!("Created playlist {} ({})", playlist.name, playlist.id);
        Ok(playlist)
    }

    async fn update_playlist(&self, playlist_id: &str, update: PlaylistUpdate) -> Result<Playlist> {
        if let Some(name) = &update.name {
            validate_playlist_name(name)?;
        }
        let mut data = self.data.write().await;
        let playlist = data.playlist_mut(playlist_id)?;
        update.apply(playlist);
        let updated = playlist.clone();
        self.playlists_tx.send_replace(data.playlists.clone());

        debug!("Updated playlist {}", playlist_id);
        Ok(updated)
    }

    async fn delete_playlist(&self, playlist_id: &str) -> Result<()> {
        let mut data = self.data.write().await;
        let before = data.playlists.len();
        data.playlists.retain(|p| p.id != playlist_id);
        if data.playlists.len() == before {
            return Err(Error::NotFound(format!("playlist {playlist_id}")));
        }
        data.playlist_tracks.remove(playlist_id);
        self.playlists_tx.send_replace(data.playlists.clone());

        info!("Deleted playlist {}", playlist_id);
        Ok(())
    }

    async fn add_to_playlist(&self, playlist_id: &str, track: &Track) -> Result<()> {
        let mut data = self.data.write().await;
        data.playlist_mut(playlist_id)?;
        data.remember(track);

        let ids = data.playlist_tracks.entry(playlist_id.to_string()).or_default();
        if ids.contains(&track.video_id) {
            debug!("Track {} already in playlist {}", track.video_id, playlist_id);
            return Ok(());
        }
        ids.push(track.video_id.clone());
        let count = ids.len();

        let playlist = data.playlist_mut(playlist_id)?;
        playlist.track_count = count;
        if playlist.thumbnail_url.is_none() {
            playlist.thumbnail_url.clone_from(&track.thumbnail_url);
        }
        self.playlists_tx.send_replace(data.playlists.clone());
        Ok(())
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        let data = self.data.read().await;
        if !data.playlists.iter().any(|p| p.id == playlist_id) {
            return Err(Error::NotFound(format!("playlist {playlist_id}")));
        }
        let ids = data.playlist_tracks.get(playlist_id).cloned().unwrap_or_default();
        Ok(data.resolve(&ids))
    }

    async fn is_favorite(&self, video_id: &str) -> Result<bool> {
        let data = self.data.read().await;
        Ok(data.favorites.iter().any(|id| id == video_id))
    }

    async fn toggle_favorite(&self, track: &Track) -> Result<bool> {
        let mut data = self.data.write().await;
        let now_favorite = if let Some(pos) = data.favorites.iter().position(|id| *id == track.video_id) {
            data.favorites.remove(pos);
            false
        } else {
            data.remember(track);
            data.favorites.insert(0, track.video_id.clone());
            true
        };
        self.favorites_tx.send_replace(data.resolve(&data.favorites));
        Ok(now_favorite)
    }

    async fn remove_favorite(&self, video_id: &str) -> Result<()> {
        let mut data = self.data.write().await;
        data.favorites.retain(|id| id != video_id);
        self.favorites_tx.send_replace(data.resolve(&data.favorites));
        Ok(())
    }

    async fn record_history(&self, track: &Track) -> Result<()> {
        let mut data = self.data.write().await;
        data.remember(track);
        data.history.retain(|id| *id != track.video_id);
        data.history.insert(0, track.video_id.clone());
        data.history.truncate(MAX_HISTORY_ENTRIES);
        self.history_tx.send_replace(data.resolve(&data.history));
        Ok(())
    }

    async fn clear_history(&self) -> Result<()> {
        let mut data = self.data.write().await;
        data.history.clear();
        self.history_tx.send_replace(Vec::new());
        info!("Cleared listening history");
        Ok(())
    }

    async fn pending_stubs(&self) -> Result<Vec<Stub>> {
        let data = self.data.read().await;
        let mut track_ids: Vec<&String> = data
            .tracks
            .values()
            .filter(|t| t.is_stub())
            .map(|t| &t.video_id)
            .collect();
        track_ids.sort();

        let mut stubs: Vec<Stub> = track_ids.into_iter().map(|id| Stub::Track(id.clone())).collect();
        stubs.extend(
            data.playlists
                .iter()
                .filter(|p| p.is_stub())
                .map(|p| Stub::Playlist(p.id.clone())),
        );
        Ok(stubs)
    }

    async fn save_track_metadata(&self, track: &Track) -> Result<()> {
        let mut data = self.data.write().await;
        data.tracks.insert(track.video_id.clone(), track.clone());
        self.publish_all(&data);
        Ok(())
    }

    async fn save_playlist_metadata(&self, playlist: &Playlist) -> Result<()> {
        let mut data = self.data.write().await;
        let existing = data.playlist_mut(&playlist.id)?;
        let (is_private, is_owned) = (existing.is_private, existing.is_owned);
        *existing = Playlist {
            is_private,
            is_owned,
            ..playlist.clone()
        };
        self.playlists_tx.send_replace(data.playlists.clone());
        Ok(())
    }
}
