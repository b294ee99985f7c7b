//! Plain value records shared by every component.
//!
//! None of these types carry behavior beyond small derived queries; they are
//! replaced wholesale when upstream data changes.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static VIDEO_ID_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").ok());

/// Check that `id` has the shape of a video identifier.
#[must_use]
pub fn is_valid_video_id(id: &str) -> bool {
    VIDEO_ID_RE.as_ref().is_some_and(|re| re.is_match(id))
}

/// A playable track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Track {
    /// Video identifier; the track's identity.
    pub video_id: String,
    /// Display title. Empty for stubs that were never hydrated.
    pub title: String,
    /// Artist or channel display name.
    pub artist: String,
    /// Thumbnail URL.
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Duration in seconds, 0 when unknown.
    #[serde(default)]
    pub duration_secs: u64,
    /// View count, if known.
    #[serde(default)]
    pub view_count: Option<u64>,
    /// Album name, if known.
    #[serde(default)]
    pub album: Option<String>,
    /// Channel identifier, if known.
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Explicit content flag.
    #[serde(default)]
    pub is_explicit: bool,
}

impl Track {
    /// Create a track with the required fields.
    pub fn new(
        video_id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            title: title.into(),
            artist: artist.into(),
            ..Self::default()
        }
    }

    /// A track that only carries its identifier.
    pub fn stub(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            ..Self::default()
        }
    }

    /// Set the duration.
    #[must_use]
    pub const fn with_duration(mut self, duration_secs: u64) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    /// Set the thumbnail URL.
    #[must_use]
    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    /// Whether the duration is unknown.
    #[must_use]
    pub const fn has_unknown_duration(&self) -> bool {
        self.duration_secs == 0
    }

    /// Whether this record still awaits metadata.
    #[must_use]
    pub fn is_stub(&self) -> bool {
        self.title.trim().is_empty()
    }

    /// Human readable duration ("3:07", "1:02:03").
    #[must_use]
    pub fn formatted_duration(&self) -> String {
        let hours = self.duration_secs / 3600;
        let minutes = (self.duration_secs % 3600) / 60;
        let seconds = self.duration_secs % 60;
        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes}:{seconds:02}")
        }
    }
}

/// A user or remote playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Playlist {
    /// Playlist identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Thumbnail URL.
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Number of tracks.
    #[serde(default)]
    pub track_count: usize,
    /// Whether the playlist is private.
    #[serde(default)]
    pub is_private: bool,
    /// Whether the playlist belongs to the local user.
    #[serde(default)]
    pub is_owned: bool,
}

impl Playlist {
    /// Create a playlist with a name and identifier.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether this record still awaits metadata.
    #[must_use]
    pub fn is_stub(&self) -> bool {
        self.name.trim().is_empty()
    }
}

/// In-place changes to a playlist. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaylistUpdate {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New privacy flag.
    pub is_private: Option<bool>,
}

impl PlaylistUpdate {
    /// Apply the update to a playlist.
    pub fn apply(&self, playlist: &mut Playlist) {
        if let Some(name) = &self.name {
            playlist.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            playlist.description = Some(description.clone());
        }
        if let Some(is_private) = self.is_private {
            playlist.is_private = is_private;
        }
    }
}

/// A playlist with its track list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlaylistDetails {
    /// Playlist header.
    pub playlist: Playlist,
    /// Tracks in playlist order.
    pub tracks: Vec<Track>,
}

/// Artist page data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ArtistDetails {
    /// Channel/artist identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Subscriber count, if known.
    #[serde(default)]
    pub subscriber_count: Option<u64>,
    /// Most popular tracks.
    #[serde(default)]
    pub top_tracks: Vec<Track>,
    /// Playlists and albums.
    #[serde(default)]
    pub playlists: Vec<Playlist>,
}

/// Ordered tracks plus a cursor.
///
/// `current_index` is `None` (stopped) or strictly less than `tracks.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Queue {
    tracks: Vec<Track>,
    current_index: Option<usize>,
}

impl Queue {
    /// Build a queue; an out-of-range index leaves the queue stopped.
    #[must_use]
    pub fn new(tracks: Vec<Track>, current_index: Option<usize>) -> Self {
        let current_index = current_index.filter(|index| *index < tracks.len());
        Self {
            tracks,
            current_index,
        }
    }

    /// Tracks in queue order.
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Cursor position.
    #[must_use]
    pub const fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Track under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&Track> {
        self.current_index.and_then(|index| self.tracks.get(index))
    }

    /// Number of queued tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Whether `index` addresses a queued track.
    #[must_use]
    pub fn contains_index(&self, index: usize) -> bool {
        index < self.tracks.len()
    }

    /// Position of a track by video id.
    #[must_use]
    pub fn position_of(&self, video_id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.video_id == video_id)
    }

    /// Index after the cursor, if there is one.
    #[must_use]
    pub fn next_index(&self) -> Option<usize> {
        self.current_index
            .map(|index| index + 1)
            .filter(|index| *index < self.tracks.len())
    }

    /// Index before the cursor, if there is one.
    #[must_use]
    pub fn previous_index(&self) -> Option<usize> {
        self.current_index.and_then(|index| index.checked_sub(1))
    }
}

/// Search result categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchFilter {
    /// Songs only.
    Songs,
    /// Music videos only.
    Videos,
    /// Albums only.
    Albums,
    /// Artists only.
    Artists,
    /// Playlists only.
    Playlists,
}

impl std::fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Songs => write!(f, "Songs"),
            Self::Videos => write!(f, "Videos"),
            Self::Albums => write!(f, "Albums"),
            Self::Artists => write!(f, "Artists"),
            Self::Playlists => write!(f, "Playlists"),
        }
    }
}

/// One row of a search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SearchItem {
    /// A song or video.
    Track(Track),
    /// An album or playlist.
    Playlist(Playlist),
    /// An artist.
    Artist(ArtistDetails),
}

/// Unfiltered search result, grouped by category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SearchSummary {
    /// Top result, if the service picked one.
    #[serde(default)]
    pub top_result: Option<SearchItem>,
    /// Matching songs.
    #[serde(default)]
    pub songs: Vec<Track>,
    /// Matching videos.
    #[serde(default)]
    pub videos: Vec<Track>,
    /// Matching albums.
    #[serde(default)]
    pub albums: Vec<Playlist>,
    /// Matching artists.
    #[serde(default)]
    pub artists: Vec<ArtistDetails>,
    /// Matching playlists.
    #[serde(default)]
    pub playlists: Vec<Playlist>,
}

impl SearchSummary {
    /// Whether every category is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.top_result.is_none()
            && self.songs.is_empty()
            && self.videos.is_empty()
            && self.albums.is_empty()
            && self.artists.is_empty()
            && self.playlists.is_empty()
    }
}

/// A locally stored record awaiting metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Stub {
    /// Track known only by video id.
    Track(String),
    /// Playlist known only by id.
    Playlist(String),
}

impl Stub {
    /// The stored identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Track(id) | Self::Playlist(id) => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks(n: usize) -> Vec<Track> {
        (0..n)
            .map(|i| Track::new(format!("vid{i:08}"), format!("Song {i}"), "Artist"))
            .collect()
    }

    #[test]
    fn test_video_id_validation() {
        assert!(is_valid_video_id("dQw4w9WgXcQ"));
        assert!(is_valid_video_id("a-b_c1234XY"));
        assert!(!is_valid_video_id("short"));
        assert!(!is_valid_video_id("dQw4w9WgXcQ!"));
        assert!(!is_valid_video_id(""));
    }

    #[test]
    fn test_track_stub_and_duration() {
        let stub = Track::stub("dQw4w9WgXcQ");
        assert!(stub.is_stub());
        assert!(stub.has_unknown_duration());

        let track = Track::new("dQw4w9WgXcQ", "Song", "Artist").with_duration(212);
        assert!(!track.is_stub());
        assert_eq!(track.formatted_duration(), "3:32");
        assert_eq!(track.clone().with_duration(3723).formatted_duration(), "1:02:03");
    }

    #[test]
    fn test_queue_out_of_range_index_is_stopped() {
        let queue = Queue::new(tracks(2), Some(2));
        assert_eq!(queue.current_index(), None);
        assert!(queue.current().is_none());

        let empty = Queue::new(Vec::new(), Some(0));
        assert_eq!(empty.current_index(), None);
    }

    #[test]
    fn test_queue_neighbours() {
        let queue = Queue::new(tracks(3), Some(1));
        assert_eq!(queue.previous_index(), Some(0));
        assert_eq!(queue.next_index(), Some(2));

        let last = Queue::new(tracks(3), Some(2));
        assert_eq!(last.next_index(), None);

        let first = Queue::new(tracks(3), Some(0));
        assert_eq!(first.previous_index(), None);
    }

    #[test]
    fn test_queue_resolves_by_video_id() {
        let queue = Queue::new(tracks(3), Some(0));
        // A refreshed copy of the track still resolves
        let refreshed = Track::new("vid00000002", "Song 2 (Remastered)", "Artist");
        assert_eq!(queue.position_of(&refreshed.video_id), Some(2));
        assert_eq!(queue.position_of("missing"), None);
    }

    #[test]
    fn test_playlist_update_in_place() {
        let mut playlist = Playlist::new("PL1", "Road trip");
        playlist.track_count = 12;

        PlaylistUpdate {
            name: Some("Road trip 2026".to_string()),
            is_private: Some(true),
            ..PlaylistUpdate::default()
        }
        .apply(&mut playlist);

        assert_eq!(playlist.name, "Road trip 2026");
        assert!(playlist.is_private);
        assert_eq!(playlist.track_count, 12);
        assert_eq!(playlist.id, "PL1");
    }

    #[test]
    fn test_search_item_tagged_serialization() {
        let item = SearchItem::Track(Track::new("dQw4w9WgXcQ", "Song", "Artist"));
        let json = serde_json::to_value(&item).expect("serialize");
        assert_eq!(json["type"], "Track");
        assert_eq!(json["data"]["video_id"], "dQw4w9WgXcQ");
    }

    #[test]
    fn test_stub_id() {
        assert_eq!(Stub::Track("abc".to_string()).id(), "abc");
        assert_eq!(Stub::Playlist("PL1".to_string()).id(), "PL1");
        assert!(Playlist::new("PL1", "").is_stub());
    }
}
