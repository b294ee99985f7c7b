//! Remote content service boundary.
//!
//! Every call is fallible and single-shot. Callers wrap each call in
//! [`with_timeout`] so that an expired timer and an application-level failure
//! stay distinguishable: the former yields `None`, the latter `Some(Err(_))`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::model::{ArtistDetails, PlaylistDetails, SearchFilter, SearchItem, SearchSummary, Track};

/// Remote catalogue: search, details, and stream resolution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Autocomplete suggestions for a partial query.
    async fn search_suggestions(&self, query: &str) -> Result<Vec<String>>;

    /// Multi-category search.
    async fn search_summary(&self, query: &str) -> Result<SearchSummary>;

    /// Search restricted to one category.
    async fn search_filtered(&self, query: &str, filter: SearchFilter) -> Result<Vec<SearchItem>>;

    /// Full metadata for one track.
    async fn track_details(&self, video_id: &str) -> Result<Track>;

    /// Playlist header and track list.
    async fn playlist_details(&self, playlist_id: &str) -> Result<PlaylistDetails>;

    /// Artist page.
    async fn artist_details(&self, artist_id: &str) -> Result<ArtistDetails>;

    /// Tracks related to `video_id`, used to extend an implicit queue.
    async fn related_tracks(&self, video_id: &str) -> Result<Vec<Track>>;

    /// Resolve a playable stream URL.
    async fn resolve_stream_url(&self, video_id: &str) -> Result<String>;
}

/// Await `future` for at most `limit`.
///
/// Returns `None` if the timer expired first; the future is dropped.
pub async fn with_timeout<T, F>(limit: Duration, future: F) -> Option<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(value) => Some(value),
        Err(_) => {
            debug!("Remote call timed out after {}ms", limit.as_millis());
            None
        }
    }
}
