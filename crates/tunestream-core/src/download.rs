//! Download manager boundary and download records.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Result;
use crate::model::Track;

/// Status of a track download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Waiting for a download slot.
    Queued,
    /// Transfer in progress.
    Downloading,
    /// File stored locally.
    Completed,
    /// Download failed with an error.
    Failed(String),
}

impl DownloadStatus {
    /// Whether the download reached a terminal state.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "Queued"),
            Self::Downloading => write!(f, "Downloading"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed(msg) => write!(f, "Failed: {msg}"),
        }
    }
}

/// A downloaded (or downloading) track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// The track this download belongs to.
    pub track: Track,
    /// Size on disk in bytes.
    pub file_size_bytes: u64,
    /// Current status.
    pub status: DownloadStatus,
    /// Progress, 0.0 - 1.0.
    pub progress: f32,
    /// Location of the stored file once completed.
    pub file_path: Option<PathBuf>,
}

impl DownloadRecord {
    /// A freshly requested download.
    #[must_use]
    pub const fn queued(track: Track) -> Self {
        Self {
            track,
            file_size_bytes: 0,
            status: DownloadStatus::Queued,
            progress: 0.0,
            file_path: None,
        }
    }

    /// A finished download stored at `file_path`.
    #[must_use]
    pub const fn completed(track: Track, file_path: PathBuf, file_size_bytes: u64) -> Self {
        Self {
            track,
            file_size_bytes,
            status: DownloadStatus::Completed,
            progress: 1.0,
            file_path: Some(file_path),
        }
    }

    /// Video id of the referenced track.
    #[must_use]
    pub fn video_id(&self) -> &str {
        &self.track.video_id
    }
}

/// Per-track progress keyed by video id.
pub type ProgressMap = HashMap<String, f32>;

/// Per-track status keyed by video id.
pub type StatusMap = HashMap<String, DownloadStatus>;

/// External download manager that stores tracks locally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DownloadManager: Send + Sync {
    /// Download one track; resolves once the transfer finished or failed.
    async fn download_track(&self, track: &Track) -> Result<DownloadRecord>;

    /// Delete a stored download.
    async fn delete_download(&self, video_id: &str) -> Result<()>;

    /// Stream of downloaded tracks.
    fn downloads(&self) -> watch::Receiver<Vec<DownloadRecord>>;

    /// Stream of per-track progress.
    fn progress(&self) -> watch::Receiver<ProgressMap>;

    /// Stream of per-track status.
    fn statuses(&self) -> watch::Receiver<StatusMap>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(DownloadStatus::Queued.to_string(), "Queued");
        assert_eq!(
            DownloadStatus::Failed("no space".to_string()).to_string(),
            "Failed: no space"
        );
    }

    #[test]
    fn test_status_finished() {
        assert!(DownloadStatus::Completed.is_finished());
        assert!(DownloadStatus::Failed(String::new()).is_finished());
        assert!(!DownloadStatus::Downloading.is_finished());
        assert!(!DownloadStatus::Queued.is_finished());
    }

    #[test]
    fn test_record_constructors() {
        let track = Track::new("dQw4w9WgXcQ", "Song", "Artist");
        let queued = DownloadRecord::queued(track.clone());
        assert_eq!(queued.status, DownloadStatus::Queued);
        assert_eq!(queued.video_id(), "dQw4w9WgXcQ");

        let done = DownloadRecord::completed(track, PathBuf::from("/music/song.m4a"), 4_096);
        assert_eq!(done.progress, 1.0);
        assert_eq!(done.file_size_bytes, 4_096);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&DownloadStatus::Downloading).expect("serialize");
        assert_eq!(json, "\"downloading\"");
    }
}
