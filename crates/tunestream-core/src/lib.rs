//! Tunestream Core Library
//!
//! State coordination for a music streaming client:
//! - Playback state aggregation over an external player engine
//! - Library aggregation (playlists, favorites, history, downloads)
//! - Whole-playlist downloads with bounded concurrency
//! - Background metadata enrichment of stub library rows
//! - Debounced search with per-call timeouts
//!
//! The player, remote catalogue, download manager and library store are
//! collaborators behind traits; [`Session`] wires one instance of every
//! component over them.
//!
//! ```rust,ignore
//! use tunestream_core::{AppConfig, Session, SessionDeps};
//!
//! let session = Session::start(deps, AppConfig::load()?);
//! session.search().set_query("boards of canada");
//! ```

pub mod config;
pub mod download;
pub mod enrichment;
pub mod error;
pub mod library;
pub mod logging;
pub mod model;
pub mod playback;
pub mod player;
pub mod playlist_download;
pub mod remote;
pub mod scope;
pub mod search;
pub mod session;
pub mod store;

pub use config::{
    AppConfig, ConfigManager, DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_REWIND_THRESHOLD_MS,
    DownloadConfig, EnrichmentConfig, MAX_CONCURRENT_DOWNLOADS, MIN_CONCURRENT_DOWNLOADS,
    PlaybackConfig, SearchConfig,
};
pub use download::{DownloadManager, DownloadRecord, DownloadStatus, ProgressMap, StatusMap};
pub use enrichment::{EnrichmentReport, MetadataEnricher};
pub use error::{Error, ErrorKind, Result};
pub use library::{LibraryAggregator, LibraryEvent, LibraryState};
pub use logging::{LogRotation, LoggingConfig, LoggingError, LoggingGuard};
pub use model::{
    ArtistDetails, Playlist, PlaylistDetails, PlaylistUpdate, Queue, SearchFilter, SearchItem,
    SearchSummary, Stub, Track, is_valid_video_id,
};
pub use playback::{PlaybackAggregator, PlaybackState, PreviousAction};
pub use player::{PlayerEngine, PlayerSignalSenders, PlayerSignals, RepeatMode, signal_channels};
pub use playlist_download::{
    PlaylistDownloadProgress, PlaylistDownloadState, PlaylistDownloadSummary, PlaylistDownloader,
    PlaylistSource, ProgressCallback,
};
pub use remote::{ContentService, with_timeout};
pub use scope::SubscriptionScope;
pub use search::{SEARCH_TIMED_OUT, SearchOrchestrator, SearchState};
pub use session::{Session, SessionDeps};
pub use store::{
    LibrarySnapshot, LibraryStore, MAX_HISTORY_ENTRIES, MemoryLibraryStore,
    validate_playlist_name,
};
