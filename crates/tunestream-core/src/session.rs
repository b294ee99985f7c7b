//! Application session.
//!
//! [`Session`] owns one instance of every component, built over shared
//! collaborators. Components are reached through the session rather than
//! through process-wide singletons.

use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::download::DownloadManager;
use crate::enrichment::MetadataEnricher;
use crate::library::LibraryAggregator;
use crate::playback::PlaybackAggregator;
use crate::player::PlayerEngine;
use crate::playlist_download::PlaylistDownloader;
use crate::remote::ContentService;
use crate::search::SearchOrchestrator;
use crate::store::LibraryStore;

/// External collaborators of a [`Session`].
#[derive(Clone)]
pub struct SessionDeps {
    /// Audio engine.
    pub player: Arc<dyn PlayerEngine>,
    /// Remote catalogue.
    pub content: Arc<dyn ContentService>,
    /// Download manager.
    pub downloads: Arc<dyn DownloadManager>,
    /// Local library.
    pub store: Arc<dyn LibraryStore>,
}

impl std::fmt::Debug for SessionDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDeps").finish_non_exhaustive()
    }
}

/// Every component of a running application.
#[derive(Debug)]
pub struct Session {
    config: AppConfig,
    playback: PlaybackAggregator,
    library: LibraryAggregator,
    playlist_downloads: PlaylistDownloader,
    enrichment: Arc<MetadataEnricher>,
    search: SearchOrchestrator,
}

impl Session {
    /// Build and attach every component. Must be called within a tokio runtime.
    pub fn start(deps: SessionDeps, mut config: AppConfig) -> Self {
        config.validate();

        let playback = PlaybackAggregator::new(
            Arc::clone(&deps.player),
            Arc::clone(&deps.content),
            Arc::clone(&deps.store),
            config.playback.clone(),
        );
        let library = LibraryAggregator::new(Arc::clone(&deps.store), Arc::clone(&deps.downloads));
        let playlist_downloads = PlaylistDownloader::new(
            Arc::clone(&deps.downloads),
            Arc::clone(&deps.content),
            Arc::clone(&deps.store),
            config.downloads.clone(),
        );
        let enrichment = Arc::new(MetadataEnricher::new(
            Arc::clone(&deps.content),
            Arc::clone(&deps.store),
            config.enrichment.clone(),
        ));
        let search = SearchOrchestrator::new(deps.content, config.search.clone());

        playback.attach();
        library.attach();
        search.attach();

        info!("Session started");
        Self {
            config,
            playback,
            library,
            playlist_downloads,
            enrichment,
            search,
        }
    }

    /// Effective configuration.
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Playback state and commands.
    pub const fn playback(&self) -> &PlaybackAggregator {
        &self.playback
    }

    /// Library state and actions.
    pub const fn library(&self) -> &LibraryAggregator {
        &self.library
    }

    /// Playlist and single-track downloads.
    pub const fn playlist_downloads(&self) -> &PlaylistDownloader {
        &self.playlist_downloads
    }

    /// Background metadata enrichment.
    pub const fn enrichment(&self) -> &Arc<MetadataEnricher> {
        &self.enrichment
    }

    /// Search.
    pub const fn search(&self) -> &SearchOrchestrator {
        &self.search
    }

    /// Abort every background subscription and pass.
    pub fn shutdown(&self) {
        self.playback.detach();
        self.library.shutdown();
        self.enrichment.shutdown();
        self.search.shutdown();
        info!("Session shut down");
    }
}
