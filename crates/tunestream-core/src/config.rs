//! Application configuration management.
//!
//! Handles loading, saving, and validating the tuning knobs of the
//! coordination layer: playback policy, download concurrency, enrichment
//! pacing, and search debounce/timeouts.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default number of tracks downloaded at the same time.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Minimum allowed concurrent downloads.
pub const MIN_CONCURRENT_DOWNLOADS: usize = 1;

/// Maximum allowed concurrent downloads.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 6;

/// Position past which "previous" restarts the current track.
pub const DEFAULT_REWIND_THRESHOLD_MS: u64 = 3_000;

/// Playback policy settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Position (ms) past which skip-to-previous restarts the current track.
    pub rewind_threshold_ms: u64,
    /// Timeout for resolving a playable stream URL.
    pub stream_url_timeout_ms: u64,
    /// Timeout for the best-effort related tracks fetch.
    pub related_tracks_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            rewind_threshold_ms: DEFAULT_REWIND_THRESHOLD_MS,
            stream_url_timeout_ms: 20_000,
            related_tracks_timeout_ms: 10_000,
        }
    }
}

impl PlaybackConfig {
    /// Stream URL resolution timeout as a `Duration`.
    #[must_use]
    pub const fn stream_url_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_url_timeout_ms)
    }

    /// Related tracks timeout as a `Duration`.
    #[must_use]
    pub const fn related_tracks_timeout(&self) -> Duration {
        Duration::from_millis(self.related_tracks_timeout_ms)
    }
}

/// Playlist download settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum number of tracks downloading at the same time.
    pub max_concurrent_downloads: usize,
    /// Timeout for the duration back-fill lookup.
    pub metadata_timeout_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            metadata_timeout_ms: 10_000,
        }
    }
}

impl DownloadConfig {
    /// Validate and clamp the `max_concurrent_downloads` value.
    pub fn validate(&mut self) {
        self.max_concurrent_downloads = self
            .max_concurrent_downloads
            .clamp(MIN_CONCURRENT_DOWNLOADS, MAX_CONCURRENT_DOWNLOADS);
    }

    /// Metadata lookup timeout as a `Duration`.
    #[must_use]
    pub const fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }
}

/// Background metadata enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Number of stubs resolved per batch.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_delay_ms: u64,
    /// Timeout for one stub fetch.
    pub fetch_timeout_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay_ms: 300,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl EnrichmentConfig {
    /// Batch size is never zero.
    pub fn validate(&mut self) {
        self.batch_size = self.batch_size.max(1);
    }

    /// Pause between batches as a `Duration`.
    #[must_use]
    pub const fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Per-stub fetch timeout as a `Duration`.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Search debounce and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    /// Quiescence window before a suggestions fetch.
    pub debounce_ms: u64,
    /// Timeout for the suggestions fetch.
    pub suggestions_timeout_ms: u64,
    /// Timeout for the summary search.
    pub summary_timeout_ms: u64,
    /// Timeout for a single-category search.
    pub filter_timeout_ms: u64,
    /// Number of recent searches to remember.
    pub max_recent_searches: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            suggestions_timeout_ms: 5_000,
            summary_timeout_ms: 15_000,
            filter_timeout_ms: 12_000,
            max_recent_searches: 10,
        }
    }
}

impl SearchConfig {
    /// Debounce window as a `Duration`.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Suggestions timeout as a `Duration`.
    #[must_use]
    pub const fn suggestions_timeout(&self) -> Duration {
        Duration::from_millis(self.suggestions_timeout_ms)
    }

    /// Summary search timeout as a `Duration`.
    #[must_use]
    pub const fn summary_timeout(&self) -> Duration {
        Duration::from_millis(self.summary_timeout_ms)
    }

    /// Filtered search timeout as a `Duration`.
    #[must_use]
    pub const fn filter_timeout(&self) -> Duration {
        Duration::from_millis(self.filter_timeout_ms)
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Playback policy.
    #[serde(default)]
    pub playback: PlaybackConfig,
    /// Playlist download settings.
    #[serde(default)]
    pub downloads: DownloadConfig,
    /// Metadata enrichment settings.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    /// Search settings.
    #[serde(default)]
    pub search: SearchConfig,
}

impl AppConfig {
    /// Clamp every section to its allowed range.
    pub fn validate(&mut self) {
        self.downloads.validate();
        self.enrichment.validate();
    }

    /// Load configuration from the default location, or create defaults if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `path`, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found, using defaults");
            let config = Self::default();
            if let Err(e) = config.save_to(path) {
                warn!("Failed to save default config: {}", e);
            }
            return Ok(config);
        }

        let content = fs::read_to_string(path).map_err(|e| Error::FileSystem {
            path: path.to_path_buf(),
            message: format!("Failed to read config file: {e}"),
        })?;

        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;
        config.validate();

        info!("Loaded config from {}", path.display());
        debug!(
            "Up to {} concurrent downloads, {}ms search debounce",
            config.downloads.max_concurrent_downloads, config.search.debounce_ms
        );

        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| Error::FileSystem {
                path: parent.to_path_buf(),
                message: format!("Failed to create config directory: {e}"),
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| Error::FileSystem {
            path: path.to_path_buf(),
            message: format!("Failed to write config file: {e}"),
        })?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the path to the default config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("tunestream")
        .join("config.json")
}

/// Configuration manager that owns the loaded config and where it lives.
#[derive(Debug)]
pub struct ConfigManager {
    config: AppConfig,
    path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager backed by the default config file.
    pub fn new() -> Result<Self> {
        Self::with_path(config_file_path())
    }

    /// Create a config manager backed by a specific file.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = AppConfig::load_from(&path)?;
        Ok(Self { config, path })
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Path of the backing config file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the configuration and persist it.
    pub fn update(&mut self, mut config: AppConfig) -> Result<()> {
        config.validate();
        self.config = config;
        self.config.save_to(&self.path)
    }

    /// Reset to default configuration.
    pub fn reset(&mut self) -> Result<()> {
        self.config = AppConfig::default();
        self.config.save_to(&self.path)
    }
}
