//! Background metadata enrichment.
//!
//! Library rows created from an id alone ("stubs") are hydrated from the
//! content service in small paced batches. Each resolved item is written back
//! immediately, so an interrupted pass keeps whatever it already fetched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::config::EnrichmentConfig;
use crate::model::Stub;
use crate::remote::{ContentService, with_timeout};
use crate::scope::SubscriptionScope;
use crate::store::LibraryStore;

/// Outcome of one enrichment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrichmentReport {
    /// Stubs found at the start of the pass.
    pub pending: usize,
    /// Stubs hydrated and saved.
    pub enriched: usize,
    /// Stubs whose fetch or save failed.
    pub failed: usize,
    /// Batches processed.
    pub batches: usize,
}

/// Resets the running flag when a pass ends or is aborted.
struct PassGuard(Arc<AtomicBool>);

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Hydrates stub tracks and playlists, one pass at a time.
pub struct MetadataEnricher {
    content: Arc<dyn ContentService>,
    store: Arc<dyn LibraryStore>,
    config: EnrichmentConfig,
    running: Arc<AtomicBool>,
    scope: SubscriptionScope,
}

impl MetadataEnricher {
    /// Create an enricher.
    pub fn new(
        content: Arc<dyn ContentService>,
        store: Arc<dyn LibraryStore>,
        mut config: EnrichmentConfig,
    ) -> Self {
        config.validate();
        Self {
            content,
            store,
            config,
            running: Arc::new(AtomicBool::new(false)),
            scope: SubscriptionScope::new("enrichment"),
        }
    }

    /// Whether a pass is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn begin(&self) -> Option<PassGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard(Arc::clone(&self.running)))
    }

    /// Start a pass in the background. Returns `false` if one is already running.
    pub fn trigger(self: &Arc<Self>) -> bool {
        let Some(guard) = self.begin() else {
            debug!("Enrichment pass already running");
            return false;
        };
        let this = Arc::clone(self);
        self.scope.spawn(async move {
            let _guard = guard;
            this.process().await;
        });
        true
    }

    /// Run a pass to completion. Returns `None` if one is already running.
    pub async fn run_pass(&self) -> Option<EnrichmentReport> {
        let _guard = self.begin()?;
        Some(self.process().await)
    }

    /// Abort a background pass.
    pub fn shutdown(&self) {
        self.scope.cancel_all();
    }

    async fn process(&self) -> EnrichmentReport {
        let stubs = match self.store.pending_stubs().await {
            Ok(stubs) => stubs,
            Err(e) => {
                warn!("Could not list metadata stubs: {}", e);
                return EnrichmentReport::default();
            }
        };
        let mut report = EnrichmentReport {
            pending: stubs.len(),
            ..EnrichmentReport::default()
        };
        if stubs.is_empty() {
            return report;
        }
        info!("Enriching {} stubs", stubs.len());

        for (i, batch) in stubs.chunks(self.config.batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.batch_delay()).await;
            }
            for stub in batch {
                if self.enrich(stub).await {
                    report.enriched += 1;
                } else {
                    report.failed += 1;
                }
            }
            report.batches += 1;
        }

        info!(
            "Enrichment pass done: {} enriched, {} failed",
            report.enriched, report.failed
        );
        report
    }

    async fn enrich(&self, stub: &Stub) -> bool {
        let limit = self.config.fetch_timeout();
        let saved = match stub {
            Stub::Track(video_id) => match with_timeout(limit, self.content.track_details(video_id)).await {
                Some(Ok(track)) => self.store.save_track_metadata(&track).await,
                Some(Err(e)) => Err(e),
                None => {
                    debug!("Metadata fetch for track {} timed out", video_id);
                    return false;
                }
            },
            Stub::Playlist(playlist_id) => {
                match with_timeout(limit, self.content.playlist_details(playlist_id)).await {
                    Some(Ok(details)) => self.store.save_playlist_metadata(&details.playlist).await,
                    Some(Err(e)) => Err(e),
                    None => {
                        debug!("Metadata fetch for playlist {} timed out", playlist_id);
                        return false;
                    }
                }
            }
        };

        match saved {
            Ok(()) => true,
            Err(e) => {
                debug!("Could not enrich {}: {}", stub.id(), e);
                false
            }
        }
    }
}

impl std::fmt::Debug for MetadataEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataEnricher")
            .field("running", &self.is_running())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::remote::MockContentService;
    use crate::remote::testing::StallingContent;
    use crate::store::{MemoryLibraryStore, MockLibraryStore};
    use std::time::Duration;
    use tokio::time::Instant;

    fn track_stubs(n: usize) -> Vec<Stub> {
        (0..n).map(|i| Stub::Track(format!("vid{i:08}"))).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_are_paced() {
        let content = Arc::new(StallingContent::new(Duration::ZERO));
        let mut store = MockLibraryStore::new();
        store.expect_pending_stubs().returning(|| Ok(track_stubs(12)));
        store.expect_save_track_metadata().times(12).returning(|_| Ok(()));

        let enricher = MetadataEnricher::new(content.clone(), Arc::new(store), EnrichmentConfig::default());
        let started = Instant::now();
        let report = enricher.run_pass().await.expect("pass ran");

        assert_eq!(
            report,
            EnrichmentReport {
                pending: 12,
                enriched: 12,
                failed: 0,
                batches: 3
            }
        );
        // Two pauses between three batches
        assert!(started.elapsed() >= Duration::from_millis(600));
        assert_eq!(content.calls().len(), 12);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_the_pass() {
        let mut content = MockContentService::new();
        content.expect_track_details().returning(|id| {
            if id == "vid00000001" {
                Err(Error::remote("404"))
            } else {
                Ok(crate::model::Track::new(id, "Title", "Artist"))
            }
        });
        let mut store = MockLibraryStore::new();
        store.expect_pending_stubs().returning(|| Ok(track_stubs(3)));
        store.expect_save_track_metadata().times(2).returning(|_| Ok(()));

        let enricher = MetadataEnricher::new(Arc::new(content), Arc::new(store), EnrichmentConfig::default());
        let report = enricher.run_pass().await.expect("pass ran");
        assert_eq!(report.enriched, 2);
        assert_eq!(report.failed, 1);
        assert!(!enricher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrigger_while_running_is_noop() {
        let content = Arc::new(StallingContent::new(Duration::from_secs(1)));
        let store = Arc::new(MemoryLibraryStore::new());
        store.add_track_stub("dQw4w9WgXcQ").await;

        let enricher = Arc::new(MetadataEnricher::new(
            content.clone(),
            store.clone(),
            EnrichmentConfig::default(),
        ));
        assert!(enricher.trigger());
        assert!(!enricher.trigger());
        assert!(enricher.run_pass().await.is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!enricher.is_running());
        assert_eq!(content.calls(), vec!["track:dQw4w9WgXcQ".to_string()]);
        assert!(store.pending_stubs().await.expect("stubs").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_playlist_stubs_are_hydrated() {
        let content = Arc::new(StallingContent::new(Duration::ZERO));
        let store = Arc::new(MemoryLibraryStore::new());
        store.add_playlist_stub("PLremote1").await;

        let enricher = MetadataEnricher::new(content, store.clone(), EnrichmentConfig::default());
        let report = enricher.run_pass().await.expect("pass ran");
        assert_eq!(report.enriched, 1);

        let playlists = store.playlists().borrow().clone();
        assert_eq!(playlists[0].name, "Playlist PLremote1");
    }

    #[tokio::test]
    async fn test_store_failure_yields_empty_report() {
        let mut store = MockLibraryStore::new();
        store
            .expect_pending_stubs()
            .returning(|| Err(Error::store("locked")));
        let enricher = MetadataEnricher::new(
            Arc::new(MockContentService::new()),
            Arc::new(store),
            EnrichmentConfig::default(),
        );
        assert_eq!(enricher.run_pass().await, Some(EnrichmentReport::default()));
    }

    #[tokio::test]
    async fn test_shutdown_releases_running_flag() {
        let content = Arc::new(StallingContent::new(Duration::from_secs(3600)));
        let store = Arc::new(MemoryLibraryStore::new());
        store.add_track_stub("dQw4w9WgXcQ").await;
        let enricher = Arc::new(MetadataEnricher::new(content, store, EnrichmentConfig::default()));

        assert!(enricher.trigger());
        tokio::task::yield_now().await;
        enricher.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!enricher.is_running());
    }
}
