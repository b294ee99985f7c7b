//! Search orchestration.
//!
//! Keystrokes are debounced into suggestion fetches; explicit searches and
//! category filters run under their own timeouts. A timed-out call and a
//! failed call produce different error text.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::model::{SearchFilter, SearchItem, SearchSummary};
use crate::remote::{ContentService, with_timeout};
use crate::scope::SubscriptionScope;

/// Error text shown when a search call exceeds its timeout.
pub const SEARCH_TIMED_OUT: &str = "Search timed out";

/// Snapshot of the search screen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SearchState {
    /// Current input text.
    pub query: String,
    /// Autocomplete suggestions for `query`.
    pub suggestions: Vec<String>,
    /// A summary or filtered search is running.
    pub is_searching: bool,
    /// Result of the last summary search.
    pub summary: Option<SearchSummary>,
    /// Category of the filtered results, if any.
    pub active_filter: Option<SearchFilter>,
    /// Results of the last filtered search.
    pub filtered_results: Vec<SearchItem>,
    /// Submitted queries, most recent first.
    pub recent_searches: Vec<String>,
    /// Error of the last search.
    pub error: Option<String>,
}

/// Input text tagged with the submit count at the time it was typed.
#[derive(Debug, Clone, Default)]
struct Keystroke {
    text: String,
    submits: u64,
}

struct Inner {
    content: Arc<dyn ContentService>,
    config: SearchConfig,
    state_tx: watch::Sender<SearchState>,
    /// Bumped by every submitted search; older keystrokes get no suggestions.
    submits: AtomicU64,
}

impl Inner {
    fn update(&self, f: impl FnOnce(&mut SearchState)) {
        self.state_tx.send_modify(f);
    }

    fn submitted_since(&self, submits: u64) -> bool {
        self.submits.load(Ordering::Acquire) != submits
    }

    async fn fetch_suggestions(&self, query: String, submits: u64) {
        let fetched = with_timeout(
            self.config.suggestions_timeout(),
            self.content.search_suggestions(&query),
        )
        .await;

        let suggestions = match fetched {
            Some(Ok(suggestions)) => suggestions,
            Some(Err(e)) => {
                debug!("Suggestions for '{}' failed: {}", query, e);
                Vec::new()
            }
            None => Vec::new(),
        };

        if self.submitted_since(submits) {
            debug!("Dropping suggestions for submitted '{}'", query);
            return;
        }
        self.update(|s| {
            // The user kept typing while this was in flight
            if s.query == query {
                s.suggestions = suggestions;
            }
        });
    }
}

/// Debounced suggestions plus timed summary and filtered searches.
pub struct SearchOrchestrator {
    inner: Arc<Inner>,
    query_tx: watch::Sender<Keystroke>,
    attached: AtomicBool,
    scope: SubscriptionScope,
}

impl SearchOrchestrator {
    /// Create an orchestrator. Call [`attach`](Self::attach) to start the
    /// suggestion debouncer.
    pub fn new(content: Arc<dyn ContentService>, config: SearchConfig) -> Self {
        let (state_tx, _) = watch::channel(SearchState::default());
        let (query_tx, _) = watch::channel(Keystroke::default());
        Self {
            inner: Arc::new(Inner {
                content,
                config,
                state_tx,
                submits: AtomicU64::new(0),
            }),
            query_tx,
            attached: AtomicBool::new(false),
            scope: SubscriptionScope::new("search"),
        }
    }

    /// Start the debouncer. Returns `false` if already attached.
    pub fn attach(&self) -> bool {
        if self
            .attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let inner = Arc::clone(&self.inner);
        let mut queries = self.query_tx.subscribe();
        self.scope.spawn(async move {
            let debounce = inner.config.debounce();
            while queries.changed().await.is_ok() {
                // Restart the window on every keystroke
                loop {
                    tokio::select! {
                        changed = queries.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                        () = tokio::time::sleep(debounce) => break,
                    }
                }

                let Keystroke { text, submits } = queries.borrow_and_update().clone();
                if text.trim().is_empty() || inner.submitted_since(submits) {
                    continue;
                }
                inner.fetch_suggestions(text, submits).await;
            }
        });
        true
    }

    /// Current snapshot.
    pub fn state(&self) -> SearchState {
        self.inner.state_tx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.inner.state_tx.subscribe()
    }

    /// Update the input text. Blank text clears suggestions right away.
    pub fn set_query(&self, text: &str) {
        let blank = text.trim().is_empty();
        self.inner.update(|s| {
            s.query = text.to_string();
            if blank {
                s.suggestions.clear();
            }
        });
        self.query_tx.send_replace(Keystroke {
            text: text.to_string(),
            submits: self.inner.submits.load(Ordering::Acquire),
        });
    }

    /// Set the query and search for it.
    pub async fn search_for(&self, text: &str) {
        self.set_query(text);
        self.search().await;
    }

    /// Run a summary search for the current query.
    pub async fn search(&self) {
        let query = self.inner.state_tx.borrow().query.trim().to_string();
        if query.is_empty() {
            return;
        }
        info!("Searching for '{}'", query);

        // Pending and in-flight suggestion fetches are now stale
        self.inner.submits.fetch_add(1, Ordering::AcqRel);
        self.inner.update(|s| {
            s.is_searching = true;
            s.error = None;
            s.suggestions.clear();
            s.active_filter = None;
            s.filtered_results.clear();
        });

        let result = with_timeout(
            self.inner.config.summary_timeout(),
            self.inner.content.search_summary(&query),
        )
        .await;

        let max_recent = self.inner.config.max_recent_searches;
        match result {
            Some(Ok(summary)) => self.inner.update(|s| {
                s.is_searching = false;
                s.summary = Some(summary);
                remember_search(&mut s.recent_searches, &query, max_recent);
            }),
            Some(Err(e)) => {
                warn!("Search for '{}' failed: {}", query, e);
                self.inner.update(|s| {
                    s.is_searching = false;
                    s.error = Some(e.to_string());
                });
            }
            None => {
                warn!("Search for '{}' timed out", query);
                self.inner.update(|s| {
                    s.is_searching = false;
                    s.error = Some(SEARCH_TIMED_OUT.to_string());
                });
            }
        }
    }

    /// Search the current query within one category.
    pub async fn apply_filter(&self, filter: SearchFilter) {
        let query = self.inner.state_tx.borrow().query.trim().to_string();
        if query.is_empty() {
            return;
        }
        debug!("Filtering '{}' by {}", query, filter);

        self.inner.update(|s| {
            s.is_searching = true;
            s.error = None;
            s.active_filter = Some(filter);
            s.filtered_results.clear();
        });

        let result = with_timeout(
            self.inner.config.filter_timeout(),
            self.inner.content.search_filtered(&query, filter),
        )
        .await;

        match result {
            Some(Ok(items)) => self.inner.update(|s| {
                s.is_searching = false;
                s.filtered_results = items;
            }),
            Some(Err(e)) => {
                warn!("Filtered search for '{}' failed: {}", query, e);
                self.inner.update(|s| {
                    s.is_searching = false;
                    s.error = Some(e.to_string());
                });
            }
            None => self.inner.update(|s| {
                s.is_searching = false;
                s.error = Some(SEARCH_TIMED_OUT.to_string());
            }),
        }
    }

    /// Drop the category filter and re-run the summary search.
    pub async fn clear_filter(&self) {
        self.inner.update(|s| {
            s.active_filter = None;
            s.filtered_results.clear();
        });
        self.search().await;
    }

    /// Forget submitted queries.
    pub fn clear_recent_searches(&self) {
        self.inner.update(|s| s.recent_searches.clear());
    }

    /// Dismiss the error.
    pub fn clear_error(&self) {
        self.inner.update(|s| s.error = None);
    }

    /// Stop the debouncer; a later [`attach`](Self::attach) restarts it.
    pub fn shutdown(&self) {
        self.scope.cancel_all();
        self.attached.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("attached", &self.attached.load(Ordering::Relaxed))
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Move `query` to the front of `recent`, case-insensitively deduplicated.
fn remember_search(recent: &mut Vec<String>, query: &str, max: usize) {
    recent.retain(|q| !q.eq_ignore_ascii_case(query));
    recent.insert(0, query.to_string());
    recent.truncate(max);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::remote::MockContentService;
    use crate::remote::testing::StallingContent;
    use std::time::Duration;

    fn orchestrator(content: Arc<dyn ContentService>) -> SearchOrchestrator {
        let search = SearchOrchestrator::new(content, SearchConfig::default());
        search.attach();
        search
    }

    #[tokio::test(start_paused = true)]
    async fn test_keystroke_burst_fetches_once_with_last_value() {
        let content = Arc::new(StallingContent::new(Duration::ZERO));
        let search = orchestrator(content.clone());

        for text in ["d", "da", "daf", "daft", "daft p"] {
            search.set_query(text);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(content.calls(), vec!["suggestions:daft p".to_string()]);
        assert_eq!(search.state().suggestions, vec!["daft p remix".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_query_clears_without_debounce() {
        let content = Arc::new(StallingContent::new(Duration::ZERO));
        let search = orchestrator(content.clone());

        search.set_query("justice");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(search.state().suggestions.len(), 1);

        search.set_query("   ");
        assert!(search.state().suggestions.is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(content.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_suggestions_are_dropped() {
        let content = Arc::new(StallingContent::new(Duration::from_secs(1)));
        let search = orchestrator(content.clone());

        search.set_query("air");
        tokio::time::sleep(Duration::from_millis(350)).await;
        // Fetch for "air" is in flight; the user clears the box
        search.set_query("");
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(search.state().suggestions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_within_debounce_window_skips_suggestions() {
        let content = Arc::new(StallingContent::new(Duration::ZERO));
        let search = orchestrator(content.clone());

        search.set_query("daft");
        search.search().await;
        assert!(search.state().suggestions.is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let state = search.state();
        assert!(state.suggestions.is_empty());
        assert!(state.summary.is_some());
        assert_eq!(content.calls(), vec!["summary:daft".to_string()]);

        // Typing again after the submit brings suggestions back
        search.set_query("daft punk");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(search.state().suggestions, vec!["daft punk remix".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_drops_in_flight_suggestions() {
        let content = Arc::new(StallingContent::new(Duration::from_secs(1)));
        let search = orchestrator(content.clone());

        search.set_query("daft");
        tokio::time::sleep(Duration::from_millis(350)).await;
        // Suggestion fetch for "daft" is in flight
        search.search().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let state = search.state();
        assert!(state.suggestions.is_empty());
        assert!(state.summary.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_then_attach_restarts_debouncer() {
        let content = Arc::new(StallingContent::new(Duration::ZERO));
        let search = orchestrator(content.clone());

        search.shutdown();
        search.set_query("bicep");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(content.calls().is_empty());

        assert!(search.attach());
        assert!(!search.attach());
        search.set_query("bicep glue");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(content.calls(), vec!["suggestions:bicep glue".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_timeout_message() {
        let content = Arc::new(StallingContent::new(Duration::from_secs(20)));
        let search = orchestrator(content);

        search.search_for("moderat").await;
        let state = search.state();
        assert_eq!(state.error.as_deref(), Some("Search timed out"));
        assert!(!state.is_searching);
        assert!(state.summary.is_none());
    }

    #[tokio::test]
    async fn test_search_failure_message() {
        let mut content = MockContentService::new();
        content
            .expect_search_summary()
            .returning(|_| Err(Error::remote("HTTP 500")));
        let search = orchestrator(Arc::new(content));

        search.search_for("moderat").await;
        let state = search.state();
        assert_eq!(state.error.as_deref(), Some("Remote request failed: HTTP 500"));
        assert!(!state.is_searching);
    }

    #[tokio::test]
    async fn test_success_records_recent_searches() {
        let content = Arc::new(StallingContent::new(Duration::ZERO));
        let search = orchestrator(content);

        search.search_for("Bonobo").await;
        search.search_for("Tycho").await;
        search.search_for("bonobo").await;

        let state = search.state();
        assert!(state.summary.is_some());
        assert_eq!(state.recent_searches, vec!["bonobo".to_string(), "Tycho".to_string()]);

        search.clear_recent_searches();
        assert!(search.state().recent_searches.is_empty());
    }

    #[test]
    fn test_recent_searches_are_capped() {
        let mut recent = Vec::new();
        for i in 0..15 {
            remember_search(&mut recent, &format!("q{i}"), 10);
        }
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0], "q14");
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_timeout_and_clear_filter() {
        let content = Arc::new(StallingContent::new(Duration::from_secs(13)));
        let search = orchestrator(content.clone());
        search.set_query("caribou");

        search.apply_filter(SearchFilter::Albums).await;
        let state = search.state();
        assert_eq!(state.active_filter, Some(SearchFilter::Albums));
        assert_eq!(state.error.as_deref(), Some("Search timed out"));

        // 13s fits within the 15s summary timeout
        search.clear_filter().await;
        let state = search.state();
        assert!(state.error.is_none());
        assert!(state.active_filter.is_none());
        assert!(state.summary.is_some());
        assert!(content.calls().contains(&"summary:caribou".to_string()));
    }

    #[tokio::test]
    async fn test_failed_filter_does_not_keep_previous_rows() {
        let mut content = MockContentService::new();
        content
            .expect_search_filtered()
            .returning(|query, filter| match filter {
                SearchFilter::Songs => Ok(vec![SearchItem::Track(crate::model::Track::new(
                    "aaaaaaaaaaa",
                    query,
                    "Caribou",
                ))]),
                _ => Err(Error::remote("HTTP 500")),
            });
        let search = SearchOrchestrator::new(Arc::new(content), SearchConfig::default());
        search.set_query("caribou");

        search.apply_filter(SearchFilter::Songs).await;
        assert_eq!(search.state().filtered_results.len(), 1);

        search.apply_filter(SearchFilter::Albums).await;
        let state = search.state();
        assert_eq!(state.active_filter, Some(SearchFilter::Albums));
        assert!(state.filtered_results.is_empty());
        assert_eq!(state.error.as_deref(), Some("Remote request failed: HTTP 500"));
    }

    #[tokio::test]
    async fn test_filter_success() {
        let content = Arc::new(StallingContent::new(Duration::ZERO));
        let search = orchestrator(content);
        search.set_query("caribou");
        search.apply_filter(SearchFilter::Songs).await;

        let state = search.state();
        assert_eq!(state.filtered_results.len(), 1);
        assert!(!state.is_searching);
    }
}
