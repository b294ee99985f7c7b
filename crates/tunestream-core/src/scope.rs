//! Lifetime-bound background tasks.
//!
//! Aggregators spawn their subscriptions into a [`SubscriptionScope`]; when
//! the owner is dropped (or [`SubscriptionScope::cancel_all`] is called) every
//! task is aborted, so there is no manual unsubscribe bookkeeping.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::debug;

/// Owns the join handles of background subscriptions.
pub struct SubscriptionScope {
    name: &'static str,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SubscriptionScope {
    /// Create an empty scope; `name` is used in log lines.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `future` on the current runtime, tied to this scope.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut handles = self.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of tasks still running.
    pub fn active_count(&self) -> usize {
        self.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Abort every task in the scope.
    pub fn cancel_all(&self) {
        let handles: Vec<_> = self.lock().drain(..).collect();
        if !handles.is_empty() {
            debug!("Cancelling {} {} subscriptions", handles.len(), self.name);
        }
        for handle in handles {
            handle.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        // A poisoned list of handles is still a valid list of handles
        self.handles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for SubscriptionScope {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl std::fmt::Debug for SubscriptionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionScope")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_drop_aborts_tasks() {
        let (tx, rx) = oneshot::channel::<()>();
        let scope = SubscriptionScope::new("test");
        scope.spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });
        assert_eq!(scope.active_count(), 1);

        drop(scope);
        // The sender is dropped with the aborted task
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_finished_tasks_are_not_counted() {
        let scope = SubscriptionScope::new("test");
        scope.spawn(async {});
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scope.active_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_is_repeatable() {
        let scope = SubscriptionScope::new("test");
        scope.spawn(std::future::pending::<()>());
        scope.cancel_all();
        scope.cancel_all();
        assert_eq!(scope.active_count(), 0);
    }
}
