//! Delayed fire-and-forget work with a cancellation handle

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// A future scheduled to run once after a delay.
///
/// Runs on the tokio clock, so a paused test runtime drives it with
/// `tokio::time::advance`. Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct DeferredTask {
    label: &'static str,
    handle: JoinHandle<()>,
}

impl DeferredTask {
    pub fn schedule<F>(label: &'static str, delay: Duration, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
        });
        Self { label, handle }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Cancel if it has not fired yet; a running request is aborted too
    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            debug!(task = %self.label, "deferred_task_cancelled");
        }
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for completion; false if it was cancelled
    pub async fn wait(self) -> bool {
        self.handle.await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        let task = DeferredTask::schedule("test", Duration::from_secs(5), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        settle().await;

        tokio::time::advance(Duration::from_millis(4_999)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(task.wait().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_delay() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        let task = DeferredTask::schedule("test", Duration::from_secs(5), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        task.cancel();
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!task.wait().await);
    }
}
