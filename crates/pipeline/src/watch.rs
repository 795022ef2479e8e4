//! Silence/continuation watch
//!
//! A set-once signal that a newer caller utterance fires. The turn task
//! waits on it, bounded by the continuation window, to decide whether the
//! caller went quiet after the opening reply.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Single-shot activity signal
#[derive(Debug, Default)]
pub struct ContinuationWatch {
    fired: AtomicBool,
    notify: Notify,
}

impl ContinuationWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal; later calls are no-ops
    pub fn set(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_set(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Wait until fired or the timeout elapses
    ///
    /// Returns true when the signal fired before the timeout.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent `set` is not missed
        notified.as_mut().enable();

        if self.is_set() {
            return true;
        }

        tokio::time::timeout(timeout, notified).await.is_ok() || self.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_times_out_when_not_set() {
        let watch = ContinuationWatch::new();
        assert!(!watch.wait(Duration::from_millis(20)).await);
        assert!(!watch.is_set());
    }

    #[tokio::test]
    async fn test_already_set_returns_immediately() {
        let watch = ContinuationWatch::new();
        watch.set();
        assert!(watch.wait(Duration::from_secs(10)).await);
    }

    #[tokio::test]
    async fn test_set_during_wait() {
        let watch = Arc::new(ContinuationWatch::new());
        let setter = {
            let watch = watch.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                watch.set();
            })
        };

        let start = std::time::Instant::now();
        assert!(watch.wait(Duration::from_secs(5)).await);
        assert!(start.elapsed() < Duration::from_secs(1));
        setter.await.unwrap();
    }

    #[tokio::test]
    async fn test_set_is_idempotent() {
        let watch = ContinuationWatch::new();
        watch.set();
        watch.set();
        assert!(watch.is_set());
    }
}
