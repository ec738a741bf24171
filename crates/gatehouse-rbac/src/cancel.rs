//! Cancellation support for engine calls.
//!
//! Dropping an engine future already abandons its in-flight store calls.
//! The token here lets a caller trigger that from elsewhere and get a
//! [`RbacError::Cancelled`] back instead of a result.

use crate::error::{RbacError, RbacResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Cancellation token for engine calls.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Create a new cancellation token and its watcher.
    pub fn new() -> (Self, CancellationWatcher) {
        let (tx, rx) = watch::channel(false);
        let cancelled = Arc::new(AtomicBool::new(false));

        let token = Self {
            cancelled: cancelled.clone(),
            notify: Arc::new(tx),
        };

        let watcher = CancellationWatcher {
            cancelled,
            notify: rx,
        };

        (token, watcher)
    }

    /// Cancel every call watching this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.notify.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Watches for cancellation.
#[derive(Clone)]
pub struct CancellationWatcher {
    cancelled: Arc<AtomicBool>,
    notify: watch::Receiver<bool>,
}

impl CancellationWatcher {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for cancellation. Never resolves if every token is dropped
    /// without cancelling.
    pub async fn cancelled(&mut self) {
        while !*self.notify.borrow() {
            if self.notify.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Race `fut` against cancellation.
pub async fn run_cancellable<T, F>(watcher: &CancellationWatcher, fut: F) -> RbacResult<T>
where
    F: Future<Output = RbacResult<T>>,
{
    if watcher.is_cancelled() {
        return Err(RbacError::Cancelled);
    }
    let mut watcher = watcher.clone();
    tokio::select! {
        biased;
        _ = watcher.cancelled() => Err(RbacError::Cancelled),
        result = fut => result,
    }
}

/// Bound `fut` by a deadline.
pub async fn run_with_deadline<T, F>(deadline: Duration, fut: F) -> RbacResult<T>
where
    F: Future<Output = RbacResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(RbacError::DeadlineExceeded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_cancellation_token() {
        let (token, watcher) = CancellationToken::new();

        assert!(!token.is_cancelled());
        assert!(!watcher.is_cancelled());

        token.cancel();

        assert!(token.is_cancelled());
        assert!(watcher.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellation_wait() {
        let (token, mut watcher) = CancellationToken::new();

        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        watcher.cancelled().await;
        assert!(watcher.is_cancelled());

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_cancellable_interrupts() {
        let (token, watcher) = CancellationToken::new();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = run_cancellable(&watcher, async {
            sleep(Duration::from_secs(5)).await;
            Ok(true)
        })
        .await;
        assert!(matches!(result, Err(RbacError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_cancellable_passes_result_through() {
        let (_token, watcher) = CancellationToken::new();
        let result = run_cancellable(&watcher, async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_dropped_token_does_not_cancel() {
        let (token, watcher) = CancellationToken::new();
        drop(token);
        let result = run_cancellable(&watcher, async {
            sleep(Duration::from_millis(10)).await;
            Ok("done")
        })
        .await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_deadline() {
        let result = run_with_deadline(Duration::from_millis(10), async {
            sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RbacError::DeadlineExceeded)));

        let result = run_with_deadline(Duration::from_secs(5), async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }
}
