//! One-shot termination signal shared between tasks.

use std::future::Future;

use tokio::sync::watch;

/// A flag that flips once from running to terminated and can be awaited.
///
/// Every call to [`Shutdown::wait`] subscribes independently; a wait started
/// after the flip resolves at once.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
        }
    }

    /// Flip the flag. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_terminated(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`Shutdown::shutdown`] has been called.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.wait_for(|terminated| *terminated).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Shutdown;

    #[tokio::test]
    async fn test_wait_resolves_after_shutdown() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_terminated());

        let wait = shutdown.wait();
        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(1), wait).await.unwrap();
        assert!(shutdown.is_terminated());

        // late waiters resolve immediately
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait()).await.unwrap();
    }
}
