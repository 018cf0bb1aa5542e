// Worker Shutdown Token

use tokio::sync::watch;

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal
    ///
    /// Never resolves once the sender is gone without having signalled.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to all workers
    pub fn shutdown(&self) {
        // Stored even when no token is alive yet
        self.tx.send_replace(true);
    }

    /// New token observing this sender
    pub fn subscribe(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_signal() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .unwrap();
        assert!(token.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_after_signal_already_seen() {
        let (tx, mut token) = shutdown_channel();
        tx.shutdown();
        token.wait().await;
        // Still resolves on a second wait
        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_sender_does_not_signal() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(50), token.wait()).await;
        assert!(waited.is_err());
        assert!(!token.is_shutdown());
    }
}
