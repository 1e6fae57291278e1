//! Broadcast shutdown signal for workers.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
///
/// Cloning a [`ShutdownTx`] shares the same channel, so any clone can stop every subscribed
/// worker.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Wraps a watch sender into a [`ShutdownTx`].
    pub fn new(tx: watch::Sender<()>) -> Self {
        Self(tx)
    }

    /// Notifies every subscribed receiver that shutdown was requested.
    ///
    /// Fails only when no receiver is left, in which case there is nothing to stop.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new receiver that observes future shutdown requests.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Receiver side of the shutdown channel.
///
/// Workers await [`watch::Receiver::changed`] to learn that shutdown was requested.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates a new shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_observes_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        let mut other_rx = tx.subscribe();

        tx.shutdown().unwrap();

        rx.changed().await.unwrap();
        other_rx.changed().await.unwrap();
    }

    #[test]
    fn shutdown_without_receivers_fails() {
        let (tx, rx) = create_shutdown_channel();
        drop(rx);

        assert!(tx.shutdown().is_err());
    }
}
