//! Keepalive `ping` task.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hushroom_proto::frames::PING;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// Spawn a task that queues a `ping` frame every `interval` until the
/// connection's outbound queue closes or shutdown is signalled.
pub fn spawn_ping_task(
    outbound: mpsc::UnboundedSender<String>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let interval = if interval.is_zero() {
        warn!(
            fallback_secs = DEFAULT_PING_INTERVAL.as_secs(),
            "Zero ping interval, using default"
        );
        DEFAULT_PING_INTERVAL
    } else {
        interval
    };

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if outbound.send(PING.to_string()).is_err() {
                        debug!("Outbound queue closed, ping task exiting");
                        return;
                    }
                }
                _ = shutdown.changed() => {
                    info!("Ping task shutting down");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pings_on_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_ping_task(tx, Duration::from_millis(10), shutdown_rx);

        assert_eq!(rx.recv().await.unwrap(), "ping");
        assert_eq!(rx.recv().await.unwrap(), "ping");
        handle.abort();
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_ping_task(tx, Duration::from_secs(3600), shutdown_rx);
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn zero_interval_falls_back_to_default() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_ping_task(tx, Duration::ZERO, shutdown_rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        shutdown_tx.send(true).unwrap();
        // a panic inside the task would surface as a join error
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stops_when_queue_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(rx);
        let handle = spawn_ping_task(tx, Duration::from_millis(10), shutdown_rx);
        handle.await.unwrap();
    }
}
