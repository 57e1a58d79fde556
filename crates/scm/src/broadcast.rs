//! Safe-mode status broadcasting to local subscribers (admin CLI watch
//! commands, an operator dashboard). Mirrors `kimberlite::broadcast`'s
//! `ProjectionBroadcast`, narrowed to the one event this layer actually
//! produces.

use scm_types::SafeModeStatus;
use tokio::sync::broadcast;

/// Broadcasts safe-mode transitions to every active subscriber.
#[derive(Debug, Clone)]
pub struct SafeModeBroadcast {
    tx: broadcast::Sender<SafeModeStatus>,
}

impl SafeModeBroadcast {
    /// Creates a new broadcaster with the given buffer size.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Sends a status change to all subscribers. Returns the number of
    /// subscribers that received it.
    pub fn send(&self, status: SafeModeStatus) -> usize {
        self.tx.send(status).unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SafeModeStatus> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SafeModeBroadcast {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_a_sent_status() {
        let broadcast = SafeModeBroadcast::new(16);
        let mut rx = broadcast.subscribe();

        let status = SafeModeStatus::new();
        broadcast.send(status);

        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn receiver_count_tracks_active_subscribers() {
        let broadcast = SafeModeBroadcast::new(16);
        let _rx1 = broadcast.subscribe();
        let _rx2 = broadcast.subscribe();
        assert_eq!(broadcast.receiver_count(), 2);
    }

    #[test]
    fn lagging_subscriber_reports_lag_rather_than_blocking_the_sender() {
        let broadcast = SafeModeBroadcast::new(2);
        let mut rx = broadcast.subscribe();

        for _ in 0..5 {
            broadcast.send(SafeModeStatus::new());
        }

        match rx.try_recv() {
            Err(broadcast::error::TryRecvError::Lagged(n)) => assert!(n > 0),
            other => panic!("expected lagged error, got {other:?}"),
        }
    }
}
