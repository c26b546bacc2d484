//! Notification channel manager
//!
//! Maps a pairing session id to the one live connection waiting on it. The
//! manager only hands out queue endpoints; the connection task that owns the
//! socket drains the receiver. Delivery is best-effort: a failed send never
//! fails the pairing that triggered it.

use qrlink_core::NotifyMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Per-channel queue depth. Only the latest login result matters, so a
/// shallow queue is enough; an overflowing send reports as undelivered.
pub const CHANNEL_CAPACITY: usize = 8;

struct Entry {
    /// Distinguishes this registration from any it displaced
    epoch: u64,
    tx: mpsc::Sender<NotifyMessage>,
}

/// Registry of live notification channels keyed by pairing session id
#[derive(Clone)]
pub struct ChannelManager {
    channels: Arc<RwLock<HashMap<String, Entry>>>,
    next_epoch: Arc<AtomicU64>,
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelManager {
    /// Create a new channel manager
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            next_epoch: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a channel for a session id
    ///
    /// At most one channel is live per session id: an existing registration
    /// is displaced, which closes its queue and lets the old connection task
    /// wind down. Returns the epoch identifying this registration and the
    /// receiving end for the connection task.
    pub async fn open(&self, session_id: &str) -> (u64, mpsc::Receiver<NotifyMessage>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);

        let mut channels = self.channels.write().await;
        if channels
            .insert(session_id.to_string(), Entry { epoch, tx })
            .is_some()
        {
            info!("Displaced notification channel for session {}", session_id);
        } else {
            debug!("Opened notification channel for session {}", session_id);
        }

        (epoch, rx)
    }

    /// Deliver a message to the channel for a session id, best-effort
    ///
    /// Returns false when no channel is registered or the queue rejects the
    /// message; callers treat that as "notification failed", never an error.
    pub async fn send(&self, session_id: &str, message: NotifyMessage) -> bool {
        let channels = self.channels.read().await;
        match channels.get(session_id) {
            Some(entry) => entry.tx.try_send(message).is_ok(),
            None => false,
        }
    }

    /// Remove and release the channel for a session id, idempotent
    pub async fn close(&self, session_id: &str) {
        let mut channels = self.channels.write().await;
        if channels.remove(session_id).is_some() {
            debug!("Closed notification channel for session {}", session_id);
        }
    }

    /// Release a specific registration
    ///
    /// No-op when the entry was already displaced by a newer registration,
    /// so a stale connection task cannot tear down its successor's channel.
    pub async fn release(&self, session_id: &str, epoch: u64) {
        let mut channels = self.channels.write().await;
        if channels.get(session_id).is_some_and(|e| e.epoch == epoch) {
            channels.remove(session_id);
            debug!("Released notification channel for session {}", session_id);
        }
    }

    /// Number of live channels
    pub async fn open_count(&self) -> usize {
        let channels = self.channels.read().await;
        channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping() -> NotifyMessage {
        NotifyMessage::Ping { timestamp: 0 }
    }

    #[tokio::test]
    async fn test_send_without_channel() {
        let manager = ChannelManager::new();
        assert!(!manager.send("missing", ping()).await);
    }

    #[tokio::test]
    async fn test_open_send_receive() {
        let manager = ChannelManager::new();

        let (_epoch, mut rx) = manager.open("s1").await;
        assert!(manager.send("s1", ping()).await);

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, NotifyMessage::Ping { .. }));
    }

    #[tokio::test]
    async fn test_reopen_displaces_old_channel() {
        let manager = ChannelManager::new();

        let (_old_epoch, mut old_rx) = manager.open("s1").await;
        let (_new_epoch, mut new_rx) = manager.open("s1").await;

        // The displaced queue closes; the live one receives
        assert!(old_rx.recv().await.is_none());
        assert!(manager.send("s1", ping()).await);
        assert!(new_rx.recv().await.is_some());
        assert_eq!(manager.open_count().await, 1);
    }

    #[tokio::test]
    async fn test_close_idempotent() {
        let manager = ChannelManager::new();

        let (_epoch, mut rx) = manager.open("s1").await;
        manager.close("s1").await;
        manager.close("s1").await;

        assert!(rx.recv().await.is_none());
        assert!(!manager.send("s1", ping()).await);
    }

    #[tokio::test]
    async fn test_stale_release_keeps_new_channel() {
        let manager = ChannelManager::new();

        let (old_epoch, _old_rx) = manager.open("s1").await;
        let (_new_epoch, mut new_rx) = manager.open("s1").await;

        // The displaced task releasing must not tear down the new channel
        manager.release("s1", old_epoch).await;
        assert!(manager.send("s1", ping()).await);
        assert!(new_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_release_matching_epoch() {
        let manager = ChannelManager::new();

        let (epoch, _rx) = manager.open("s1").await;
        manager.release("s1", epoch).await;
        assert_eq!(manager.open_count().await, 0);
    }

    #[tokio::test]
    async fn test_send_after_queue_overflow() {
        let manager = ChannelManager::new();
        let (_epoch, _rx) = manager.open("s1").await;

        for _ in 0..CHANNEL_CAPACITY {
            assert!(manager.send("s1", ping()).await);
        }
        // Queue full and nobody draining: reported as undelivered
        assert!(!manager.send("s1", ping()).await);
    }
}
