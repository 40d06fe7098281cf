//! Presence broadcast: pushes an account's device set to all of its connections.
//!
//! Each account with at least one live connection has a tokio broadcast
//! channel. Publishing never waits on subscribers; a subscriber that falls
//! behind skips to newer snapshots.

use dashmap::DashMap;
use orbit_types::{AccountId, Device};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Snapshots retained per account for slow subscribers.
const CHANNEL_CAPACITY: usize = 16;

/// A presence snapshot for one account.
pub type PresenceSnapshot = Arc<Vec<Device>>;

/// Sink for presence-set changes.
pub trait PresenceNotifier: Send + Sync {
    /// Publish the full current device set of `account`.
    ///
    /// Must not block and must not call back into the device registry.
    fn publish(&self, account: &AccountId, devices: Vec<Device>);
}

/// Per-account broadcast channels.
#[derive(Debug, Default)]
pub struct PresenceHub {
    channels: DashMap<AccountId, broadcast::Sender<PresenceSnapshot>>,
}

impl PresenceHub {
    /// Create a hub with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to `account`'s presence updates.
    pub fn subscribe(&self, account: &AccountId) -> broadcast::Receiver<PresenceSnapshot> {
        self.channels
            .entry(account.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop `account`'s channel if no connection listens to it any more.
    ///
    /// Call after dropping a receiver obtained from [`subscribe`](Self::subscribe).
    pub fn release(&self, account: &AccountId) {
        self.channels
            .remove_if(account, |_, tx| tx.receiver_count() == 0);
    }

    /// Number of accounts with a live channel.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl PresenceNotifier for PresenceHub {
    fn publish(&self, account: &AccountId, devices: Vec<Device>) {
        let Some(tx) = self.channels.get(account) else {
            tracing::debug!("No listeners for {}, presence update skipped", account);
            return;
        };

        match tx.send(Arc::new(devices)) {
            Ok(receivers) => {
                tracing::debug!("Presence for {} pushed to {} connections", account, receivers);
            }
            Err(_) => {
                tracing::debug!("Presence for {} had no receivers", account);
            }
        }
    }
}
