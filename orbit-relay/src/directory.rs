//! Connection directory: device id ↔ live connection.
//!
//! The forward map routes `targetDeviceId` lookups; the reverse map finds a
//! connection's device on disconnect. A device id belongs to at most one
//! connection at a time and the most recent `bind` wins. The connection it
//! displaced stays open but is no longer routable.

use crate::error::PeerWriteError;
use dashmap::DashMap;
use orbit_types::{AccountId, ConnectionId, DeviceId};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

/// How long a write waits on a full peer queue unless configured otherwise.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// A frame queued for delivery on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON control frame.
    Text(String),
    /// Opaque payload bytes.
    Binary(Vec<u8>),
}

/// Cloneable handle used to write to a live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    account: Option<AccountId>,
    outbound: mpsc::Sender<Outbound>,
    write_timeout: Duration,
}

impl ConnectionHandle {
    /// Wrap the outbound queue of a connection.
    pub fn new(
        id: ConnectionId,
        account: Option<AccountId>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            id,
            account,
            outbound,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Bound how long writers wait on this connection's full queue.
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Account the connection is authenticated as.
    pub fn account(&self) -> Option<&AccountId> {
        self.account.as_ref()
    }

    /// Whether the connection's writer has shut down.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Queue a frame, waiting up to the write timeout for room if the peer is slow.
    pub async fn send(&self, frame: Outbound) -> Result<(), PeerWriteError> {
        self.outbound
            .send_timeout(frame, self.write_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => PeerWriteError::Stalled,
                SendTimeoutError::Closed(_) => PeerWriteError::Closed,
            })
    }

    /// Queue a control frame.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), PeerWriteError> {
        self.send(Outbound::Text(text.into())).await
    }
}

/// Device id → connection routing table.
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    by_device: DashMap<DeviceId, ConnectionHandle>,
    by_connection: DashMap<ConnectionId, DeviceId>,
}

impl ConnectionDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `device_id` route to `connection`, replacing any prior owner.
    ///
    /// If the same connection was previously bound under a different device
    /// id, that binding is released and its device id returned.
    pub fn bind(&self, device_id: &DeviceId, connection: &ConnectionHandle) -> Option<DeviceId> {
        let conn_id = connection.id();
        let previous = self.by_connection.insert(conn_id, device_id.clone());

        if let Some(displaced) = self.by_device.insert(device_id.clone(), connection.clone()) {
            if displaced.id() != conn_id {
                tracing::info!(
                    "Device {:?} rebound from {} to {}",
                    device_id,
                    displaced.id(),
                    conn_id
                );
            }
        }

        previous
            .filter(|old| old != device_id)
            .filter(|old| {
                self.by_device
                    .remove_if(old, |_, handle| handle.id() == conn_id)
                    .is_some()
            })
    }

    /// Look up the live connection of a device.
    pub fn resolve(&self, device_id: &DeviceId) -> Option<ConnectionHandle> {
        self.by_device.get(device_id).map(|entry| entry.value().clone())
    }

    /// Device id currently held by a connection.
    pub fn device_of(&self, connection_id: &ConnectionId) -> Option<DeviceId> {
        self.by_connection
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }

    /// Remove a closing connection's binding.
    ///
    /// Returns the freed device id, or `None` if the connection held none or
    /// its device has since been claimed by a newer connection.
    pub fn unbind_by_connection(&self, connection_id: &ConnectionId) -> Option<DeviceId> {
        let (_, device_id) = self.by_connection.remove(connection_id)?;
        self.by_device
            .remove_if(&device_id, |_, handle| handle.id() == *connection_id)
            .map(|(device_id, _)| device_id)
    }

    /// Number of routable devices.
    pub fn len(&self) -> usize {
        self.by_device.len()
    }

    /// Whether no device is routable.
    pub fn is_empty(&self) -> bool {
        self.by_device.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(ConnectionId::new(), None, tx), rx)
    }

    #[test]
    fn bind_and_resolve() {
        let directory = ConnectionDirectory::new();
        let (conn, _rx) = handle();
        let laptop = DeviceId::new("laptop-1");

        assert_eq!(directory.bind(&laptop, &conn), None);

        let resolved = directory.resolve(&laptop).unwrap();
        assert_eq!(resolved.id(), conn.id());
        assert_eq!(directory.device_of(&conn.id()), Some(laptop));
        assert!(directory.resolve(&DeviceId::new("phone-1")).is_none());
    }

    #[test]
    fn last_writer_wins() {
        let directory = ConnectionDirectory::new();
        let (old, _rx1) = handle();
        let (new, _rx2) = handle();
        let laptop = DeviceId::new("laptop-1");

        directory.bind(&laptop, &old);
        directory.bind(&laptop, &new);

        assert_eq!(directory.resolve(&laptop).unwrap().id(), new.id());
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn unbind_frees_device() {
        let directory = ConnectionDirectory::new();
        let (conn, _rx) = handle();
        let laptop = DeviceId::new("laptop-1");

        directory.bind(&laptop, &conn);
        assert_eq!(directory.unbind_by_connection(&conn.id()), Some(laptop.clone()));
        assert!(directory.resolve(&laptop).is_none());
        assert!(directory.is_empty());

        // Second close is a no-op.
        assert_eq!(directory.unbind_by_connection(&conn.id()), None);
    }

    #[test]
    fn unbind_of_displaced_connection_keeps_new_owner() {
        let directory = ConnectionDirectory::new();
        let (old, _rx1) = handle();
        let (new, _rx2) = handle();
        let laptop = DeviceId::new("laptop-1");

        directory.bind(&laptop, &old);
        directory.bind(&laptop, &new);

        assert_eq!(directory.unbind_by_connection(&old.id()), None);
        assert_eq!(directory.resolve(&laptop).unwrap().id(), new.id());
    }

    #[test]
    fn rebinding_connection_releases_previous_device() {
        let directory = ConnectionDirectory::new();
        let (conn, _rx) = handle();

        directory.bind(&DeviceId::new("a"), &conn);
        let released = directory.bind(&DeviceId::new("b"), &conn);

        assert_eq!(released, Some(DeviceId::new("a")));
        assert!(directory.resolve(&DeviceId::new("a")).is_none());
        assert!(directory.resolve(&DeviceId::new("b")).is_some());

        // Re-binding the same id releases nothing.
        assert_eq!(directory.bind(&DeviceId::new("b"), &conn), None);
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (conn, rx) = handle();
        conn.send_text("hello").await.unwrap();
        drop(rx);

        assert!(conn.is_closed());
        assert_eq!(
            conn.send(Outbound::Binary(vec![1, 2])).await,
            Err(PeerWriteError::Closed)
        );
    }

    #[tokio::test]
    async fn send_to_full_queue_times_out() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ConnectionHandle::new(ConnectionId::new(), None, tx)
            .with_write_timeout(Duration::from_millis(50));
        conn.send_text("fills the queue").await.unwrap();

        let start = std::time::Instant::now();
        assert_eq!(
            conn.send_text("no room").await,
            Err(PeerWriteError::Stalled)
        );
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
