//! WebSocket transport for the transfer endpoint.
//!
//! Each connection runs two tasks: a reader that feeds frames to its
//! [`Session`] in receipt order, and a writer that drains the connection's
//! outbound queue and its account's presence channel onto the socket.

use crate::directory::{ConnectionHandle, Outbound};
use crate::presence::PresenceSnapshot;
use crate::server::OrbitRelay;
use crate::session::Session;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Extension;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use orbit_types::{AccountId, ConnectionId, ServerMessage};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Upgrade handler mounted on the transfer path.
pub async fn transfer_handler(
    Extension(relay): Extension<Arc<OrbitRelay>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let account = relay.identity().resolve_account(&headers);
    let max_size = relay.config().limits.max_message_size;

    ws.max_message_size(max_size)
        .max_frame_size(max_size)
        .on_upgrade(move |socket| run_connection(relay, socket, account))
}

/// Drive one upgraded connection until it closes.
pub async fn run_connection(relay: Arc<OrbitRelay>, socket: WebSocket, account: Option<AccountId>) {
    let (sink, mut stream) = socket.split();
    let depth = relay.config().limits.outbound_queue_depth.max(1);
    let (tx, rx) = mpsc::channel(depth);

    let conn_id = ConnectionId::new();
    let handle = ConnectionHandle::new(conn_id, account.clone(), tx)
        .with_write_timeout(relay.config().limits.peer_write_timeout());
    let presence = account.as_ref().map(|a| relay.presence().subscribe(a));

    let writer = tokio::spawn(write_loop(sink, rx, presence, conn_id));
    let mut session = Session::open(relay.clone(), handle).await;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_text(&text).await,
            Ok(Message::Binary(bytes)) => {
                session.handle_binary(bytes).await;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(frame)) => {
                tracing::debug!("Close frame from {}: {:?}", conn_id, frame);
                break;
            }
            Err(e) => {
                tracing::warn!("Transport error on {}: {}", conn_id, e);
                break;
            }
        }
    }

    session.close();

    writer.abort();
    if let Err(e) = writer.await {
        if !e.is_cancelled() {
            tracing::warn!("Writer task for {} failed: {}", conn_id, e);
        }
    }

    if let Some(account) = &account {
        relay.presence().release(account);
    }
}

/// What the writer task woke up for.
enum WriterEvent {
    Frame(Outbound),
    Snapshot(PresenceSnapshot),
    PresenceClosed,
    QueueClosed,
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    mut presence: Option<broadcast::Receiver<PresenceSnapshot>>,
    conn_id: ConnectionId,
) {
    loop {
        let event = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => WriterEvent::Frame(frame),
                None => WriterEvent::QueueClosed,
            },
            event = recv_presence(&mut presence) => event,
        };

        let message = match event {
            WriterEvent::Frame(Outbound::Text(text)) => Message::Text(text),
            WriterEvent::Frame(Outbound::Binary(bytes)) => Message::Binary(bytes),
            WriterEvent::Snapshot(devices) => {
                let list = ServerMessage::DeviceList {
                    devices: devices.as_ref().clone(),
                };
                match list.to_json() {
                    Ok(text) => Message::Text(text),
                    Err(e) => {
                        tracing::error!("Failed to serialize device list: {}", e);
                        continue;
                    }
                }
            }
            WriterEvent::PresenceClosed => {
                presence = None;
                continue;
            }
            WriterEvent::QueueClosed => break,
        };

        if let Err(e) = sink.send(message).await {
            tracing::debug!("Write to {} failed: {}", conn_id, e);
            break;
        }
    }

    let _ = sink.close().await;
}

/// Next presence snapshot; pends forever for connections without an account.
async fn recv_presence(
    presence: &mut Option<broadcast::Receiver<PresenceSnapshot>>,
) -> WriterEvent {
    let Some(rx) = presence.as_mut() else {
        return std::future::pending().await;
    };

    loop {
        match rx.recv().await {
            Ok(snapshot) => return WriterEvent::Snapshot(snapshot),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Presence subscriber lagged, skipped {} snapshots", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return WriterEvent::PresenceClosed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceHub;
    use orbit_types::{Device, DeviceId, DeviceKind};
    use crate::presence::PresenceNotifier;

    fn device(id: &str) -> Device {
        Device {
            device_id: DeviceId::new(id),
            connection_id: ConnectionId::new(),
            display_name: id.to_string(),
            kind: DeviceKind::Phone,
            battery_level: None,
            icon: None,
        }
    }

    #[tokio::test]
    async fn recv_presence_skips_lag() {
        let hub = PresenceHub::new();
        let alice = AccountId::new("alice");
        let mut presence = Some(hub.subscribe(&alice));

        for i in 0..40 {
            hub.publish(&alice, vec![device(&format!("d{}", i))]);
        }

        match recv_presence(&mut presence).await {
            WriterEvent::Snapshot(devices) => assert_eq!(devices[0].device_id.as_str(), "d24"),
            _ => panic!("expected a snapshot"),
        }
    }

    #[tokio::test]
    async fn recv_presence_reports_closed_channel() {
        let (tx, rx) = broadcast::channel::<PresenceSnapshot>(4);
        let mut presence = Some(rx);
        drop(tx);

        assert!(matches!(
            recv_presence(&mut presence).await,
            WriterEvent::PresenceClosed
        ));
    }

    #[tokio::test]
    async fn recv_presence_without_account_pends() {
        let mut presence = None;
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), recv_presence(&mut presence))
                .await;
        assert!(waited.is_err());
    }
}
