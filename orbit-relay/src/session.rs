//! Per-connection signaling state machine.
//!
//! Each connection gets a Session that interprets its control messages and
//! decides where its binary frames go. Messages of one connection are handled
//! strictly in receipt order by the connection's own task.

use crate::directory::ConnectionHandle;
use crate::forward::ForwardOutcome;
use crate::plans::RateLimit;
use crate::server::{OrbitRelay, RelayMetrics};
use orbit_types::{
    ControlMessage, Device, DeviceId, Register, ServerMessage, TransferFinish, TransferRequest,
    TransferResponse, Update,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Transfer route states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteState {
    /// Binary frames are dropped.
    Unrouted,
    /// Binary frames are forwarded to `target`.
    Routed {
        /// Device the frames go to.
        target: DeviceId,
    },
}

impl RouteState {
    /// The current target, if routed.
    pub fn target(&self) -> Option<&DeviceId> {
        match self {
            Self::Unrouted => None,
            Self::Routed { target } => Some(target),
        }
    }
}

/// A per-connection session.
pub struct Session {
    relay: Arc<OrbitRelay>,
    handle: ConnectionHandle,
    rate_limit: RateLimit,
    device_id: Option<DeviceId>,
    route: RouteState,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.handle.id())
            .field("account", &self.handle.account())
            .field("rate_limit", &self.rate_limit)
            .field("device_id", &self.device_id)
            .field("route", &self.route)
            .finish()
    }
}

impl Session {
    /// Admit a new connection.
    ///
    /// Resolves the account's plan once; it applies for the connection's lifetime.
    pub async fn open(relay: Arc<OrbitRelay>, handle: ConnectionHandle) -> Self {
        let rate_limit = match handle.account() {
            Some(account) => {
                let limit = relay.plans().rate_limit(account).await;
                relay.limiter().adopt(account, limit);
                limit
            }
            None => RateLimit::Unlimited,
        };

        RelayMetrics::incr(&relay.metrics().connections_total);
        RelayMetrics::incr(&relay.metrics().connections_active);

        tracing::info!(
            "Transfer connection established: {} (account: {:?}, limit: {:?})",
            handle.id(),
            handle.account(),
            rate_limit
        );

        Self {
            relay,
            handle,
            rate_limit,
            device_id: None,
            route: RouteState::Unrouted,
        }
    }

    /// Handle of this connection.
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Device id this connection registered as.
    pub fn device_id(&self) -> Option<&DeviceId> {
        self.device_id.as_ref()
    }

    /// Current transfer route.
    pub fn route(&self) -> &RouteState {
        &self.route
    }

    /// Rate limit applied to this connection's binary frames.
    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit
    }

    /// Handle one text (control) frame.
    pub async fn handle_text(&mut self, text: &str) {
        let message = match ControlMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Ignoring control message on {}: {}", self.handle.id(), e);
                RelayMetrics::incr(&self.relay.metrics().malformed_total);
                return;
            }
        };

        match message {
            ControlMessage::Register(register) => self.handle_register(register).await,
            ControlMessage::Update(update) => self.handle_update(update),
            ControlMessage::TransferRequest(request) => {
                self.handle_transfer_request(request, text).await
            }
            ControlMessage::TransferResponse(response) => {
                self.handle_transfer_response(response, text).await
            }
            ControlMessage::TransferFinish(finish) => {
                self.handle_transfer_finish(finish, text).await
            }
            ControlMessage::Unknown => {
                tracing::warn!("Unknown message type on {}", self.handle.id());
                RelayMetrics::incr(&self.relay.metrics().unknown_total);
            }
        }
    }

    /// Handle one binary frame.
    pub async fn handle_binary(&mut self, frame: Vec<u8>) -> ForwardOutcome {
        self.relay
            .forward_binary(&self.handle, self.rate_limit, self.route.target(), frame)
            .await
    }

    /// Tear down the connection's routing and presence state.
    pub fn close(self) {
        let conn_id = self.handle.id();
        let freed = self.relay.directory().unbind_by_connection(&conn_id);

        if let (Some(account), Some(device_id)) = (self.handle.account(), &self.device_id) {
            self.relay
                .registry()
                .unregister_connection(account, device_id, conn_id);
        }

        self.relay
            .metrics()
            .connections_active
            .fetch_sub(1, Ordering::Relaxed);

        match freed {
            Some(device_id) => tracing::info!("Device disconnected: {:?} ({})", device_id, conn_id),
            None => tracing::info!("Transfer connection closed: {}", conn_id),
        }
    }

    /// Handle REGISTER.
    async fn handle_register(&mut self, register: Register) {
        let device_id = register
            .device_id
            .filter(|id| !id.as_str().trim().is_empty())
            .unwrap_or_else(DeviceId::random);
        let conn_id = self.handle.id();

        if let Some(released) = self.relay.directory().bind(&device_id, &self.handle) {
            if let Some(account) = self.handle.account() {
                self.relay
                    .registry()
                    .unregister_connection(account, &released, conn_id);
            }
        }

        let max_name_len = self.relay.config().limits.max_display_name_len;
        let device = Device {
            device_id: device_id.clone(),
            connection_id: conn_id,
            display_name: truncate_display_name(&register.display_name, max_name_len),
            kind: register.kind,
            battery_level: register.battery_level.map(|level| level.min(100)),
            icon: register.icon,
        };

        match self.handle.account() {
            Some(account) => self.relay.registry().register(account, device),
            None => tracing::debug!(
                "Unauthenticated device {:?} is routable but not listed in any orbit",
                device_id
            ),
        }

        tracing::info!(
            "Registered device {:?} on {} (name: {:?})",
            device_id,
            conn_id,
            register.display_name
        );

        self.device_id = Some(device_id);
        RelayMetrics::incr(&self.relay.metrics().registrations_total);
        self.reply(ServerMessage::registered()).await;
    }

    /// Handle UPDATE.
    fn handle_update(&mut self, update: Update) {
        let Some(device_id) = self.device_id.clone() else {
            tracing::warn!("UPDATE before REGISTER on {}, ignoring", self.handle.id());
            RelayMetrics::incr(&self.relay.metrics().malformed_total);
            return;
        };
        let owner = self.relay.directory().resolve(&device_id).map(|peer| peer.id());
        if owner != Some(self.handle.id()) {
            tracing::warn!(
                "UPDATE for {:?} from {}, which no longer holds it, ignoring",
                device_id,
                self.handle.id()
            );
            return;
        }
        let Some(account) = self.handle.account() else {
            tracing::debug!("UPDATE from unauthenticated {:?}, nothing to publish", device_id);
            return;
        };

        let max_name_len = self.relay.config().limits.max_display_name_len;
        let device = Device {
            device_id,
            connection_id: self.handle.id(),
            display_name: truncate_display_name(&update.display_name, max_name_len),
            kind: update.kind,
            battery_level: update.battery_level.map(|level| level.min(100)),
            icon: update.icon,
        };
        self.relay.registry().register(account, device);
    }

    /// Handle TRANSFER_REQUEST: route this connection to the receiver.
    async fn handle_transfer_request(&mut self, request: TransferRequest, raw: &str) {
        tracing::info!(
            "TRANSFER_REQUEST {} ({:?}, {} bytes) from {} to {:?}",
            request.transfer_id,
            request.filename,
            request.size,
            self.handle.id(),
            request.target_device_id
        );

        if self.relay_to(&request.target_device_id, raw).await {
            self.set_route(request.target_device_id);
        }
    }

    /// Handle TRANSFER_RESPONSE: on acceptance route this connection back to the sender.
    async fn handle_transfer_response(&mut self, response: TransferResponse, raw: &str) {
        tracing::info!(
            "TRANSFER_RESPONSE {} (accepted: {}) from {} to {:?}",
            response.transfer_id,
            response.accepted,
            self.handle.id(),
            response.target_device_id
        );

        if self.relay_to(&response.target_device_id, raw).await && response.accepted {
            self.set_route(response.target_device_id);
        }
    }

    /// Handle TRANSFER_FINISH: forward and drop the route.
    async fn handle_transfer_finish(&mut self, finish: TransferFinish, raw: &str) {
        tracing::info!(
            "TRANSFER_FINISH {} from {} to {:?}",
            finish.transfer_id,
            self.handle.id(),
            finish.target_device_id
        );

        self.relay_to(&finish.target_device_id, raw).await;
        if self.route != RouteState::Unrouted {
            tracing::debug!("Cleared route of {}", self.handle.id());
        }
        self.route = RouteState::Unrouted;
    }

    /// Forward a control frame verbatim to `target`.
    ///
    /// Replies "Target device offline" to this connection and returns false
    /// if the target is not connected or its queue is closed.
    async fn relay_to(&self, target: &DeviceId, raw: &str) -> bool {
        let delivered = match self.relay.directory().resolve(target) {
            Some(peer) => peer.send_text(raw).await.is_ok(),
            None => false,
        };

        if delivered {
            RelayMetrics::incr(&self.relay.metrics().control_forwarded_total);
            tracing::debug!("Forwarded control frame {} -> {:?}", self.handle.id(), target);
        } else {
            tracing::warn!("Target device {:?} not found or disconnected", target);
            RelayMetrics::incr(&self.relay.metrics().target_offline_total);
            self.reply(ServerMessage::target_offline()).await;
        }

        delivered
    }

    fn set_route(&mut self, target: DeviceId) {
        tracing::debug!("Set current target for {} to {:?}", self.handle.id(), target);
        self.route = RouteState::Routed { target };
    }

    /// Send a relay-originated message to this connection.
    async fn reply(&self, message: ServerMessage) {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to serialize reply: {}", e);
                return;
            }
        };

        if let Err(e) = self.handle.send_text(text).await {
            tracing::debug!("Reply to {} not delivered: {}", self.handle.id(), e);
        }
    }
}

/// Truncate a display name to a maximum character length.
///
/// Uses char boundaries to avoid splitting multi-byte UTF-8.
fn truncate_display_name(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        name.to_string()
    } else {
        name.chars().take(max_chars).collect()
    }
}
