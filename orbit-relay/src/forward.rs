//! Binary relay: forwards payload frames along a connection's transfer route.
//!
//! Fire-and-forget. A frame with no deliverable target is dropped and only
//! logged; the sender is never told. A write that outlasts the peer's write
//! timeout counts as undeliverable.

use crate::directory::{ConnectionHandle, Outbound};
use crate::plans::RateLimit;
use crate::server::{OrbitRelay, RelayMetrics};
use orbit_types::DeviceId;
use std::sync::atomic::Ordering;

/// What happened to a binary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Queued on the target connection.
    Delivered,
    /// The source connection has no transfer route.
    NoRoute,
    /// The route target is not connected or its connection is closing.
    TargetOffline,
}

impl OrbitRelay {
    /// Forward one frame from `source` to the device named by `route`.
    ///
    /// Frames from a rate-limited account wait for the account's bucket
    /// before being written; this is the only place a reader task is
    /// suspended for throttling.
    pub async fn forward_binary(
        &self,
        source: &ConnectionHandle,
        limit: RateLimit,
        route: Option<&DeviceId>,
        frame: Vec<u8>,
    ) -> ForwardOutcome {
        let Some(target_id) = route else {
            tracing::warn!(
                "No target set for binary frame ({} bytes) from {}, dropping",
                frame.len(),
                source.id()
            );
            RelayMetrics::incr(&self.metrics().frames_dropped_total);
            return ForwardOutcome::NoRoute;
        };

        let len = frame.len();
        if let (Some(account), true) = (source.account(), limit.is_limited()) {
            RelayMetrics::incr(&self.metrics().frames_throttled_total);
            self.limiter().consume(account, limit, len).await;
        }

        let Some(target) = self.directory().resolve(target_id) else {
            tracing::warn!(
                "Target {:?} offline, dropping {} bytes from {}",
                target_id,
                len,
                source.id()
            );
            RelayMetrics::incr(&self.metrics().frames_dropped_total);
            return ForwardOutcome::TargetOffline;
        };

        if let Err(e) = target.send(Outbound::Binary(frame)).await {
            tracing::warn!(
                "Write to {:?} ({}) failed: {}, dropping {} bytes",
                target_id,
                target.id(),
                e,
                len
            );
            RelayMetrics::incr(&self.metrics().frames_dropped_total);
            return ForwardOutcome::TargetOffline;
        }

        RelayMetrics::incr(&self.metrics().frames_forwarded_total);
        self.metrics()
            .bytes_relayed
            .fetch_add(len as u64, Ordering::Relaxed);

        tracing::trace!("Forwarded {} bytes {} -> {:?}", len, source.id(), target_id);
        ForwardOutcome::Delivered
    }
}
